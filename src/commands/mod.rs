//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build system images and boot-environment ISOs
//! - `list` - List image and variant definitions
//! - `install` - Install an image onto a disk, list disks and installable images
//! - `hybrid` - Make an existing ISO bootable from USB
//! - `fetch` - Download the FreeBSD distribution archives
//! - `clean` - Clean build outputs
//! - `show` - Display information
//! - `preflight` - Run preflight checks

pub mod build;
pub mod clean;
mod fetch;
mod hybrid;
pub mod install;
pub mod list;
mod preflight;
pub mod show;

pub use build::{cmd_image, cmd_iso};
pub use clean::cmd_clean;
pub use fetch::cmd_fetch;
pub use hybrid::cmd_hybrid;
pub use install::{cmd_disks, cmd_install, cmd_installable};
pub use list::{cmd_list_images, cmd_list_variants};
pub use preflight::cmd_preflight;
pub use show::cmd_show;
