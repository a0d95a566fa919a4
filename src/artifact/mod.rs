//! Build artifacts: system images, boot-environment ISOs and their parts.
//!
//! - `image` - installable system image (`root.zfs.xz`, `efi.img`, `manifest.toml`)
//! - `iso` - bootable boot-environment ISO
//! - `efi` - FAT images holding the UEFI loader
//! - `hybrid` - MBR boot structures that make an ISO bootable from USB
//! - `manifest` - image manifest format

pub mod efi;
pub mod hybrid;
pub mod image;
pub mod iso;
pub mod manifest;

pub use hybrid::{make_hybrid_bootable, make_hybrid_bootable_from, HybridError};
pub use image::ImageBuilder;
pub use iso::IsoBuilder;
pub use manifest::ImageManifest;
