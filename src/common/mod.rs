//! Shared utilities across pgsdbuild modules.

pub mod checksum;
pub mod files;
pub mod temp;

pub use checksum::{sha256_file, verify_sha256, write_checksum_file};
pub use files::{copy_tree, write_file_with_dirs};
pub use temp::{cleanup_work_dir, prepare_work_dir};
