//! Hybrid ISO boot structures.
//!
//! An ISO 9660 image leaves its first 32KiB unused. Writing MBR boot code, a
//! single partition entry covering the whole image and the `55 AA` signature
//! into sector 0 lets the same file boot from a CD and from a USB stick.
//!
//! Layout of sector 0 after [`make_hybrid_bootable`]:
//!
//! ```text
//! [  0, 432)  boot code (as much of the blob as fits)
//! [446, 462)  partition entry 1: active, type 0x96, LBA 0, whole image
//! [462, 510)  partition entries 2-4, zeroed
//! [510, 512)  55 AA
//! ```
//!
//! Nothing else in the file is modified.

use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SECTOR_SIZE: u64 = 512;

/// Bytes of sector 0 available to boot code.
pub const BOOT_CODE_SIZE: usize = 432;
/// Offset of the first partition entry.
pub const PARTITION_TABLE_OFFSET: u64 = 446;
pub const PARTITION_ENTRY_SIZE: usize = 16;
pub const PARTITION_TABLE_SIZE: usize = 4 * PARTITION_ENTRY_SIZE;
pub const SIGNATURE_OFFSET: u64 = 510;
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Partition type used for ISO 9660 images.
pub const ISO9660_PARTITION_TYPE: u8 = 0x96;
const ACTIVE: u8 = 0x80;
/// CHS of the first sector (cylinder 0, head 0, sector 1).
const CHS_START: [u8; 3] = [0x00, 0x01, 0x00];
/// CHS past the addressable range; firmware falls back to LBA.
const CHS_END: [u8; 3] = [0xFE, 0xFF, 0xFF];

/// Boot code blobs, relative to a boot environment root, in order of preference.
///
/// `pmbr` can boot from a USB stick; `cdboot` only works from optical media.
pub const BOOT_CODE_CANDIDATES: [&str; 2] = ["boot/pmbr", "boot/cdboot"];

#[derive(Debug, Error)]
pub enum HybridError {
    #[error("no MBR boot code found (checked: {})", display_paths(.checked))]
    BootCodeNotFound { checked: Vec<PathBuf> },

    #[error("failed to read boot code {}", .path.display())]
    ReadBootCode {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open ISO {} for writing", .path.display())]
    OpenIso {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ISO {} is {size} bytes, too small to hold a boot sector", .path.display())]
    IsoTooSmall { path: PathBuf, size: u64 },

    #[error("failed to write {what} to {}", .path.display())]
    Write {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Boot code candidates under `root`, in preference order.
pub fn candidates_under(root: &Path) -> Vec<PathBuf> {
    BOOT_CODE_CANDIDATES.iter().map(|c| root.join(c)).collect()
}

/// The first candidate that exists as a file.
pub fn find_boot_code(candidates: &[PathBuf]) -> Result<PathBuf, HybridError> {
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| HybridError::BootCodeNotFound {
            checked: candidates.to_vec(),
        })
}

/// Number of 512-byte sectors needed for `size` bytes, saturating at `u32::MAX`.
pub fn sector_count(size: u64) -> u32 {
    let sectors = size.div_ceil(SECTOR_SIZE);
    u32::try_from(sectors).unwrap_or(u32::MAX)
}

/// An active ISO 9660 partition entry starting at LBA 0.
pub fn build_mbr_partition_entry(sector_count: u32) -> [u8; PARTITION_ENTRY_SIZE] {
    let mut entry = [0u8; PARTITION_ENTRY_SIZE];
    entry[0] = ACTIVE;
    entry[1..4].copy_from_slice(&CHS_START);
    entry[4] = ISO9660_PARTITION_TYPE;
    entry[5..8].copy_from_slice(&CHS_END);
    entry[8..12].copy_from_slice(&0u32.to_le_bytes());
    entry[12..16].copy_from_slice(&sector_count.to_le_bytes());
    entry
}

/// The full four-entry table: the ISO entry, then three empty slots.
pub fn build_partition_table(sector_count: u32) -> [u8; PARTITION_TABLE_SIZE] {
    let mut table = [0u8; PARTITION_TABLE_SIZE];
    table[..PARTITION_ENTRY_SIZE].copy_from_slice(&build_mbr_partition_entry(sector_count));
    table
}

/// Write boot code, partition table and signature into `iso` in place.
///
/// The file is opened without create or truncate, so its size never changes.
/// A failure part way through leaves whatever was already written.
pub fn make_hybrid_bootable(iso: &Path, boot_code: &Path) -> Result<(), HybridError> {
    let code = fs::read(boot_code).map_err(|source| HybridError::ReadBootCode {
        path: boot_code.to_path_buf(),
        source,
    })?;
    let code = &code[..code.len().min(BOOT_CODE_SIZE)];

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(iso)
        .map_err(|source| HybridError::OpenIso {
            path: iso.to_path_buf(),
            source,
        })?;

    let size = file
        .metadata()
        .map_err(|source| HybridError::OpenIso {
            path: iso.to_path_buf(),
            source,
        })?
        .len();
    if size < SECTOR_SIZE {
        return Err(HybridError::IsoTooSmall {
            path: iso.to_path_buf(),
            size,
        });
    }

    let write = |what: &'static str, bytes: &[u8], offset: u64| {
        file.write_all_at(bytes, offset)
            .map_err(|source| HybridError::Write {
                what,
                path: iso.to_path_buf(),
                source,
            })
    };

    write("boot code", code, 0)?;
    write(
        "partition table",
        &build_partition_table(sector_count(size)),
        PARTITION_TABLE_OFFSET,
    )?;
    write("boot signature", &BOOT_SIGNATURE, SIGNATURE_OFFSET)?;

    file.sync_all().map_err(|source| HybridError::Write {
        what: "boot sector",
        path: iso.to_path_buf(),
        source,
    })?;

    tracing::debug!(
        iso = %iso.display(),
        boot_code = %boot_code.display(),
        sectors = sector_count(size),
        "wrote hybrid MBR"
    );
    Ok(())
}

/// Resolve the boot code from `candidates`, then apply it to `iso`.
///
/// The ISO is not opened when no candidate exists.
pub fn make_hybrid_bootable_from(iso: &Path, candidates: &[PathBuf]) -> Result<PathBuf, HybridError> {
    let boot_code = find_boot_code(candidates)?;
    make_hybrid_bootable(iso, &boot_code)?;
    Ok(boot_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_count_rounds_up_and_clamps() {
        assert_eq!(sector_count(0), 0);
        assert_eq!(sector_count(1), 1);
        assert_eq!(sector_count(512), 1);
        assert_eq!(sector_count(513), 2);
        assert_eq!(sector_count(u32::MAX as u64 * 512), u32::MAX);
        assert_eq!(sector_count(u32::MAX as u64 * 512 + 1), u32::MAX);
        assert_eq!(sector_count(u64::MAX), u32::MAX);
    }

    #[test]
    fn test_partition_entry_layout() {
        let entry = build_mbr_partition_entry(0x0102_0304);
        assert_eq!(
            entry,
            [
                0x80, 0x00, 0x01, 0x00, 0x96, 0xFE, 0xFF, 0xFF, 0, 0, 0, 0, 0x04, 0x03, 0x02,
                0x01
            ]
        );
    }

    #[test]
    fn test_partition_table_has_three_empty_slots() {
        let table = build_partition_table(7);
        assert_eq!(&table[..16], &build_mbr_partition_entry(7));
        assert!(table[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_find_boot_code_reports_every_path() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = candidates_under(dir.path());
        match find_boot_code(&candidates) {
            Err(HybridError::BootCodeNotFound { checked }) => assert_eq!(checked, candidates),
            other => panic!("unexpected: {other:?}"),
        }

        fs::create_dir_all(dir.path().join("boot")).unwrap();
        fs::write(dir.path().join("boot/cdboot"), b"cd").unwrap();
        assert_eq!(
            find_boot_code(&candidates).unwrap(),
            dir.path().join("boot/cdboot")
        );

        fs::write(dir.path().join("boot/pmbr"), b"pmbr").unwrap();
        assert_eq!(
            find_boot_code(&candidates).unwrap(),
            dir.path().join("boot/pmbr")
        );
    }

    #[test]
    fn test_short_iso_is_rejected_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let iso = dir.path().join("tiny.iso");
        let code = dir.path().join("pmbr");
        fs::write(&iso, [0xEEu8; 100]).unwrap();
        fs::write(&code, [0x11u8; 432]).unwrap();

        let err = make_hybrid_bootable(&iso, &code).unwrap_err();
        assert!(matches!(err, HybridError::IsoTooSmall { size: 100, .. }));
        assert_eq!(fs::read(&iso).unwrap(), vec![0xEEu8; 100]);
    }

    #[test]
    fn test_missing_iso_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let iso = dir.path().join("absent.iso");
        let code = dir.path().join("pmbr");
        fs::write(&code, [0x11u8; 16]).unwrap();

        let err = make_hybrid_bootable(&iso, &code).unwrap_err();
        assert!(matches!(err, HybridError::OpenIso { .. }));
        assert!(!iso.exists());
    }
}
