//! GPT layout of an installation target.
//!
//! Two partitions, always in this order (everything downstream relies on it):
//! 1. EFI system partition, 200M
//! 2. ZFS data partition, rest of the disk

use anyhow::{Context, Result};

use crate::host::Host;
use crate::process::Cmd;

pub const EFI_PARTITION_INDEX: u32 = 1;
pub const DATA_PARTITION_INDEX: u32 = 2;

pub const EFI_PARTITION_SIZE: &str = "200M";
pub const EFI_PARTITION_LABEL: &str = "efiboot0";
pub const DATA_PARTITION_LABEL: &str = "zfsroot0";

/// How a platform names the partitions of a disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartitionNaming {
    /// `ada0` -> `ada0p1`
    #[default]
    FreeBsd,
    /// `sda` -> `sda1`, `nvme0n1` -> `nvme0n1p1`
    Linux,
}

impl PartitionNaming {
    /// Name of partition `index` on `disk`.
    pub fn device(&self, disk: &str, index: u32) -> String {
        match self {
            PartitionNaming::FreeBsd => format!("{}p{}", disk, index),
            PartitionNaming::Linux => {
                if disk.ends_with(|c: char| c.is_ascii_digit()) {
                    format!("{}p{}", disk, index)
                } else {
                    format!("{}{}", disk, index)
                }
            }
        }
    }
}

/// `/dev` path for a device name; absolute paths pass through.
pub fn device_path(dev: &str) -> String {
    if dev.starts_with('/') {
        dev.to_string()
    } else {
        format!("/dev/{}", dev)
    }
}

/// Outcome of the best-effort table reset. Never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableReset {
    /// An existing partition table was destroyed.
    Destroyed,
    /// Nothing was destroyed; usually because the disk had no table.
    NothingDestroyed(String),
}

/// Destroy any existing partition table on `disk`.
///
/// A blank disk makes `gpart destroy` fail, which is the common case, so the
/// result is reported but never propagated.
pub fn reset_partition_table(host: &impl Host, disk: &str) -> TableReset {
    let result = host.run(
        Cmd::new("gpart")
            .args(["destroy", "-F", disk])
            .allow_fail(),
    );
    match result {
        Ok(r) if r.success() => TableReset::Destroyed,
        Ok(r) => TableReset::NothingDestroyed(r.combined()),
        Err(e) => TableReset::NothingDestroyed(format!("{:#}", e)),
    }
}

/// Lay down a fresh GPT with the EFI and data partitions on `disk`.
///
/// Partial failure leaves the disk half-partitioned; there is no rollback.
pub fn partition(host: &impl Host, disk: &str) -> Result<()> {
    match reset_partition_table(host, disk) {
        TableReset::Destroyed => tracing::debug!("destroyed existing partition table on {}", disk),
        TableReset::NothingDestroyed(why) => {
            tracing::debug!("no partition table destroyed on {}: {}", disk, why.trim())
        }
    }

    host.run(Cmd::new("gpart").args(["create", "-s", "gpt", disk]))
        .with_context(|| format!("Creating GPT partition table on {}", disk))?;

    host.run(Cmd::new("gpart").args([
        "add",
        "-t",
        "efi",
        "-s",
        EFI_PARTITION_SIZE,
        "-l",
        EFI_PARTITION_LABEL,
        disk,
    ]))
    .with_context(|| format!("Adding EFI partition on {}", disk))?;

    host.run(Cmd::new("gpart").args([
        "add",
        "-t",
        "freebsd-zfs",
        "-l",
        DATA_PARTITION_LABEL,
        disk,
    ]))
    .with_context(|| format!("Adding ZFS partition on {}", disk))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freebsd_naming() {
        let n = PartitionNaming::FreeBsd;
        assert_eq!(n.device("ada0", EFI_PARTITION_INDEX), "ada0p1");
        assert_eq!(n.device("nda0", DATA_PARTITION_INDEX), "nda0p2");
    }

    #[test]
    fn test_linux_naming() {
        let n = PartitionNaming::Linux;
        assert_eq!(n.device("sda", 1), "sda1");
        assert_eq!(n.device("nvme0n1", 2), "nvme0n1p2");
    }

    #[test]
    fn test_device_path() {
        assert_eq!(device_path("ada0p1"), "/dev/ada0p1");
        assert_eq!(device_path("/dev/md3p2"), "/dev/md3p2");
    }
}
