//! Filesystems on the freshly created partitions.

use anyhow::{Context, Result};

use super::partition::device_path;
use super::ALTROOT;
use crate::host::Host;
use crate::process::Cmd;

/// Format the EFI partition as FAT32, one sector per cluster.
pub fn format_efi(host: &impl Host, partition: &str) -> Result<()> {
    host.run(
        Cmd::new("newfs_msdos")
            .args(["-F", "32", "-c", "1"])
            .arg(device_path(partition)),
    )
    .with_context(|| format!("newfs_msdos failed on {}", partition))?;
    Ok(())
}

/// Pool creation options shared by the installer and the image builder.
pub fn pool_create_args(pool: &str, altroot: &str, vdev: &str) -> Vec<String> {
    vec![
        "create".into(),
        // The partition is brand new but may still carry labels from an old pool.
        "-f".into(),
        "-o".into(),
        format!("altroot={}", altroot),
        "-O".into(),
        "compression=lz4".into(),
        "-O".into(),
        "atime=off".into(),
        pool.into(),
        vdev.into(),
    ]
}

/// Create `pool` on `partition`, mounted under [`ALTROOT`].
pub fn create_pool(host: &impl Host, pool: &str, partition: &str) -> Result<()> {
    host.run(Cmd::new("zpool").args(pool_create_args(pool, ALTROOT, &device_path(partition))))
        .with_context(|| format!("zpool create failed for {}", pool))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_create_args() {
        let args = pool_create_args("pgsd", "/mnt", "/dev/ada0p2");
        assert_eq!(
            args.join(" "),
            "create -f -o altroot=/mnt -O compression=lz4 -O atime=off pgsd /dev/ada0p2"
        );
    }
}
