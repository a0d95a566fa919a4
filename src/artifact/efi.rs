//! FAT images holding the UEFI loader.
//!
//! Two flavours: the 200MiB FAT32 `efi.img` shipped with every system image
//! (copied raw onto the EFI partition at install time), and the small FAT12
//! El Torito image embedded in boot-environment ISOs.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::common::temp::{cleanup_work_dir, prepare_work_dir};
use crate::host::Host;
use crate::process::Cmd;

/// Where UEFI firmware looks for a removable-media loader.
pub const EFI_BOOT_PATH: &str = "EFI/BOOT/BOOTX64.EFI";
/// FreeBSD's UEFI loader, relative to a system root.
pub const LOADER_EFI: &str = "boot/loader.efi";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EfiImageSpec {
    pub size_mib: u32,
    pub fat_type: u8,
    pub label: &'static str,
}

/// Matches the 200M EFI partition created at install time.
pub const SYSTEM_EFI: EfiImageSpec = EfiImageSpec {
    size_mib: 200,
    fat_type: 32,
    label: "EFISYS",
};

pub const ISO_EFI: EfiImageSpec = EfiImageSpec {
    size_mib: 2,
    fat_type: 12,
    label: "EFIBOOT",
};

impl EfiImageSpec {
    pub fn makefs_args(&self, output: &Path, staging: &Path) -> Vec<String> {
        let mut args = vec![
            "-t".to_string(),
            "msdos".to_string(),
            "-o".to_string(),
            format!("fat_type={}", self.fat_type),
        ];
        if self.fat_type == 32 {
            args.push("-o".to_string());
            args.push("sectors_per_cluster=1".to_string());
        }
        args.extend([
            "-o".to_string(),
            format!("volume_label={}", self.label),
            "-s".to_string(),
            format!("{}m", self.size_mib),
            output.display().to_string(),
            staging.display().to_string(),
        ]);
        args
    }
}

/// Build a FAT image at `output` containing `loader` as the removable-media loader.
pub fn build_efi_image(
    host: &impl Host,
    loader: &Path,
    output: &Path,
    spec: &EfiImageSpec,
) -> Result<()> {
    if !loader.is_file() {
        bail!(
            "UEFI loader not found at {} (is the base system extracted?)",
            loader.display()
        );
    }

    let parent = output
        .parent()
        .with_context(|| format!("{} has no parent directory", output.display()))?;
    let staging = prepare_work_dir(parent, ".efi-staging")?;

    let result = (|| -> Result<()> {
        let target = staging.join(EFI_BOOT_PATH);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::copy(loader, &target)
            .with_context(|| format!("Failed to copy {}", loader.display()))?;

        host.run(Cmd::new("makefs").args(spec.makefs_args(output, &staging)))
            .with_context(|| format!("Failed to create EFI image {}", output.display()))?;
        Ok(())
    })();

    cleanup_work_dir(&staging);
    result
}
