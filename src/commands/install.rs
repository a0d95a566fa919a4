//! Install commands - installation, disk and image discovery.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::artifact::ImageManifest;
use crate::config::BuildConfig;
use crate::host::SystemHost;
use crate::install::discover::{self, SYSTEM_IMAGES_DIR};
use crate::install::{InstallConfig, Installer, MANIFEST};

/// Where the installer looks for images: the live system location, then
/// the local artifacts directory.
fn image_dirs(config: &BuildConfig) -> Vec<PathBuf> {
    vec![PathBuf::from(SYSTEM_IMAGES_DIR), config.artifacts_dir()]
}

/// Options for `pgsdbuild install`.
pub struct InstallArgs {
    pub image: String,
    pub disk: String,
    pub pool: String,
    pub yes: bool,
}

/// Execute `pgsdbuild install`.
///
/// Returns the process exit code: installation failures are reported here
/// rather than propagated, so the stage and hint are shown exactly once.
pub fn cmd_install(config: &BuildConfig, args: &InstallArgs) -> Result<i32> {
    if !args.yes {
        bail!(
            "Installing destroys all data on {}. Re-run with --yes to confirm.",
            args.disk
        );
    }

    let Some(image_path) = discover::resolve_image(&args.image, &image_dirs(config)) else {
        bail!(
            "image '{}' not found (not a directory, and no built image with that id in {} or {})",
            args.image,
            SYSTEM_IMAGES_DIR,
            config.artifacts_dir().display()
        );
    };

    let install = InstallConfig::new(image_path, &args.disk, &args.pool);
    println!(
        "Installing {} onto {} (pool {})\n",
        install.image_path.display(),
        install.target_disk,
        install.pool_name
    );

    let host = SystemHost;
    let installer = Installer::new(&host).with_log(|msg| println!("{}", msg));
    match installer.install(&install) {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("\nError: {}", e);
            if let Some(hint) = e.hint() {
                eprintln!("Hint: {}", hint);
            }
            match e.last_completed {
                Some(stage) => eprintln!("Last completed stage: {}", stage),
                None => eprintln!("No stage completed."),
            }
            if e.disk_touched() {
                eprintln!("The contents of {} may have been modified.", install.target_disk);
            }
            Ok(1)
        }
    }
}

/// Execute `pgsdbuild disks`.
pub fn cmd_disks(json: bool) -> Result<()> {
    let disks = discover::list_disks(&SystemHost);
    if json {
        println!("{}", serde_json::to_string_pretty(&disks)?);
        return Ok(());
    }
    if disks.is_empty() {
        println!("No disks found.");
        return Ok(());
    }
    for disk in &disks {
        println!("  {:<10} {:>10}  {}", disk.device, disk.size_display(), disk.model);
    }
    Ok(())
}

/// Execute `pgsdbuild installable`.
pub fn cmd_installable(config: &BuildConfig) -> Result<()> {
    let images = discover::list_installable_images(&image_dirs(config))?;
    if images.is_empty() {
        println!("No installable images found.");
        return Ok(());
    }
    for image in &images {
        match ImageManifest::read(&image.path.join(MANIFEST)) {
            Ok(manifest) => println!(
                "  {:<16} {:<12} FreeBSD {}  {}",
                image.id,
                manifest.version,
                manifest.freebsd_version,
                image.path.display()
            ),
            Err(e) => {
                tracing::debug!("unreadable manifest for {}: {:#}", image.id, e);
                println!("  {:<16} {:<12} {}", image.id, "?", image.path.display());
            }
        }
    }
    Ok(())
}
