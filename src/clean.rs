//! Build output cleaning.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::BuildConfig;

/// What `pgsdbuild clean` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanTarget {
    Work,
    Artifacts,
    Iso,
    /// Downloaded distribution archives.
    Distfiles,
    All,
}

/// Remove a directory tree if it exists. Returns whether anything was removed.
fn remove_dir(label: &str, dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    println!("Removing {} ({})...", label, dir.display());
    fs::remove_dir_all(dir).with_context(|| format!("Failed to remove {}", dir.display()))?;
    Ok(true)
}

pub fn clean(config: &BuildConfig, target: CleanTarget) -> Result<()> {
    let dirs = match target {
        CleanTarget::Work => vec![("work directory", config.work_dir())],
        CleanTarget::Artifacts => vec![("images", config.artifacts_dir())],
        CleanTarget::Iso => vec![("ISOs", config.iso_dir())],
        CleanTarget::Distfiles => vec![("distribution archives", config.distfiles_dir())],
        CleanTarget::All => vec![
            ("work directory", config.work_dir()),
            ("images", config.artifacts_dir()),
            ("ISOs", config.iso_dir()),
            ("distribution archives", config.distfiles_dir()),
        ],
    };

    let mut cleaned = false;
    for (label, dir) in &dirs {
        cleaned |= remove_dir(label, dir)?;
    }

    if cleaned {
        println!("Clean complete.");
    } else {
        println!("Nothing to clean.");
    }
    Ok(())
}
