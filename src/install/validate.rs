//! Checks that run before anything touches the disk.

use anyhow::Result;
use std::path::PathBuf;
use thiserror::Error;

use super::{InstallConfig, MAX_POOL_NAME_LEN, REQUIRED_ARTIFACTS};
use crate::host::Host;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("image path is not set")]
    EmptyImagePath,

    #[error("target disk is not set")]
    EmptyTargetDisk,

    #[error("pool name is not set")]
    EmptyPoolName,

    #[error("image directory not found: {}", .0.display())]
    ImageDirMissing(PathBuf),

    #[error(
        "required image file missing: {} (an image directory must contain {})",
        .missing.display(),
        REQUIRED_ARTIFACTS.join(", ")
    )]
    ArtifactMissing { missing: PathBuf },

    #[error("pool name '{name}' is too long ({len} characters, at most {max})", len = .name.len(), max = MAX_POOL_NAME_LEN)]
    PoolNameTooLong { name: String },

    #[error("pool name '{name}' contains invalid character {ch:?}")]
    PoolNameInvalidChar { name: String, ch: char },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequirementError {
    #[error("required tools not found: {}", .0.join(", "))]
    MissingTools(Vec<String>),

    #[error("root privileges required")]
    NotPrivileged,
}

/// Characters zpool refuses in a pool name.
const INVALID_POOL_CHARS: [char; 3] = [' ', '/', '\\'];

pub fn validate_pool_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyPoolName);
    }
    if name.len() > MAX_POOL_NAME_LEN {
        return Err(ValidationError::PoolNameTooLong {
            name: name.to_string(),
        });
    }
    if let Some(ch) = name.chars().find(|c| INVALID_POOL_CHARS.contains(c)) {
        return Err(ValidationError::PoolNameInvalidChar {
            name: name.to_string(),
            ch,
        });
    }
    Ok(())
}

/// Validate the configuration and the image directory layout.
///
/// Pure filesystem inspection; no external program is started.
pub fn validate_config(config: &InstallConfig) -> Result<()> {
    if config.image_path.as_os_str().is_empty() {
        return Err(ValidationError::EmptyImagePath.into());
    }
    if config.disk_name().is_empty() {
        return Err(ValidationError::EmptyTargetDisk.into());
    }
    validate_pool_name(&config.pool_name)?;

    if !config.image_path.is_dir() {
        return Err(ValidationError::ImageDirMissing(config.image_path.clone()).into());
    }

    for artifact in REQUIRED_ARTIFACTS {
        let path = config.image_path.join(artifact);
        if !path.is_file() {
            return Err(ValidationError::ArtifactMissing { missing: path }.into());
        }
    }

    Ok(())
}

/// Every missing tool is reported at once, then privilege is checked.
pub fn check_requirements(host: &impl Host, tools: &[&str]) -> Result<()> {
    let missing = host.missing_tools(tools);
    if !missing.is_empty() {
        return Err(RequirementError::MissingTools(missing).into());
    }
    if !host.is_privileged() {
        return Err(RequirementError::NotPrivileged.into());
    }
    Ok(())
}
