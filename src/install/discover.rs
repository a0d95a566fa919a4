//! Finding what can be installed, and where.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::MANIFEST;
use crate::host::Host;
use crate::process::Cmd;

/// Where a live boot environment carries its images.
pub const SYSTEM_IMAGES_DIR: &str = "/usr/local/share/pgsd/images";

/// Device prefixes that are never install targets (optical, memory, passthrough).
const EXCLUDED_PREFIXES: [&str; 3] = ["cd", "md", "pass"];

/// An image directory ready for installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallableImage {
    pub id: String,
    pub path: PathBuf,
}

/// A candidate target disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskInfo {
    pub device: String,
    pub size_bytes: Option<u64>,
    pub model: String,
}

impl DiskInfo {
    pub fn size_display(&self) -> String {
        self.size_bytes
            .map(format_bytes)
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Image directories (those holding a manifest) in the first of `dirs` that exists.
///
/// `dirs` is searched in order; the live system location normally comes
/// first and the local artifacts directory second.
pub fn list_installable_images(dirs: &[PathBuf]) -> Result<Vec<InstallableImage>> {
    let Some(dir) = dirs.iter().find(|d| d.is_dir()) else {
        return Ok(Vec::new());
    };
    scan_image_dir(dir)
}

fn scan_image_dir(dir: &Path) -> Result<Vec<InstallableImage>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read images directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && path.join(MANIFEST).is_file() {
            images.push(InstallableImage {
                id: entry.file_name().to_string_lossy().into_owned(),
                path,
            });
        }
    }
    images.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(images)
}

/// Resolve `--image`: an existing directory, or an image id under `dirs`.
pub fn resolve_image(image: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let direct = Path::new(image);
    if direct.is_dir() {
        return Some(direct.to_path_buf());
    }
    dirs.iter()
        .map(|d| d.join(image))
        .find(|p| p.join(MANIFEST).is_file())
}

/// Candidate install disks, from `geom disk list` or, failing that, `kern.disks`.
pub fn list_disks(host: &impl Host) -> Vec<DiskInfo> {
    let from_geom = host
        .run(Cmd::new("geom").args(["disk", "list"]))
        .map(|r| parse_geom_disk_list(&r.stdout))
        .unwrap_or_default();
    if !from_geom.is_empty() {
        return from_geom;
    }

    let names = match host.run(Cmd::new("sysctl").args(["-n", "kern.disks"])) {
        Ok(r) => r.stdout,
        Err(e) => {
            tracing::debug!("kern.disks unavailable: {:#}", e);
            return Vec::new();
        }
    };

    names
        .split_whitespace()
        .filter(|name| is_install_candidate(name))
        .map(|name| {
            let info = host
                .run(Cmd::new("diskinfo").arg(name))
                .map(|r| r.stdout)
                .unwrap_or_default();
            parse_diskinfo(name, &info)
        })
        .collect()
}

fn is_install_candidate(device: &str) -> bool {
    !EXCLUDED_PREFIXES.iter().any(|p| device.starts_with(p))
}

/// Parse the output of `geom disk list`.
pub fn parse_geom_disk_list(output: &str) -> Vec<DiskInfo> {
    let mut disks = Vec::new();
    let mut current: Option<DiskInfo> = None;

    for line in output.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("Geom name:") {
            disks.extend(current.take());
            current = Some(DiskInfo {
                device: name.trim().to_string(),
                size_bytes: None,
                model: String::new(),
            });
            continue;
        }
        let Some(disk) = current.as_mut() else {
            continue;
        };
        if let Some(rest) = line.strip_prefix("Mediasize:") {
            disk.size_bytes = rest
                .split_whitespace()
                .next()
                .and_then(|n| n.parse().ok());
        } else if let Some(descr) = line.strip_prefix("descr:") {
            disk.model = descr.trim().to_string();
        }
    }
    disks.extend(current);

    disks
        .into_iter()
        .filter(|d| !d.device.is_empty() && is_install_candidate(&d.device))
        .collect()
}

/// Parse one line of `diskinfo <dev>`: device, sector size, media size, then geometry.
///
/// The short form carries no description, so the model is always the generic "Disk".
fn parse_diskinfo(name: &str, output: &str) -> DiskInfo {
    let fields: Vec<&str> = output.split_whitespace().collect();
    DiskInfo {
        device: name.to_string(),
        size_bytes: fields.get(2).and_then(|s| s.parse().ok()),
        model: "Disk".to_string(),
    }
}

/// Human-readable binary size: `1.5GB`, `512B`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    let b = bytes as f64;
    match bytes {
        n if n >= TB => format!("{:.1}TB", b / TB as f64),
        n if n >= GB => format!("{:.1}GB", b / GB as f64),
        n if n >= MB => format!("{:.1}MB", b / MB as f64),
        n if n >= KB => format!("{:.1}KB", b / KB as f64),
        n => format!("{}B", n),
    }
}
