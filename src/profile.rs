//! Image and variant definitions.
//!
//! `images/<id>.toml` describes a system image, `variants/<id>.toml` a
//! boot-environment ISO. Package lists live in `pkglists/<name>.txt`, one
//! package per line.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::install::DEFAULT_POOL_NAME;

/// `canmount` property of a received dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanMount {
    On,
    Off,
    Noauto,
}

impl fmt::Display for CanMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CanMount::On => "on",
            CanMount::Off => "off",
            CanMount::Noauto => "noauto",
        })
    }
}

/// An existing dataset or snapshot replicated into the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetOverlay {
    /// Name below the image root dataset.
    pub name: String,
    /// Snapshot (or dataset) handed to `zfs send`.
    pub source: String,
    #[serde(default)]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub can_mount: Option<CanMount>,
    /// Passed through as `-o key=value`.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl DatasetOverlay {
    /// `-o` options for the receiving side, mountpoint and canmount first.
    pub fn receive_options(&self) -> Vec<String> {
        let mut opts = Vec::new();
        if let Some(mp) = &self.mountpoint {
            opts.push("-o".to_string());
            opts.push(format!("mountpoint={}", mp));
        }
        if let Some(cm) = self.can_mount {
            opts.push("-o".to_string());
            opts.push(format!("canmount={}", cm));
        }
        for (key, value) in &self.properties {
            opts.push("-o".to_string());
            opts.push(format!("{}={}", key, value));
        }
        opts
    }
}

fn default_pool() -> String {
    DEFAULT_POOL_NAME.to_string()
}

/// A system image definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageProfile {
    pub id: String,
    pub version: String,
    #[serde(default = "default_pool")]
    pub pool: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pkg_lists: Vec<String>,
    /// Directories under the overlays dir copied over the root.
    #[serde(default)]
    pub overlays: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<DatasetOverlay>,
    #[serde(default)]
    pub disk_size_gb: Option<u32>,
}

/// A boot-environment ISO definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantProfile {
    pub id: String,
    pub name: String,
    /// ISO 9660 volume label; defaults to the uppercased id.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub pkg_lists: Vec<String>,
    #[serde(default)]
    pub overlays: Vec<String>,
    /// Built image ids embedded for the installer.
    #[serde(default)]
    pub images: Vec<String>,
    /// Where those images are taken from; defaults to the artifacts dir.
    #[serde(default)]
    pub images_dir: Option<PathBuf>,
}

impl VariantProfile {
    pub fn volume_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.id.to_uppercase().replace('-', "_"))
    }
}

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn check_id(kind: &str, path: &Path, expected: &str, actual: &str) -> Result<()> {
    if expected != actual {
        bail!(
            "{} {} declares id '{}', expected '{}'",
            kind,
            path.display(),
            actual,
            expected
        );
    }
    Ok(())
}

pub fn load_image(images_dir: &Path, id: &str) -> Result<ImageProfile> {
    let path = images_dir.join(format!("{}.toml", id));
    if !path.is_file() {
        bail!("image '{}' not found (looked for {})", id, path.display());
    }
    let profile: ImageProfile = load_toml(&path)?;
    check_id("image", &path, id, &profile.id)?;
    if profile.version.trim().is_empty() {
        bail!("image '{}' has an empty version", id);
    }
    crate::install::validate::validate_pool_name(&profile.pool)
        .with_context(|| format!("image '{}' has an invalid pool name", id))?;
    Ok(profile)
}

pub fn load_variant(variants_dir: &Path, id: &str) -> Result<VariantProfile> {
    let path = variants_dir.join(format!("{}.toml", id));
    if !path.is_file() {
        bail!("variant '{}' not found (looked for {})", id, path.display());
    }
    let profile: VariantProfile = load_toml(&path)?;
    check_id("variant", &path, id, &profile.id)?;
    Ok(profile)
}

/// Ids of every `*.toml` definition in `dir`, sorted. A missing dir has none.
pub fn list_ids(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "toml") {
            if let Some(stem) = path.file_stem() {
                ids.push(stem.to_string_lossy().into_owned());
            }
        }
    }
    ids.sort();
    Ok(ids)
}

/// Packages named in a package list file.
pub fn parse_pkglist(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Packages from every named list, deduplicated, in declaration order.
pub fn load_packages(pkglists_dir: &Path, lists: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut packages = Vec::new();
    for list in lists {
        let path = pkglists_dir.join(format!("{}.txt", list));
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read package list {}", path.display()))?;
        for pkg in parse_pkglist(&content) {
            if seen.insert(pkg.clone()) {
                packages.push(pkg);
            }
        }
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_profile() {
        let profile: ImageProfile = toml::from_str(
            r#"
            id = "desktop"
            version = "0.1.0"
            pkg_lists = ["base", "desktop"]

            [[datasets]]
            name = "home"
            source = "tank/home@golden"
            mountpoint = "/home"
            can_mount = "noauto"
            properties = { quota = "10G", compression = "zstd" }
            "#,
        )
        .unwrap();

        assert_eq!(profile.pool, "pgsd");
        assert_eq!(profile.datasets.len(), 1);
        assert_eq!(
            profile.datasets[0].receive_options(),
            vec![
                "-o",
                "mountpoint=/home",
                "-o",
                "canmount=noauto",
                "-o",
                "compression=zstd",
                "-o",
                "quota=10G"
            ]
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = toml::from_str::<ImageProfile>("id = \"x\"\nversion = \"1\"\nzpool = \"a\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_volume_label() {
        let v: VariantProfile = toml::from_str("id = \"live-dev\"\nname = \"Live\"\n").unwrap();
        assert_eq!(v.volume_label(), "LIVE_DEV");
    }

    #[test]
    fn test_parse_pkglist() {
        let pkgs = parse_pkglist("# base tools\nsudo\n\n  tmux  # terminal\nvim\n");
        assert_eq!(pkgs, vec!["sudo", "tmux", "vim"]);
    }

    #[test]
    fn test_load_packages_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("base.txt"), "sudo\ntmux\n").unwrap();
        fs::write(dir.path().join("dev.txt"), "git\nsudo\n").unwrap();

        let pkgs = load_packages(dir.path(), &["base".into(), "dev".into()]).unwrap();
        assert_eq!(pkgs, vec!["sudo", "tmux", "git"]);
        assert!(load_packages(dir.path(), &["missing".into()]).is_err());
    }

    #[test]
    fn test_load_image_checks_id() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("base.toml"),
            "id = \"other\"\nversion = \"1\"\n",
        )
        .unwrap();
        let err = load_image(dir.path(), "base").unwrap_err();
        assert!(err.to_string().contains("expected 'base'"));
        assert_eq!(list_ids(dir.path()).unwrap(), vec!["base"]);
    }
}
