//! `manifest.toml`, the record written next to every built image.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::common::sha256_file;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub name: String,
    pub size: u64,
    pub sha256: String,
}

impl ArtifactEntry {
    pub fn describe(path: &Path) -> Result<Self> {
        let size = fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size,
            sha256: sha256_file(path)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageManifest {
    pub id: String,
    pub version: String,
    pub pool: String,
    pub root_dataset: String,
    pub freebsd_version: String,
    pub arch: String,
    /// Seconds since the Unix epoch.
    pub created: u64,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactEntry>,
}

impl ImageManifest {
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize manifest")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }
}

pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let efi = dir.path().join("efi.img");
        fs::write(&efi, "abc").unwrap();

        let manifest = ImageManifest {
            id: "base".into(),
            version: "0.1.0".into(),
            pool: "pgsd".into(),
            root_dataset: "ROOT/default".into(),
            freebsd_version: "14.2-RELEASE".into(),
            arch: "amd64".into(),
            created: 1_700_000_000,
            packages: vec!["sudo".into()],
            datasets: vec![],
            artifacts: vec![ArtifactEntry::describe(&efi).unwrap()],
        };
        let path = dir.path().join("manifest.toml");
        manifest.write(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("id = \"base\""), "{text}");
        assert!(text.contains("[[artifacts]]"), "{text}");
        assert!(text.contains("size = 3"), "{text}");
        assert_eq!(ImageManifest::read(&path).unwrap().artifacts[0].name, "efi.img");
    }
}
