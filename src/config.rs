//! Configuration management for pgsdbuild.
//!
//! Values come from, in increasing precedence: built-in defaults, a `.env`
//! file in the root directory, the process environment, and CLI flags
//! (applied by the caller on the loaded struct).

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_FREEBSD_VERSION: &str = "14.2-RELEASE";
pub const DEFAULT_ARCH: &str = "amd64";
pub const DEFAULT_MIRROR: &str = "https://download.freebsd.org";
pub const DEFAULT_DISK_SIZE_GB: u32 = 10;

/// Build configuration.
///
/// Directory fields hold the configured value; use the accessor methods to get
/// paths resolved against `root_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub images_dir: PathBuf,
    pub variants_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub work_dir: PathBuf,
    pub iso_dir: PathBuf,
    pub overlays_dir: PathBuf,
    pub pkglists_dir: PathBuf,
    pub distfiles_dir: PathBuf,

    pub verbose: bool,
    pub keep_work: bool,
    pub disk_size_gb: u32,

    pub freebsd_version: String,
    pub arch: String,
    pub mirror: String,

    pub root_dir: PathBuf,
}

impl BuildConfig {
    pub fn new(root_dir: &Path) -> Self {
        let distfiles_dir = dirs::cache_dir()
            .map(|d| d.join("pgsd/distfiles"))
            .unwrap_or_else(|| PathBuf::from("distfiles"));

        Self {
            images_dir: "images".into(),
            variants_dir: "variants".into(),
            artifacts_dir: "artifacts".into(),
            work_dir: "work".into(),
            iso_dir: "iso".into(),
            overlays_dir: "overlays".into(),
            pkglists_dir: "pkglists".into(),
            distfiles_dir,
            verbose: false,
            keep_work: false,
            disk_size_gb: DEFAULT_DISK_SIZE_GB,
            freebsd_version: DEFAULT_FREEBSD_VERSION.to_string(),
            arch: DEFAULT_ARCH.to_string(),
            mirror: DEFAULT_MIRROR.to_string(),
            root_dir: root_dir.to_path_buf(),
        }
    }

    /// Load configuration from `<root_dir>/.env` and the environment.
    pub fn load(root_dir: &Path) -> Result<Self> {
        let mut vars = HashMap::new();

        let env_path = root_dir.join(".env");
        if env_path.is_file() {
            let iter = dotenvy::from_path_iter(&env_path)
                .with_context(|| format!("Failed to read {}", env_path.display()))?;
            for item in iter {
                let (key, value) =
                    item.with_context(|| format!("Malformed line in {}", env_path.display()))?;
                vars.insert(key, value);
            }
        }

        // Environment overrides .env
        vars.extend(std::env::vars());

        Self::from_vars(root_dir, &vars)
    }

    /// Build a configuration from an explicit variable map.
    pub fn from_vars(root_dir: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::new(root_dir);
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let dir_vars = [
            ("PGSD_IMAGES_DIR", &mut config.images_dir),
            ("PGSD_VARIANTS_DIR", &mut config.variants_dir),
            ("PGSD_ARTIFACTS_DIR", &mut config.artifacts_dir),
            ("PGSD_WORK_DIR", &mut config.work_dir),
            ("PGSD_ISO_DIR", &mut config.iso_dir),
            ("PGSD_OVERLAYS_DIR", &mut config.overlays_dir),
            ("PGSD_PKGLISTS_DIR", &mut config.pkglists_dir),
            ("PGSD_DISTFILES_DIR", &mut config.distfiles_dir),
        ];
        for (key, field) in dir_vars {
            if let Some(v) = get(key) {
                *field = PathBuf::from(v);
            }
        }

        if let Some(v) = get("PGSD_VERBOSE") {
            config.verbose = parse_flag(v);
        }
        if let Some(v) = get("PGSD_KEEP_WORK") {
            config.keep_work = parse_flag(v);
        }
        if let Some(v) = get("PGSD_DISK_SIZE_GB") {
            config.disk_size_gb = v
                .parse()
                .with_context(|| format!("PGSD_DISK_SIZE_GB must be a whole number, got '{}'", v))?;
        }
        if let Some(v) = get("PGSD_FREEBSD_VERSION") {
            config.freebsd_version = v.to_string();
        }
        if let Some(v) = get("PGSD_ARCH") {
            config.arch = v.to_string();
        }
        if let Some(v) = get("PGSD_MIRROR") {
            config.mirror = v.trim_end_matches('/').to_string();
        }

        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.disk_size_gb == 0 {
            bail!("disk size must be at least 1 GB");
        }
        if self.freebsd_version.is_empty() {
            bail!("FreeBSD version is not set");
        }
        if self.arch.is_empty() {
            bail!("architecture is not set");
        }
        Ok(())
    }

    /// Resolve a directory relative to `root_dir`.
    pub fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root_dir.join(dir)
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.resolve(&self.images_dir)
    }

    pub fn variants_dir(&self) -> PathBuf {
        self.resolve(&self.variants_dir)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.resolve(&self.artifacts_dir)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.resolve(&self.work_dir)
    }

    pub fn iso_dir(&self) -> PathBuf {
        self.resolve(&self.iso_dir)
    }

    pub fn overlays_dir(&self) -> PathBuf {
        self.resolve(&self.overlays_dir)
    }

    pub fn pkglists_dir(&self) -> PathBuf {
        self.resolve(&self.pkglists_dir)
    }

    pub fn distfiles_dir(&self) -> PathBuf {
        self.resolve(&self.distfiles_dir)
    }

    /// Print configuration for `show config`.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  Root:          {}", self.root_dir.display());
        println!("  Images:        {}", self.images_dir().display());
        println!("  Variants:      {}", self.variants_dir().display());
        println!("  Artifacts:     {}", self.artifacts_dir().display());
        println!("  Work:          {}", self.work_dir().display());
        println!("  ISO output:    {}", self.iso_dir().display());
        println!("  Overlays:      {}", self.overlays_dir().display());
        println!("  Package lists: {}", self.pkglists_dir().display());
        println!("  Distfiles:     {}", self.distfiles_dir().display());
        println!("  FreeBSD:       {} ({})", self.freebsd_version, self.arch);
        println!("  Mirror:        {}", self.mirror);
        println!("  Disk size:     {} GB", self.disk_size_gb);
        println!("  Keep work:     {}", self.keep_work);
        println!("  Verbose:       {}", self.verbose);
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
