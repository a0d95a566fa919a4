//! System image builder.
//!
//! Produces an installable image directory:
//!
//! ```text
//! <artifacts>/<id>/root.zfs.xz     replicated stream of <pool>/ROOT/default
//! <artifacts>/<id>/efi.img         FAT32 EFI system partition
//! <artifacts>/<id>/manifest.toml   written last; its presence marks the image complete
//! ```
//!
//! The root filesystem is assembled on a real ZFS pool backed by a sparse file
//! attached as a memory disk, so the stream carries real datasets and properties.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use super::efi::{build_efi_image, LOADER_EFI, SYSTEM_EFI};
use super::manifest::{now_epoch_secs, ArtifactEntry, ImageManifest};
use crate::common::{copy_tree, prepare_work_dir, temp::cleanup_work_dir};
use crate::config::BuildConfig;
use crate::fetch::{Archives, Fetcher};
use crate::host::Host;
use crate::install::partition::{self, device_path, PartitionNaming, DATA_PARTITION_INDEX};
use crate::install::provision::pool_create_args;
use crate::install::validate::check_requirements;
use crate::install::{EFI_IMAGE, MANIFEST, ROOT_DATASET, ROOT_STREAM};
use crate::process::{Cmd, Pipeline};
use crate::profile::{self, ImageProfile};
use crate::timing::Timer;

/// Host tools the image build needs.
pub const IMAGE_TOOLS: &[&str] = &[
    "mdconfig", "gpart", "zpool", "zfs", "tar", "pkg", "xz", "makefs", "curl",
];

/// Suffix of the temporary pool, so it never collides with an installed pool
/// of the same name on the build host.
const BUILD_POOL_SUFFIX: &str = "build";

/// A memory disk backed by a file, plus the pool living on it.
///
/// Dropping the guard exports the pool and detaches the disk, so a failed
/// build doesn't leave either behind.
struct MemoryDisk<'h, H: Host> {
    host: &'h H,
    unit: String,
    pool: Option<String>,
}

impl<'h, H: Host> MemoryDisk<'h, H> {
    fn attach(host: &'h H, backing: &Path) -> Result<Self> {
        let result = host
            .run(
                Cmd::new("mdconfig")
                    .args(["-a", "-t", "vnode", "-f"])
                    .arg_path(backing),
            )
            .context("Failed to attach memory disk")?;
        let unit = result.stdout_trimmed().to_string();
        if unit.is_empty() {
            bail!("mdconfig did not report a device name");
        }
        Ok(Self {
            host,
            unit,
            pool: None,
        })
    }
}

impl<H: Host> Drop for MemoryDisk<'_, H> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            if let Err(e) = self.host.run(Cmd::new("zpool").args(["export", &pool])) {
                tracing::warn!("failed to export build pool {}: {:#}", pool, e);
            }
        }
        if let Err(e) = self
            .host
            .run(Cmd::new("mdconfig").args(["-d", "-u", &self.unit]))
        {
            tracing::warn!("failed to detach {}: {:#}", self.unit, e);
        }
    }
}

pub struct ImageBuilder<'a, H: Host> {
    host: &'a H,
    config: &'a BuildConfig,
    profile: &'a ImageProfile,
}

impl<'a, H: Host> ImageBuilder<'a, H> {
    pub fn new(host: &'a H, config: &'a BuildConfig, profile: &'a ImageProfile) -> Self {
        Self {
            host,
            config,
            profile,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.artifacts_dir().join(&self.profile.id)
    }

    fn build_pool(&self) -> String {
        format!("{}{}", self.profile.pool, BUILD_POOL_SUFFIX)
    }

    fn disk_size_bytes(&self) -> u64 {
        let gb = self.profile.disk_size_gb.unwrap_or(self.config.disk_size_gb);
        u64::from(gb) * 1024 * 1024 * 1024
    }

    /// Build the image. Returns the output directory.
    pub fn build(&self) -> Result<PathBuf> {
        let id = &self.profile.id;
        println!("=== Building image {} ({}) ===\n", id, self.profile.version);

        check_requirements(self.host, IMAGE_TOOLS)?;

        let packages = profile::load_packages(&self.config.pkglists_dir(), &self.profile.pkg_lists)?;

        let t = Timer::start("Distribution archives");
        let archives = Fetcher::from_config(self.config).fetch_archives()?;
        t.finish();

        let work = prepare_work_dir(&self.config.work_dir(), &format!("image-{}", id))?;
        let output = prepare_work_dir(&self.config.artifacts_dir(), id)?;

        let result = self.build_in(&work, &output, &archives, &packages);

        if self.config.keep_work {
            println!("  Keeping work directory {}", work.display());
        } else {
            cleanup_work_dir(&work);
        }
        result?;

        println!("\n=== Image {} complete: {} ===", id, output.display());
        Ok(output)
    }

    fn build_in(
        &self,
        work: &Path,
        output: &Path,
        archives: &Archives,
        packages: &[String],
    ) -> Result<()> {
        let pool = self.build_pool();
        let root_ds = format!("{}/{}", pool, ROOT_DATASET);
        // altroot of the build pool; ROOT/default mounts here
        let root = work.join("mnt");

        // Backing store
        let t = Timer::start("Build pool");
        let backing = work.join("disk.img");
        File::create(&backing)
            .and_then(|f| f.set_len(self.disk_size_bytes()))
            .with_context(|| format!("Failed to create {}", backing.display()))?;

        let mut md = MemoryDisk::attach(self.host, &backing)?;
        println!("  Attached {} ({} bytes)", md.unit, self.disk_size_bytes());

        partition::partition(self.host, &md.unit)?;
        let data_part = PartitionNaming::FreeBsd.device(&md.unit, DATA_PARTITION_INDEX);

        let mut args = pool_create_args(&pool, &root.to_string_lossy(), &device_path(&data_part));
        let at = args.len() - 2;
        args.splice(at..at, ["-O".to_string(), "mountpoint=none".to_string()]);
        self.host
            .run(Cmd::new("zpool").args(args))
            .with_context(|| format!("Failed to create build pool {}", pool))?;
        md.pool = Some(pool.clone());

        self.host
            .run(Cmd::new("zfs").args(["create", "-o", "mountpoint=none", &format!("{}/ROOT", pool)]))?;
        self.host
            .run(Cmd::new("zfs").args(["create", "-o", "mountpoint=/", &root_ds]))?;
        t.finish();

        let t = Timer::start("Base system");
        extract_archives(self.host, archives, &root)?;
        t.finish();

        if !packages.is_empty() {
            let t = Timer::start("Packages");
            install_packages(self.host, &root, packages)?;
            t.finish();
        }

        apply_overlays(&self.config.overlays_dir(), &self.profile.overlays, &root)?;

        for dataset in &self.profile.datasets {
            println!("  Receiving dataset {} from {}", dataset.name, dataset.source);
            let target = format!("{}/{}", root_ds, dataset.name);
            let send = Cmd::new("zfs").args(["send", &dataset.source]);
            let receive = Cmd::new("zfs")
                .args(["receive", "-u"])
                .args(dataset.receive_options())
                .arg(&target);
            self.host
                .run_piped(send, receive)
                .with_context(|| format!("Failed to replicate {} into {}", dataset.source, target))?;
        }

        let t = Timer::start("EFI image");
        build_efi_image(
            self.host,
            &root.join(LOADER_EFI),
            &output.join(EFI_IMAGE),
            &SYSTEM_EFI,
        )?;
        t.finish();

        let t = Timer::start("Root stream");
        let snapshot = format!("{}@{}", root_ds, self.profile.version);
        self.host
            .run(Cmd::new("zfs").args(["snapshot", "-r", &snapshot]))?;

        let stream = output.join(ROOT_STREAM);
        let tmp = output.join(format!("{}.tmp", ROOT_STREAM));
        self.host
            .run_pipeline(
                Pipeline::new(
                    Cmd::new("zfs").args(["send", "-R", &snapshot]),
                    Cmd::new("xz").args(["-T0", "-c"]),
                )
                .output(&tmp),
            )
            .context("Failed to write root stream")?;
        fs::rename(&tmp, &stream)
            .with_context(|| format!("Failed to move {} into place", stream.display()))?;
        t.finish();

        let mut manifest = ImageManifest {
            id: self.profile.id.clone(),
            version: self.profile.version.clone(),
            pool: self.profile.pool.clone(),
            root_dataset: ROOT_DATASET.to_string(),
            freebsd_version: self.config.freebsd_version.clone(),
            arch: self.config.arch.clone(),
            created: now_epoch_secs(),
            packages: packages.to_vec(),
            datasets: self.profile.datasets.iter().map(|d| d.name.clone()).collect(),
            artifacts: Vec::new(),
        };
        for name in [ROOT_STREAM, EFI_IMAGE] {
            manifest.artifacts.push(ArtifactEntry::describe(&output.join(name))?);
        }
        manifest.write(&output.join(MANIFEST))?;

        drop(md);
        Ok(())
    }
}

/// Extract the distribution archives over `root`, keeping permissions.
pub fn extract_archives(host: &impl Host, archives: &Archives, root: &Path) -> Result<()> {
    fs::create_dir_all(root).with_context(|| format!("Failed to create {}", root.display()))?;
    for archive in archives.iter() {
        println!("  Extracting {}", archive.display());
        host.run(
            Cmd::new("tar")
                .arg("-xpf")
                .arg_path(archive)
                .arg("-C")
                .arg_path(root)
                .error_msg(format!("Failed to extract {}", archive.display())),
        )?;
    }
    Ok(())
}

pub fn install_packages(host: &impl Host, root: &Path, packages: &[String]) -> Result<()> {
    println!("  Installing {} packages", packages.len());
    host.run(
        Cmd::new("pkg")
            .arg("-r")
            .arg_path(root)
            .args(["install", "-y"])
            .args(packages),
    )
    .context("Package installation failed")?;
    Ok(())
}

/// Copy each named overlay directory over `root`, in order.
pub fn apply_overlays(overlays_dir: &Path, overlays: &[String], root: &Path) -> Result<()> {
    for name in overlays {
        let src = overlays_dir.join(name);
        if !src.is_dir() {
            bail!("overlay '{}' not found at {}", name, src.display());
        }
        let n = copy_tree(&src, root)?;
        println!("  Applied overlay {} ({} files)", name, n);
    }
    Ok(())
}
