//! Installation of a built system image onto a disk.
//!
//! The pipeline is strictly linear:
//!
//! ```text
//! Validating -> CheckingRequirements -> Partitioning -> FormattingEfi
//!   -> CreatingPool -> TransferringStream -> InstallingEfiImage
//!   -> InstallingBootloader -> Finalizing -> Complete
//! ```
//!
//! Nothing destructive happens before `Partitioning`. Once it has started there
//! is no rollback: a failure leaves the disk in whatever state the failing
//! stage left it, and [`InstallError::last_completed`] records how far we got.

pub mod bootloader;
pub mod discover;
pub mod finalize;
pub mod partition;
pub mod provision;
pub mod transfer;
pub mod validate;

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::host::Host;
use crate::process::Cmd;

pub use partition::PartitionNaming;
pub use transfer::TransferError;
pub use validate::{RequirementError, ValidationError};

/// Compressed ZFS stream of the root dataset.
pub const ROOT_STREAM: &str = "root.zfs.xz";
/// Raw image of the EFI system partition.
pub const EFI_IMAGE: &str = "efi.img";
/// Build metadata; only its presence matters to the installer.
pub const MANIFEST: &str = "manifest.toml";
/// Every image directory must contain exactly these.
pub const REQUIRED_ARTIFACTS: [&str; 3] = [ROOT_STREAM, EFI_IMAGE, MANIFEST];

/// Tools every installation stage depends on.
pub const REQUIRED_TOOLS: &[&str] = &["gpart", "newfs_msdos", "zpool", "zfs", "xzcat", "dd"];

/// Dataset (below the pool) that receives the root stream and becomes bootfs.
pub const ROOT_DATASET: &str = "ROOT/default";

/// Alternate root for the new pool, so its mounts stay out of the live system.
pub const ALTROOT: &str = "/mnt";

/// Boot code handed to `gpart bootcode`.
pub const EFI_BOOT_BLOB: &str = "/boot/boot1.efifat";

/// Pool names longer than this are rejected by zpool.
pub const MAX_POOL_NAME_LEN: usize = 63;

/// Pool name used when the operator doesn't pick one.
pub const DEFAULT_POOL_NAME: &str = "pgsd";

/// `<pool>/ROOT/default`
pub fn root_dataset(pool: &str) -> String {
    format!("{}/{}", pool, ROOT_DATASET)
}

/// What to install, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    /// Directory holding [`REQUIRED_ARTIFACTS`].
    pub image_path: PathBuf,
    /// Block device, e.g. `ada0` (a leading `/dev/` is tolerated).
    pub target_disk: String,
    pub pool_name: String,
}

impl InstallConfig {
    pub fn new(image_path: impl Into<PathBuf>, target_disk: &str, pool_name: &str) -> Self {
        Self {
            image_path: image_path.into(),
            target_disk: target_disk.to_string(),
            pool_name: pool_name.to_string(),
        }
    }

    /// GEOM name of the target disk (`/dev/ada0` -> `ada0`).
    pub fn disk_name(&self) -> &str {
        self.target_disk
            .strip_prefix("/dev/")
            .unwrap_or(&self.target_disk)
    }
}

/// Pipeline states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Validating,
    CheckingRequirements,
    Partitioning,
    FormattingEfi,
    CreatingPool,
    TransferringStream,
    InstallingEfiImage,
    InstallingBootloader,
    Finalizing,
    Complete,
}

impl Stage {
    /// Every stage, in order.
    pub const ALL: [Stage; 10] = [
        Stage::Validating,
        Stage::CheckingRequirements,
        Stage::Partitioning,
        Stage::FormattingEfi,
        Stage::CreatingPool,
        Stage::TransferringStream,
        Stage::InstallingEfiImage,
        Stage::InstallingBootloader,
        Stage::Finalizing,
        Stage::Complete,
    ];

    /// Message sent to the progress sink when the stage starts.
    pub fn progress_message(self) -> &'static str {
        match self {
            Stage::Validating => "Validating installation configuration...",
            Stage::CheckingRequirements => "Checking system requirements...",
            Stage::Partitioning => "Partitioning disk...",
            Stage::FormattingEfi => "Creating EFI system partition...",
            Stage::CreatingPool => "Creating ZFS pool...",
            Stage::TransferringStream => {
                "Extracting root filesystem (this may take several minutes)..."
            }
            Stage::InstallingEfiImage => "Installing EFI partition...",
            Stage::InstallingBootloader => "Installing bootloader...",
            Stage::Finalizing => "Finalizing installation...",
            Stage::Complete => "Installation complete!",
        }
    }

    /// Operator remediation shown alongside a failure in this stage.
    pub fn hint(self) -> Option<&'static str> {
        match self {
            Stage::Partitioning => {
                Some("Ensure the disk is not in use and you have root privileges")
            }
            Stage::FormattingEfi => Some("The partition may not have been created properly"),
            Stage::CreatingPool => Some("Ensure the ZFS kernel module is loaded (kldload zfs)"),
            Stage::TransferringStream => Some("Ensure the ZFS stream file is not corrupted"),
            Stage::InstallingBootloader => {
                Some("Ensure /boot/boot1.efifat exists on the running system")
            }
            Stage::CheckingRequirements => {
                Some("Install the missing tools and run the installer as root")
            }
            _ => None,
        }
    }

    /// True for stages that modify the target disk.
    pub fn is_destructive(self) -> bool {
        self >= Stage::Partitioning && self != Stage::Complete
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validation",
            Stage::CheckingRequirements => "requirements check",
            Stage::Partitioning => "disk partitioning",
            Stage::FormattingEfi => "EFI filesystem creation",
            Stage::CreatingPool => "ZFS pool creation",
            Stage::TransferringStream => "root filesystem extraction",
            Stage::InstallingEfiImage => "EFI partition installation",
            Stage::InstallingBootloader => "bootloader installation",
            Stage::Finalizing => "installation finalization",
            Stage::Complete => "completion",
        };
        f.write_str(name)
    }
}

/// An installation that stopped at `stage`.
#[derive(Debug)]
pub struct InstallError {
    /// The stage that failed.
    pub stage: Stage,
    /// The last stage that finished; `None` if the first one failed.
    pub last_completed: Option<Stage>,
    source: anyhow::Error,
}

impl InstallError {
    /// The underlying failure, for downcasting to the typed errors.
    pub fn cause(&self) -> &anyhow::Error {
        &self.source
    }

    pub fn hint(&self) -> Option<&'static str> {
        self.stage.hint()
    }

    /// Whether the target disk may have been modified.
    pub fn disk_touched(&self) -> bool {
        self.stage.is_destructive()
    }
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {:#}", self.stage, self.source)
    }
}

impl std::error::Error for InstallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Runs the installation pipeline against a [`Host`].
pub struct Installer<'a, H: Host> {
    host: &'a H,
    naming: PartitionNaming,
    log: Option<Box<dyn Fn(&str) + 'a>>,
}

impl<'a, H: Host> Installer<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self {
            host,
            naming: PartitionNaming::default(),
            log: None,
        }
    }

    /// Receive a progress line before each stage. Without one, installation is silent.
    pub fn with_log(mut self, log: impl Fn(&str) + 'a) -> Self {
        self.log = Some(Box::new(log));
        self
    }

    pub fn with_partition_naming(mut self, naming: PartitionNaming) -> Self {
        self.naming = naming;
        self
    }

    fn log(&self, msg: &str) {
        if let Some(log) = &self.log {
            log(msg);
        }
    }

    /// Install `config.image_path` onto `config.target_disk`, destroying its contents.
    pub fn install(&self, config: &InstallConfig) -> Result<(), InstallError> {
        let mut run = StageRunner {
            installer: self,
            last_completed: None,
        };

        run.stage(Stage::Validating, || validate::validate_config(config))?;
        run.stage(Stage::CheckingRequirements, || {
            validate::check_requirements(self.host, REQUIRED_TOOLS)
        })?;

        let disk = config.disk_name();
        let efi_part = self.naming.device(disk, partition::EFI_PARTITION_INDEX);
        let data_part = self.naming.device(disk, partition::DATA_PARTITION_INDEX);

        run.stage(Stage::Partitioning, || partition::partition(self.host, disk))?;
        run.stage(Stage::FormattingEfi, || {
            provision::format_efi(self.host, &efi_part)
        })?;
        run.stage(Stage::CreatingPool, || {
            provision::create_pool(self.host, &config.pool_name, &data_part)
        })?;
        run.stage(Stage::TransferringStream, || {
            transfer::transfer(
                self.host,
                &config.image_path.join(ROOT_STREAM),
                &config.pool_name,
            )
            .map_err(anyhow::Error::from)
        })?;
        run.stage(Stage::InstallingEfiImage, || {
            copy_efi_image(self.host, &config.image_path.join(EFI_IMAGE), &efi_part)
        })?;
        run.stage(Stage::InstallingBootloader, || {
            bootloader::install_bootcode(
                self.host,
                disk,
                Path::new(EFI_BOOT_BLOB),
                partition::EFI_PARTITION_INDEX,
            )
        })?;
        run.stage(Stage::Finalizing, || {
            finalize::finalize(self.host, &config.pool_name)
        })?;

        self.log(Stage::Complete.progress_message());
        tracing::info!(disk, pool = %config.pool_name, "installation complete");
        Ok(())
    }
}

struct StageRunner<'r, 'a, H: Host> {
    installer: &'r Installer<'a, H>,
    last_completed: Option<Stage>,
}

impl<H: Host> StageRunner<'_, '_, H> {
    fn stage<T>(&mut self, stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T, InstallError> {
        self.installer.log(stage.progress_message());
        tracing::debug!(%stage, "entering stage");
        match f() {
            Ok(value) => {
                self.last_completed = Some(stage);
                Ok(value)
            }
            Err(source) => {
                tracing::debug!(%stage, "stage failed: {:#}", source);
                Err(InstallError {
                    stage,
                    last_completed: self.last_completed,
                    source,
                })
            }
        }
    }
}

/// Whole-file raw copy of the EFI image onto the EFI partition.
pub fn copy_efi_image(host: &impl Host, image: &Path, efi_part: &str) -> Result<()> {
    if !image.is_file() {
        anyhow::bail!("EFI image file not found: {}", image.display());
    }
    host.run(
        Cmd::new("dd")
            .arg(format!("if={}", image.display()))
            .arg(format!("of={}", partition::device_path(efi_part)))
            .arg("bs=1M"),
    )
    .with_context(|| format!("Failed to copy EFI image to {}", efi_part))?;
    Ok(())
}
