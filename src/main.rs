//! pgsdbuild - FreeBSD-based system image, ISO builder and installer.
//!
//! Builds ZFS system images and hybrid bootable boot-environment ISOs, and
//! installs images onto disks:
//! - System image: replicated ZFS stream + EFI system partition image
//! - Boot-environment ISO: live FreeBSD root carrying images and the installer
//! - Installation: GPT partitioning, ZFS pool, stream receive, boot code

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pgsdbuild::clean::CleanTarget as CleanWhat;
use pgsdbuild::commands;
use pgsdbuild::config::BuildConfig;
use pgsdbuild::install::DEFAULT_POOL_NAME;

#[derive(Parser)]
#[command(name = "pgsdbuild")]
#[command(about = "FreeBSD system image and ISO builder")]
#[command(
    after_help = "QUICK START:\n  pgsdbuild preflight     Check host tools\n  pgsdbuild image base    Build the 'base' image\n  pgsdbuild iso live      Build the 'live' ISO\n  pgsdbuild clean         Remove the work directory"
)]
struct Cli {
    /// Debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Keep the work directory after a build
    #[arg(long, global = true)]
    keep_work: bool,

    #[arg(long, global = true)]
    images_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    variants_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    artifacts_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    iso_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a system image
    Image {
        /// Image id (images/<id>.toml)
        id: String,
    },

    /// Build a bootable boot-environment ISO
    Iso {
        /// Variant id (variants/<id>.toml)
        variant: String,
    },

    /// List image definitions
    ListImages {
        #[arg(long)]
        json: bool,
    },

    /// List ISO variant definitions
    ListVariants {
        #[arg(long)]
        json: bool,
    },

    /// Install an image onto a disk (DESTROYS ALL DATA ON THE DISK)
    Install {
        /// Image directory, or the id of a built image
        #[arg(long)]
        image: String,

        /// Target disk, e.g. ada0
        #[arg(long)]
        disk: String,

        #[arg(long, default_value = DEFAULT_POOL_NAME)]
        pool: String,

        /// Confirm that the disk may be erased
        #[arg(long)]
        yes: bool,
    },

    /// List candidate install disks
    Disks {
        #[arg(long)]
        json: bool,
    },

    /// List installable images
    Installable,

    /// Make an existing ISO bootable from USB
    Hybrid {
        iso: PathBuf,

        /// MBR boot code file
        #[arg(long, conflicts_with = "root")]
        boot_code: Option<PathBuf>,

        /// Look for boot/pmbr or boot/cdboot under this root (default: /)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Download the FreeBSD distribution archives
    Fetch,

    /// Run preflight checks
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Clean build outputs (default: work directory)
    Clean {
        #[command(subcommand)]
        what: Option<CleanTarget>,
    },

    /// Print the version
    Version,
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum CleanTarget {
    /// Remove the work directory
    Work,
    /// Remove built images
    Artifacts,
    /// Remove built ISOs
    Iso,
    /// Remove downloaded distribution archives
    Distfiles,
    /// Remove everything
    All,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_env("PGSD_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(format)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<BuildConfig> {
    let root_dir = std::env::current_dir()?;
    let mut config = BuildConfig::load(&root_dir)?;

    config.verbose |= cli.verbose;
    config.keep_work |= cli.keep_work;
    let overrides = [
        (&cli.images_dir, &mut config.images_dir),
        (&cli.variants_dir, &mut config.variants_dir),
        (&cli.artifacts_dir, &mut config.artifacts_dir),
        (&cli.work_dir, &mut config.work_dir),
        (&cli.iso_dir, &mut config.iso_dir),
    ];
    for (flag, field) in overrides {
        if let Some(dir) = flag {
            *field = dir.clone();
        }
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(config.verbose, cli.quiet);

    match cli.command {
        Commands::Image { id } => commands::cmd_image(&config, &id)?,

        Commands::Iso { variant } => commands::cmd_iso(&config, &variant)?,

        Commands::ListImages { json } => commands::cmd_list_images(&config, json)?,

        Commands::ListVariants { json } => commands::cmd_list_variants(&config, json)?,

        Commands::Install {
            image,
            disk,
            pool,
            yes,
        } => {
            let args = commands::install::InstallArgs {
                image,
                disk,
                pool,
                yes,
            };
            let code = commands::cmd_install(&config, &args)?;
            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::Disks { json } => commands::cmd_disks(json)?,

        Commands::Installable => commands::cmd_installable(&config)?,

        Commands::Hybrid {
            iso,
            boot_code,
            root,
        } => commands::cmd_hybrid(&iso, boot_code.as_deref(), root.as_deref())?,

        Commands::Fetch => commands::cmd_fetch(&config)?,

        Commands::Preflight { strict } => commands::cmd_preflight(&config, strict)?,

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
            };
            commands::cmd_show(&config, show_target)?;
        }

        Commands::Clean { what } => {
            let clean_target = what.map(|w| match w {
                CleanTarget::Work => CleanWhat::Work,
                CleanTarget::Artifacts => CleanWhat::Artifacts,
                CleanTarget::Iso => CleanWhat::Iso,
                CleanTarget::Distfiles => CleanWhat::Distfiles,
                CleanTarget::All => CleanWhat::All,
            });
            commands::cmd_clean(&config, clean_target)?;
        }

        Commands::Version => {
            println!("pgsdbuild {}", env!("CARGO_PKG_VERSION"));
            println!("FreeBSD release: {} ({})", config.freebsd_version, config.arch);
        }
    }

    Ok(())
}
