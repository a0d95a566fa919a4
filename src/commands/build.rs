//! Build commands - system images and ISOs.

use anyhow::Result;

use crate::artifact::{ImageBuilder, IsoBuilder};
use crate::config::BuildConfig;
use crate::host::SystemHost;
use crate::profile;
use crate::timing::Timer;

/// Execute `pgsdbuild image <id>`.
pub fn cmd_image(config: &BuildConfig, id: &str) -> Result<()> {
    let profile = profile::load_image(&config.images_dir(), id)?;
    let host = SystemHost;

    let total = Timer::start("Total");
    ImageBuilder::new(&host, config, &profile).build()?;
    total.finish();
    Ok(())
}

/// Execute `pgsdbuild iso <variant>`.
pub fn cmd_iso(config: &BuildConfig, variant: &str) -> Result<()> {
    let profile = profile::load_variant(&config.variants_dir(), variant)?;
    let host = SystemHost;

    let total = Timer::start("Total");
    IsoBuilder::new(&host, config, &profile).build()?;
    total.finish();
    Ok(())
}
