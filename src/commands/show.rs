//! Show command - displays information.

use anyhow::Result;

use crate::config::BuildConfig;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
}

/// Execute the show command.
pub fn cmd_show(config: &BuildConfig, target: ShowTarget) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
    }
    Ok(())
}
