//! Clean command - removes build outputs.

use anyhow::Result;

use crate::clean::{clean, CleanTarget};
use crate::config::BuildConfig;

/// Execute the clean command. Without a target only the work directory goes.
pub fn cmd_clean(config: &BuildConfig, target: Option<CleanTarget>) -> Result<()> {
    clean(config, target.unwrap_or(CleanTarget::Work))
}
