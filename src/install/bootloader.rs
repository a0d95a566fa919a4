use anyhow::{Context, Result};
use std::path::Path;

use crate::host::Host;
use crate::process::Cmd;

/// Write `blob` as boot code into partition `index` of `disk`.
pub fn install_bootcode(host: &impl Host, disk: &str, blob: &Path, index: u32) -> Result<()> {
    host.run(
        Cmd::new("gpart")
            .args(["bootcode", "-p"])
            .arg_path(blob)
            .args(["-i", &index.to_string(), disk]),
    )
    .with_context(|| format!("gpart bootcode failed on {}", disk))?;
    Ok(())
}
