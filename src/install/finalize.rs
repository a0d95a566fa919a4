use anyhow::{Context, Result};

use super::root_dataset;
use crate::host::Host;
use crate::process::Cmd;

/// Make the received root dataset bootable and export the pool.
///
/// The pool must be exported before reboot, or the installed system finds it
/// still claimed by the live environment.
pub fn finalize(host: &impl Host, pool: &str) -> Result<()> {
    host.run(
        Cmd::new("zpool")
            .arg("set")
            .arg(format!("bootfs={}", root_dataset(pool)))
            .arg(pool),
    )
    .context("zpool set bootfs failed")?;

    host.run(Cmd::new("zpool").args(["export", pool]))
        .context("zpool export failed")?;

    Ok(())
}
