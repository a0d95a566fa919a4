//! Preflight command - runs preflight checks.

use anyhow::Result;

use crate::config::BuildConfig;
use crate::host::SystemHost;
use crate::preflight;

/// Execute the preflight command.
pub fn cmd_preflight(config: &BuildConfig, strict: bool) -> Result<()> {
    let host = SystemHost;
    if strict {
        preflight::run_preflight_or_fail(&host, config)?;
    } else {
        let report = preflight::run_preflight(&host, config);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to exit with an error.");
        }
    }
    Ok(())
}
