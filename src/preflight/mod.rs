//! Preflight checks.
//!
//! Validates host tools, privileges and the configured directories before a
//! build or installation. Run with `pgsdbuild preflight`.

mod environment;
mod host_tools;
mod types;

use anyhow::{bail, Result};

use crate::config::BuildConfig;
use crate::host::Host;

pub use host_tools::package_hint;
pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(host: &impl Host, config: &BuildConfig) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    println!("Checking host tools...");
    checks.extend(host_tools::check_host_tools(host));

    println!("Checking build environment...");
    checks.push(environment::check_privileges(host));
    checks.extend(environment::check_directories(config));
    checks.push(environment::check_distfiles(config));

    println!();

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(host: &impl Host, config: &BuildConfig) -> Result<()> {
    let report = run_preflight(host, config);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above first.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
