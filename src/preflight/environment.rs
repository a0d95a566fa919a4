//! Build environment checks: privileges, directories, cached archives.

use crate::config::BuildConfig;
use crate::fetch::Fetcher;
use crate::host::Host;

use super::types::CheckResult;

pub fn check_privileges(host: &impl Host) -> CheckResult {
    if host.is_privileged() {
        CheckResult::pass("root privileges")
    } else {
        CheckResult::warn(
            "root privileges",
            "Not running as root; image builds and installation will fail",
        )
    }
}

pub fn check_directories(config: &BuildConfig) -> Vec<CheckResult> {
    // Overlays and package lists are optional: definitions may not use any
    [
        ("images dir", config.images_dir(), true),
        ("variants dir", config.variants_dir(), true),
        ("package lists dir", config.pkglists_dir(), false),
        ("overlays dir", config.overlays_dir(), false),
    ]
    .into_iter()
    .map(|(name, dir, needed)| {
        if dir.is_dir() {
            CheckResult::pass_with(name, &dir.display().to_string())
        } else if needed {
            CheckResult::warn(name, &format!("{} does not exist", dir.display()))
        } else {
            CheckResult::skip(name, &format!("{} does not exist", dir.display()))
        }
    })
    .collect()
}

pub fn check_distfiles(config: &BuildConfig) -> CheckResult {
    let fetcher = Fetcher::from_config(config);
    match fetcher.cached() {
        Some(_) => CheckResult::pass_with(
            "distribution archives",
            &format!("{} cached", config.freebsd_version),
        ),
        None => CheckResult::warn(
            "distribution archives",
            &format!(
                "Not cached in {}; they will be downloaded (or run `pgsdbuild fetch`)",
                fetcher.dest_dir.display()
            ),
        ),
    }
}
