//! Disk discovery and preflight checks against a recording host.

mod helpers;

use helpers::FakeHost;
use pgsdbuild::config::BuildConfig;
use pgsdbuild::install::discover::list_disks;
use pgsdbuild::preflight::{run_preflight, run_preflight_or_fail, CheckStatus};

#[test]
fn test_disks_fall_back_to_kern_disks() {
    let host = FakeHost::new()
        .failing("geom", "geom: command not available")
        .responding("sysctl -n kern.disks", "cd0 ada0 md3\n")
        .responding("diskinfo ada0", "ada0\t512\t21474836480\t41943040\t0\t0\t41610\t16\t63\n");

    let disks = list_disks(&host);

    assert_eq!(disks.len(), 1);
    assert_eq!(disks[0].device, "ada0");
    assert_eq!(disks[0].size_bytes, Some(21474836480));
    assert_eq!(disks[0].size_display(), "20.0GB");
    assert_eq!(disks[0].model, "Disk");
    assert!(host.calls_starting("diskinfo cd0").is_empty());
    assert!(host.calls_starting("diskinfo md3").is_empty());
}

#[test]
fn test_disks_from_geom() {
    let host = FakeHost::new().responding(
        "geom disk list",
        "Geom name: nda0\nProviders:\n1. Name: nda0\n   Mediasize: 512110190592 (477G)\n   descr: Samsung SSD 970\n",
    );

    let disks = list_disks(&host);

    assert_eq!(disks.len(), 1);
    assert_eq!(disks[0].model, "Samsung SSD 970");
    assert!(host.calls_starting("sysctl").is_empty());
}

#[test]
fn test_preflight_missing_tool_fails_with_hint() {
    let dir = tempfile::tempdir().unwrap();
    let config = BuildConfig::new(dir.path());
    let host = FakeHost::new().without_tools(&["makefs"]);

    let report = run_preflight(&host, &config);

    assert!(!report.all_passed());
    let failed: Vec<_> = report.with_status(CheckStatus::Fail).collect();
    // makefs is needed by both the image and the ISO build
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|c| c.name.starts_with("makefs")));
    assert!(failed[0].details.as_deref().unwrap().contains("base system"));
    assert!(run_preflight_or_fail(&host, &config).is_err());
}

#[test]
fn test_preflight_unprivileged_and_missing_dirs_only_warn() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = BuildConfig::new(dir.path());
    config.distfiles_dir = dir.path().join("distfiles");
    let host = FakeHost::new().unprivileged();

    let report = run_preflight(&host, &config);

    assert!(report.all_passed());
    let warned: Vec<_> = report
        .with_status(CheckStatus::Warn)
        .map(|c| c.name.as_str())
        .collect();
    assert!(warned.contains(&"root privileges"));
    assert!(warned.contains(&"images dir"));
    assert!(warned.contains(&"distribution archives"));
    assert!(host.calls().is_empty());
}

#[test]
fn test_recorded_calls_show_working_dir() {
    use pgsdbuild::host::Host;
    use pgsdbuild::process::Cmd;
    use std::path::Path;

    let host = FakeHost::new();
    host.run(Cmd::new("sha256").args(["-q", "base.txz"]).dir(Path::new("/var/cache/pgsd")))
        .unwrap();
    host.run(Cmd::new("zpool").args(["export", "pgsd"])).unwrap();

    assert_eq!(
        host.calls(),
        ["sha256 -q base.txz (in /var/cache/pgsd)", "zpool export pgsd"]
    );
}
