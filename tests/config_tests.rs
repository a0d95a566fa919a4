//! Configuration loading from `.env` and the process environment.
//!
//! These tests mutate the process environment, so they run serially.

use std::fs;

use pgsdbuild::config::BuildConfig;
use serial_test::serial;

const VARS: [&str; 3] = ["PGSD_ISO_DIR", "PGSD_DISK_SIZE_GB", "PGSD_FREEBSD_VERSION"];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_dotenv_file_is_read() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(".env"),
        "# local overrides\nPGSD_ISO_DIR=out/iso\nPGSD_FREEBSD_VERSION=14.1-RELEASE\n",
    )
    .unwrap();

    let config = BuildConfig::load(dir.path()).unwrap();

    assert_eq!(config.iso_dir(), dir.path().join("out/iso"));
    assert_eq!(config.freebsd_version, "14.1-RELEASE");
}

#[test]
#[serial]
fn test_environment_overrides_dotenv() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(".env"), "PGSD_DISK_SIZE_GB=5\n").unwrap();
    std::env::set_var("PGSD_DISK_SIZE_GB", "30");

    let config = BuildConfig::load(dir.path());
    clear_env();

    assert_eq!(config.unwrap().disk_size_gb, 30);
}

#[test]
#[serial]
fn test_no_dotenv_uses_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();

    let config = BuildConfig::load(dir.path()).unwrap();

    assert_eq!(config.images_dir(), dir.path().join("images"));
    assert!(config.validate().is_ok());
}
