//! Image and ISO build pipeline tests against a recording host.

mod helpers;

use std::fs;
use std::path::{Path, PathBuf};

use helpers::{write_fake_archive, FakeHost};
use pgsdbuild::artifact::{ImageBuilder, ImageManifest, IsoBuilder};
use pgsdbuild::config::BuildConfig;
use pgsdbuild::profile::{ImageProfile, VariantProfile};
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> BuildConfig {
    let mut config = BuildConfig::new(dir.path());
    config.distfiles_dir = dir.path().join("distfiles");
    write_fake_archive(&config.distfiles_dir().join("base.txz"));
    write_fake_archive(&config.distfiles_dir().join("kernel.txz"));
    config
}

fn base_profile() -> ImageProfile {
    ImageProfile {
        id: "base".to_string(),
        version: "1.0".to_string(),
        pool: "pgsd".to_string(),
        description: None,
        pkg_lists: Vec::new(),
        overlays: Vec::new(),
        datasets: Vec::new(),
        disk_size_gb: Some(1),
    }
}

/// `tar -xpf <archive> -C <root>` leaves a UEFI loader behind.
fn extracting_host() -> FakeHost {
    FakeHost::new()
        .responding("mdconfig -a", "md7\n")
        .with_effect("tar", |args: &[String]| {
            let root = Path::new(&args[3]);
            fs::create_dir_all(root.join("boot")).unwrap();
            fs::write(root.join("boot/loader.efi"), b"MZ loader").unwrap();
            fs::write(root.join("boot/pmbr"), [0x33u8; 512]).unwrap();
        })
        .with_effect("makefs", |args: &[String]| {
            let output = PathBuf::from(&args[args.len() - 2]);
            fs::write(output, vec![0u8; 1024]).unwrap();
        })
}

#[test]
fn test_image_build_produces_complete_image() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let profile = base_profile();
    let host = extracting_host();

    let output = ImageBuilder::new(&host, &config, &profile).build().unwrap();

    assert_eq!(output, config.artifacts_dir().join("base"));
    for name in ["root.zfs.xz", "efi.img", "manifest.toml"] {
        assert!(output.join(name).is_file(), "{name} missing");
    }
    assert!(!output.join("root.zfs.xz.tmp").exists());
    assert!(!config.work_dir().join("image-base").exists());

    let manifest = ImageManifest::read(&output.join("manifest.toml")).unwrap();
    assert_eq!(manifest.id, "base");
    assert_eq!(manifest.pool, "pgsd");
    assert_eq!(manifest.root_dataset, "ROOT/default");
    let names: Vec<_> = manifest.artifacts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["root.zfs.xz", "efi.img"]);

    let snapshot = host.position("zfs snapshot -r pgsdbuild/ROOT/default@1.0").unwrap();
    let send = host.position("zfs send -R pgsdbuild/ROOT/default@1.0 | xz -T0 -c").unwrap();
    let export = host.position("zpool export pgsdbuild").unwrap();
    assert!(snapshot < send && send < export);
    assert_eq!(host.calls().last().unwrap(), "mdconfig -d -u md7");
    assert_eq!(host.calls_starting("tar -xpf").len(), 2);
    assert!(host.calls_starting("pkg").is_empty());
}

#[test]
fn test_failed_image_build_releases_pool_and_disk() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let profile = base_profile();
    // No loader is extracted, so the EFI step fails
    let host = FakeHost::new().responding("mdconfig -a", "md7\n");

    let err = ImageBuilder::new(&host, &config, &profile).build().unwrap_err();

    assert!(format!("{:#}", err).contains("UEFI loader not found"));
    let calls = host.calls();
    let n = calls.len();
    assert_eq!(calls[n - 2], "zpool export pgsdbuild");
    assert_eq!(calls[n - 1], "mdconfig -d -u md7");
    assert!(host.calls_starting("zfs snapshot").is_empty());
    assert!(!config.artifacts_dir().join("base/manifest.toml").exists());
    assert!(!config.work_dir().join("image-base").exists());
}

#[test]
fn test_pool_creation_failure_still_detaches_disk() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let profile = base_profile();
    let host = FakeHost::new()
        .responding("mdconfig -a", "md7\n")
        .failing("zpool create", "cannot create 'pgsdbuild': pool already exists");

    ImageBuilder::new(&host, &config, &profile).build().unwrap_err();

    assert_eq!(host.calls().last().unwrap(), "mdconfig -d -u md7");
    assert!(host.calls_starting("zpool export").is_empty());
}

#[test]
fn test_image_build_requires_tools_and_root() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let profile = base_profile();

    let host = FakeHost::new().without_tools(&["mdconfig", "makefs"]);
    let err = ImageBuilder::new(&host, &config, &profile).build().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("mdconfig") && msg.contains("makefs"), "{msg}");
    assert!(host.calls().is_empty());

    let host = FakeHost::new().unprivileged();
    ImageBuilder::new(&host, &config, &profile).build().unwrap_err();
    assert!(host.calls().is_empty());
}

#[test]
fn test_dataset_overlays_are_received_under_root() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let mut profile = base_profile();
    profile.datasets = toml::from_str::<ImageProfile>(
        r#"
        id = "base"
        version = "1.0"

        [[datasets]]
        name = "home"
        source = "tank/home@golden"
        mountpoint = "/home"
        "#,
    )
    .unwrap()
    .datasets;
    let host = extracting_host();

    ImageBuilder::new(&host, &config, &profile).build().unwrap();

    let receive = host.calls_starting("zfs send tank/home@golden | zfs receive -u");
    assert_eq!(receive.len(), 1);
    assert!(receive[0].contains("-o mountpoint=/home"), "{}", receive[0]);
    assert!(receive[0].ends_with("pgsdbuild/ROOT/default/home"), "{}", receive[0]);
}

fn live_variant(images: &[&str]) -> VariantProfile {
    VariantProfile {
        id: "live".to_string(),
        name: "Live installer".to_string(),
        label: None,
        pkg_lists: Vec::new(),
        overlays: Vec::new(),
        images: images.iter().map(|i| i.to_string()).collect(),
        images_dir: None,
    }
}

#[test]
fn test_iso_build_is_hybrid_and_checksummed() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let image = config.artifacts_dir().join("base");
    fs::create_dir_all(&image).unwrap();
    fs::write(image.join("manifest.toml"), "id = \"base\"\n").unwrap();
    let variant = live_variant(&["base"]);
    let host = extracting_host();

    let iso = IsoBuilder::new(&host, &config, &variant).build().unwrap();

    assert_eq!(iso, config.iso_dir().join("live.iso"));
    let bytes = fs::read(&iso).unwrap();
    assert_eq!(bytes[0], 0x33);
    assert_eq!(&bytes[510..512], &[0x55, 0xAA]);
    assert!(config.iso_dir().join("live.iso.sha256").is_file());
    assert!(!config.iso_dir().join("live.iso.tmp").exists());
    assert!(!config.work_dir().join("iso-live").exists());

    let efi = host.calls_starting("makefs -t msdos");
    assert_eq!(efi.len(), 1);
    assert!(efi[0].contains("fat_type=12"), "{}", efi[0]);
    let cd = host.calls_starting("makefs -t cd9660");
    assert_eq!(cd.len(), 1);
    assert!(cd[0].contains("label=LIVE"), "{}", cd[0]);
}

#[test]
fn test_iso_with_unbuilt_image_fails_early() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let variant = live_variant(&["desktop"]);
    let host = extracting_host();

    let err = IsoBuilder::new(&host, &config, &variant).build().unwrap_err();

    assert!(err.to_string().contains("pgsdbuild image desktop"), "{err}");
    assert!(host.calls().is_empty());
}
