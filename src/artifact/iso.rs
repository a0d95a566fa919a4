//! Boot-environment ISO builder.
//!
//! The ISO boots a read-only FreeBSD live system carrying the installer and
//! a set of prebuilt system images. It boots from optical media (El Torito,
//! BIOS and UEFI) and, after the hybrid MBR is written, from a USB stick.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::efi::{build_efi_image, ISO_EFI, LOADER_EFI};
use super::hybrid::{candidates_under, make_hybrid_bootable_from};
use super::image::{apply_overlays, extract_archives, install_packages};
use crate::common::{
    copy_tree, prepare_work_dir, temp::cleanup_work_dir, write_checksum_file, write_file_with_dirs,
};
use crate::config::BuildConfig;
use crate::fetch::Fetcher;
use crate::host::Host;
use crate::install::discover::SYSTEM_IMAGES_DIR;
use crate::install::MANIFEST;
use crate::process::Cmd;
use crate::profile::{self, VariantProfile};
use crate::timing::Timer;

/// Host tools the ISO build needs. No root needed: nothing is mounted.
pub const ISO_TOOLS: &[&str] = &["tar", "pkg", "makefs", "curl"];

/// BIOS El Torito boot image, relative to the ISO root.
pub const CDBOOT: &str = "boot/cdboot";
const EFIBOOT_IMAGE: &str = "efiboot.img";

pub struct IsoBuilder<'a, H: Host> {
    host: &'a H,
    config: &'a BuildConfig,
    profile: &'a VariantProfile,
}

impl<'a, H: Host> IsoBuilder<'a, H> {
    pub fn new(host: &'a H, config: &'a BuildConfig, profile: &'a VariantProfile) -> Self {
        Self {
            host,
            config,
            profile,
        }
    }

    pub fn iso_path(&self) -> PathBuf {
        self.config.iso_dir().join(format!("{}.iso", self.profile.id))
    }

    fn images_source(&self) -> PathBuf {
        self.profile
            .images_dir
            .as_deref()
            .map(|d| self.config.resolve(d))
            .unwrap_or_else(|| self.config.artifacts_dir())
    }

    /// Build the ISO. Returns its path.
    pub fn build(&self) -> Result<PathBuf> {
        let id = &self.profile.id;
        println!("=== Building ISO {} ({}) ===\n", id, self.profile.name);

        let missing = self.host.missing_tools(ISO_TOOLS);
        if !missing.is_empty() {
            return Err(crate::install::RequirementError::MissingTools(missing).into());
        }

        // Fail before the long steps if an embedded image isn't built yet
        let images = self.resolve_images()?;
        let packages = profile::load_packages(&self.config.pkglists_dir(), &self.profile.pkg_lists)?;

        let t = Timer::start("Distribution archives");
        let archives = Fetcher::from_config(self.config).fetch_archives()?;
        t.finish();

        let work = prepare_work_dir(&self.config.work_dir(), &format!("iso-{}", id))?;
        let result = (|| -> Result<PathBuf> {
            let root = work.join("root");

            let t = Timer::start("Live root");
            extract_archives(self.host, &archives, &root)?;
            if !packages.is_empty() {
                install_packages(self.host, &root, &packages)?;
            }
            apply_overlays(&self.config.overlays_dir(), &self.profile.overlays, &root)?;
            t.finish();

            embed_images(&images, &root)?;
            write_live_config(&root, &self.profile.volume_label())?;

            let t = Timer::start("EFI boot image");
            let efiboot = work.join(EFIBOOT_IMAGE);
            build_efi_image(self.host, &root.join(LOADER_EFI), &efiboot, &ISO_EFI)?;
            t.finish();

            self.assemble(&root, &efiboot)
        })();

        if self.config.keep_work {
            println!("  Keeping work directory {}", work.display());
        } else {
            cleanup_work_dir(&work);
        }
        let iso = result?;

        println!("\n=== ISO {} complete: {} ===", id, iso.display());
        Ok(iso)
    }

    /// `(id, dir)` of every image to embed.
    fn resolve_images(&self) -> Result<Vec<(String, PathBuf)>> {
        let source = self.images_source();
        self.profile
            .images
            .iter()
            .map(|image| {
                let dir = source.join(image);
                if !dir.join(MANIFEST).is_file() {
                    bail!(
                        "image '{}' has not been built (no {} in {}); run `pgsdbuild image {}` first",
                        image,
                        MANIFEST,
                        dir.display(),
                        image
                    );
                }
                Ok((image.clone(), dir))
            })
            .collect()
    }

    fn assemble(&self, root: &Path, efiboot: &Path) -> Result<PathBuf> {
        let iso = self.iso_path();
        let iso_dir = self.config.iso_dir();
        fs::create_dir_all(&iso_dir)
            .with_context(|| format!("Failed to create {}", iso_dir.display()))?;
        let tmp = iso_dir.join(format!("{}.iso.tmp", self.profile.id));

        let t = Timer::start("ISO 9660 filesystem");
        self.host
            .run(Cmd::new("makefs").args(makefs_cd9660_args(
                &self.profile.volume_label(),
                root,
                efiboot,
                &tmp,
            )))
            .context("makefs failed to create the ISO")?;
        t.finish();

        let boot_code = make_hybrid_bootable_from(&tmp, &candidates_under(root))
            .context("Failed to make the ISO bootable from USB")?;
        println!("  Hybrid MBR written from {}", boot_code.display());

        fs::rename(&tmp, &iso)
            .with_context(|| format!("Failed to move {} into place", iso.display()))?;
        let sum = write_checksum_file(&iso)?;
        println!("  Checksum: {}", sum.display());

        Ok(iso)
    }
}

/// Arguments for `makefs -t cd9660` with BIOS and UEFI El Torito entries.
pub fn makefs_cd9660_args(label: &str, root: &Path, efiboot: &Path, output: &Path) -> Vec<String> {
    vec![
        "-t".into(),
        "cd9660".into(),
        "-o".into(),
        "rockridge".into(),
        "-o".into(),
        format!("label={}", label),
        "-o".into(),
        format!("bootimage=i386;{}", root.join(CDBOOT).display()),
        "-o".into(),
        "no-emul-boot".into(),
        "-o".into(),
        format!("bootimage=efi;{}", efiboot.display()),
        "-o".into(),
        "no-emul-boot".into(),
        "-o".into(),
        "platformid=efi".into(),
        output.display().to_string(),
        root.display().to_string(),
    ]
}

/// Copy built images to where the installer looks for them on the live system.
fn embed_images(images: &[(String, PathBuf)], root: &Path) -> Result<()> {
    let dest = root.join(SYSTEM_IMAGES_DIR.trim_start_matches('/'));
    for (id, dir) in images {
        let n = copy_tree(dir, &dest.join(id))?;
        println!("  Embedded image {} ({} files)", id, n);
    }
    Ok(())
}

/// fstab and loader.conf for a root on the ISO itself.
pub fn write_live_config(root: &Path, label: &str) -> Result<()> {
    let device = format!("/dev/iso9660/{}", label);
    write_file_with_dirs(
        root.join("etc/fstab"),
        format!(
            "# Device\t\tMountpoint\tFStype\tOptions\tDump\tPass#\n\
             {}\t/\t\tcd9660\tro\t0\t0\n\
             tmpfs\t\t\t/tmp\t\ttmpfs\trw,mode=1777\t0\t0\n",
            device
        ),
    )?;

    let loader_conf = root.join("boot/loader.conf");
    let mut conf = fs::read_to_string(&loader_conf).unwrap_or_default();
    conf.push_str(&format!("vfs.root.mountfrom=\"cd9660:{}\"\n", device));
    write_file_with_dirs(&loader_conf, conf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_makefs_args() {
        let args = makefs_cd9660_args(
            "PGSD_LIVE",
            Path::new("/w/root"),
            Path::new("/w/efiboot.img"),
            Path::new("/iso/live.iso.tmp"),
        );
        assert_eq!(
            args.join(" "),
            "-t cd9660 -o rockridge -o label=PGSD_LIVE \
             -o bootimage=i386;/w/root/boot/cdboot -o no-emul-boot \
             -o bootimage=efi;/w/efiboot.img -o no-emul-boot -o platformid=efi \
             /iso/live.iso.tmp /w/root"
        );
    }

    #[test]
    fn test_live_config_appends_to_loader_conf() {
        let dir = tempfile::tempdir().unwrap();
        write_file_with_dirs(dir.path().join("boot/loader.conf"), "autoboot_delay=3\n").unwrap();

        write_live_config(dir.path(), "PGSD").unwrap();

        let fstab = fs::read_to_string(dir.path().join("etc/fstab")).unwrap();
        assert!(fstab.contains("/dev/iso9660/PGSD\t/\t\tcd9660\tro"));
        let conf = fs::read_to_string(dir.path().join("boot/loader.conf")).unwrap();
        assert_eq!(
            conf,
            "autoboot_delay=3\nvfs.root.mountfrom=\"cd9660:/dev/iso9660/PGSD\"\n"
        );
    }

    #[test]
    fn test_embed_images_layout() {
        let src = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let image = src.path().join("base");
        fs::create_dir_all(&image).unwrap();
        fs::write(image.join(MANIFEST), "id = \"base\"\n").unwrap();

        embed_images(&[("base".to_string(), image)], root.path()).unwrap();
        assert!(root
            .path()
            .join("usr/local/share/pgsd/images/base")
            .join(MANIFEST)
            .is_file());
    }
}
