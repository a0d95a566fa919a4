//! FreeBSD distribution archives.
//!
//! `base.txz` and `kernel.txz` are cached in the distfiles directory and
//! reused while they look intact. Missing archives are downloaded with `curl`
//! (both at once) and checked against the release `MANIFEST`.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::verify_sha256;

pub const BASE_ARCHIVE: &str = "base.txz";
pub const KERNEL_ARCHIVE: &str = "kernel.txz";
pub const RELEASE_MANIFEST: &str = "MANIFEST";

/// Anything smaller is a truncated download or an HTML error page.
pub const MIN_ARCHIVE_SIZE: u64 = 1024;
pub const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];

/// Retry policy for downloads.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub retry_delay: Duration,
    /// Per-transfer limit passed to curl; `None` for no limit.
    pub timeout: Option<Duration>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_secs(2),
            timeout: None,
        }
    }
}

impl DownloadOptions {
    /// Small text files: short timeout.
    pub fn metadata() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_secs(1),
            timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at 16x.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay * (1u32 << attempt.saturating_sub(1).min(4))
    }
}

/// Paths of the verified archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archives {
    pub base: PathBuf,
    pub kernel: PathBuf,
}

impl Archives {
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [self.base.as_path(), self.kernel.as_path()].into_iter()
    }
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    pub version: String,
    pub arch: String,
    pub mirror: String,
    pub dest_dir: PathBuf,
    pub options: DownloadOptions,
}

impl Fetcher {
    pub fn new(version: &str, arch: &str, mirror: &str, dest_dir: &Path) -> Self {
        let mirror = if mirror.is_empty() {
            crate::config::DEFAULT_MIRROR
        } else {
            mirror
        };
        Self {
            version: version.to_string(),
            arch: arch.to_string(),
            mirror: mirror.trim_end_matches('/').to_string(),
            dest_dir: dest_dir.to_path_buf(),
            options: DownloadOptions::default(),
        }
    }

    pub fn from_config(config: &crate::config::BuildConfig) -> Self {
        Self::new(
            &config.freebsd_version,
            &config.arch,
            &config.mirror,
            &config.distfiles_dir(),
        )
    }

    /// `<mirror>/releases/<arch>/<version>`
    pub fn release_url(&self) -> String {
        format!("{}/releases/{}/{}", self.mirror, self.arch, self.version)
    }

    pub fn archive_paths(&self) -> Archives {
        Archives {
            base: self.dest_dir.join(BASE_ARCHIVE),
            kernel: self.dest_dir.join(KERNEL_ARCHIVE),
        }
    }

    /// Archives that are present and pass [`verify_archive`].
    pub fn cached(&self) -> Option<Archives> {
        let paths = self.archive_paths();
        let intact = paths.iter().all(|p| verify_archive(p).is_ok());
        intact.then_some(paths)
    }

    /// Make sure both archives are present and intact, downloading as needed.
    pub fn fetch_archives(&self) -> Result<Archives> {
        println!(
            "Checking for FreeBSD {} ({}) distribution archives...",
            self.version, self.arch
        );
        std::fs::create_dir_all(&self.dest_dir)
            .with_context(|| format!("Failed to create {}", self.dest_dir.display()))?;

        let paths = self.archive_paths();
        let mut missing = Vec::new();
        for (name, path) in [(BASE_ARCHIVE, &paths.base), (KERNEL_ARCHIVE, &paths.kernel)] {
            match verify_archive(path) {
                Ok(()) => println!("  {} cached", name),
                Err(e) => {
                    if path.exists() {
                        tracing::warn!("cached {} looks corrupt, downloading again: {:#}", name, e);
                    }
                    missing.push((name, path.clone()));
                }
            }
        }

        if missing.is_empty() {
            return Ok(paths);
        }

        let base_url = self.release_url();
        let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
        runtime.block_on(async {
            let mut downloads = tokio::task::JoinSet::new();
            for (name, path) in missing.iter().cloned() {
                let url = format!("{}/{}", base_url, name);
                let options = self.options.clone();
                downloads.spawn(async move {
                    println!("  Downloading {}...", url);
                    download(&url, &path, &options)
                        .await
                        .with_context(|| format!("Failed to download {}", name))
                });
            }
            while let Some(result) = downloads.join_next().await {
                result.context("Download task panicked")??;
            }
            Ok::<_, anyhow::Error>(())
        })?;

        for (name, path) in &missing {
            verify_archive(path).with_context(|| format!("Downloaded {} is not usable", name))?;
        }

        let manifest = runtime.block_on(self.fetch_manifest());
        match manifest {
            Ok(checksums) => verify_against_manifest(&checksums, &paths)?,
            Err(e) => {
                tracing::warn!("release MANIFEST unavailable, checksums not verified: {:#}", e);
            }
        }

        Ok(paths)
    }

    async fn fetch_manifest(&self) -> Result<HashMap<String, String>> {
        let url = format!("{}/{}", self.release_url(), RELEASE_MANIFEST);
        let dest = self.dest_dir.join(RELEASE_MANIFEST);
        download(&url, &dest, &DownloadOptions::metadata()).await?;
        let content = tokio::fs::read_to_string(&dest)
            .await
            .with_context(|| format!("Failed to read {}", dest.display()))?;
        Ok(parse_manifest(&content))
    }
}

/// Download `url` to `dest` via a `.tmp` file, retrying with backoff.
pub async fn download(url: &str, dest: &Path, options: &DownloadOptions) -> Result<()> {
    let tmp = PathBuf::from(format!("{}.tmp", dest.display()));
    let mut attempt = 0;

    loop {
        match curl(url, &tmp, options).await {
            Ok(()) => break,
            Err(e) if attempt < options.retries => {
                attempt += 1;
                let delay = options.backoff(attempt);
                println!("    Retry {}/{} in {:?}...", attempt, options.retries, delay);
                tracing::debug!("download of {} failed: {:#}", url, e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e);
            }
        }
    }

    tokio::fs::rename(&tmp, dest)
        .await
        .with_context(|| format!("Failed to move {} to {}", tmp.display(), dest.display()))?;
    Ok(())
}

async fn curl(url: &str, dest: &Path, options: &DownloadOptions) -> Result<()> {
    let mut cmd = tokio::process::Command::new("curl");
    cmd.args(["-fL", "--silent", "--show-error", "-o"]);
    cmd.arg(dest);
    if let Some(timeout) = options.timeout {
        cmd.args(["--max-time", &timeout.as_secs().to_string()]);
    }
    cmd.arg(url);
    tracing::debug!("running: curl -fL -o {} {}", dest.display(), url);

    let output = cmd
        .output()
        .await
        .context("Failed to execute 'curl'. Is it installed?")?;
    if !output.status.success() {
        bail!(
            "curl failed for {} (exit code {}): {}",
            url,
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Cheap integrity check: a plausible size and the xz magic.
pub fn verify_archive(path: &Path) -> Result<()> {
    let meta =
        std::fs::metadata(path).with_context(|| format!("{} not found", path.display()))?;
    if meta.len() < MIN_ARCHIVE_SIZE {
        bail!(
            "{} is too small ({} bytes), possibly corrupt",
            path.display(),
            meta.len()
        );
    }

    let mut magic = [0u8; 6];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if magic != XZ_MAGIC {
        bail!("{} is not an xz archive", path.display());
    }
    Ok(())
}

/// Checksums from a release MANIFEST.
///
/// Accepts FreeBSD's tab-separated `name<TAB>sha256<TAB>...` lines as well as
/// BSD-style `SHA256 (name) = hash` lines.
pub fn parse_manifest(content: &str) -> HashMap<String, String> {
    let mut checksums = HashMap::new();
    for line in content.lines() {
        if let Some((left, hash)) = line.split_once(" = ") {
            if let (Some(start), Some(end)) = (left.find('('), left.rfind(')')) {
                if left.contains("SHA256") && start < end {
                    checksums.insert(left[start + 1..end].to_string(), hash.trim().to_string());
                }
            }
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() >= 2 && is_sha256_hex(fields[1]) {
            checksums.insert(fields[0].trim().to_string(), fields[1].to_string());
        }
    }
    checksums
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Check both archives against `checksums`; an archive without an entry only warns.
pub fn verify_against_manifest(checksums: &HashMap<String, String>, archives: &Archives) -> Result<()> {
    for path in archives.iter() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match checksums.get(&name) {
            Some(expected) => {
                verify_sha256(path, expected)?;
                println!("  {} checksum verified", name);
            }
            None => tracing::warn!("no checksum for {} in MANIFEST", name),
        }
    }
    Ok(())
}
