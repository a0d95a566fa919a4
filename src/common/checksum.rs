//! SHA-256 of build inputs and outputs.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Lowercase hex SHA-256 of a file, read in 1MB chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} for checksum", path.display()))?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let n = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Fail unless `path` hashes to `expected` (hex, any case).
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        bail!(
            "Checksum mismatch for {}\n  Expected: {}\n  Got: {}",
            path.display(),
            expected.trim(),
            actual
        );
    }
    Ok(())
}

/// Write `<file>.sha256` next to `path` in `sha256sum` format. Returns its path.
pub fn write_checksum_file(path: &Path) -> Result<PathBuf> {
    let hash = sha256_file(path)?;
    let name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?
        .to_string_lossy();
    let out = PathBuf::from(format!("{}.sha256", path.display()));
    std::fs::write(&out, format!("{}  {}\n", hash, name))
        .with_context(|| format!("Failed to write {}", out.display()))?;
    Ok(out)
}
