//! Hybrid command - writes USB boot structures into an existing ISO.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::artifact::hybrid::{candidates_under, make_hybrid_bootable, make_hybrid_bootable_from};

/// Execute `pgsdbuild hybrid <iso>`.
///
/// Boot code comes from `--boot-code`, or from the candidates under `--root`,
/// or from the running system's `/boot`.
pub fn cmd_hybrid(iso: &Path, boot_code: Option<&Path>, root: Option<&Path>) -> Result<()> {
    if !iso.is_file() {
        bail!("ISO not found: {}", iso.display());
    }

    let used = match boot_code {
        Some(code) => {
            make_hybrid_bootable(iso, code)
                .with_context(|| format!("Failed to make {} hybrid", iso.display()))?;
            code.to_path_buf()
        }
        None => {
            let root = root.unwrap_or(Path::new("/"));
            make_hybrid_bootable_from(iso, &candidates_under(root))
                .with_context(|| format!("Failed to make {} hybrid", iso.display()))?
        }
    };

    println!("Wrote hybrid MBR to {} (boot code: {})", iso.display(), used.display());
    Ok(())
}
