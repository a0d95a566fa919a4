//! Fetch command - downloads distribution archives.

use anyhow::Result;

use crate::config::BuildConfig;
use crate::fetch::Fetcher;

pub fn cmd_fetch(config: &BuildConfig) -> Result<()> {
    let fetcher = Fetcher::from_config(config);
    println!(
        "Fetching FreeBSD {} ({}) from {}",
        fetcher.version,
        fetcher.arch,
        fetcher.release_url()
    );

    let archives = fetcher.fetch_archives()?;
    for archive in archives.iter() {
        println!("  {}", archive.display());
    }
    Ok(())
}
