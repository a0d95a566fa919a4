//! List commands - image and variant definitions.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::BuildConfig;
use crate::install::MANIFEST;
use crate::profile;

#[derive(Debug, Serialize)]
struct ImageListing {
    id: String,
    version: String,
    pool: String,
    description: Option<String>,
    /// A complete image exists in the artifacts dir.
    built: bool,
}

#[derive(Debug, Serialize)]
struct VariantListing {
    id: String,
    name: String,
    label: String,
    images: Vec<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize listing")?;
    println!("{}", json);
    Ok(())
}

/// Execute `pgsdbuild list-images`.
pub fn cmd_list_images(config: &BuildConfig, json: bool) -> Result<()> {
    let images_dir = config.images_dir();
    let mut listings = Vec::new();
    for id in profile::list_ids(&images_dir)? {
        let image = profile::load_image(&images_dir, &id)?;
        let built = config.artifacts_dir().join(&id).join(MANIFEST).is_file();
        listings.push(ImageListing {
            id: image.id,
            version: image.version,
            pool: image.pool,
            description: image.description,
            built,
        });
    }

    if json {
        return print_json(&listings);
    }
    if listings.is_empty() {
        println!("No images defined in {}", images_dir.display());
        return Ok(());
    }
    for image in &listings {
        let status = if image.built { "built" } else { "not built" };
        println!(
            "  {:<16} {:<12} pool={:<8} [{}]",
            image.id, image.version, image.pool, status
        );
        if let Some(desc) = &image.description {
            println!("  {:<16} {}", "", desc);
        }
    }
    Ok(())
}

/// Execute `pgsdbuild list-variants`.
pub fn cmd_list_variants(config: &BuildConfig, json: bool) -> Result<()> {
    let variants_dir = config.variants_dir();
    let mut listings = Vec::new();
    for id in profile::list_ids(&variants_dir)? {
        let variant = profile::load_variant(&variants_dir, &id)?;
        listings.push(VariantListing {
            label: variant.volume_label(),
            id: variant.id,
            name: variant.name,
            images: variant.images,
        });
    }

    if json {
        return print_json(&listings);
    }
    if listings.is_empty() {
        println!("No variants defined in {}", variants_dir.display());
        return Ok(());
    }
    for variant in &listings {
        println!(
            "  {:<16} {} (label {}, images: {})",
            variant.id,
            variant.name,
            variant.label,
            if variant.images.is_empty() {
                "none".to_string()
            } else {
                variant.images.join(", ")
            }
        );
    }
    Ok(())
}
