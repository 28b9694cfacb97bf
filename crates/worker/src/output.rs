//! Writing keyed PNGs and the run manifest to disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use image::RgbaImage;
use serde::Serialize;
use stickerkit_core::codec::encode_png;
use stickerkit_core::grid_spec::Variant;
use stickerkit_core::item::PackageInfo;

pub const MANIFEST_FILE: &str = "index.json";

/// One written image, in export order.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub item_id: String,
    pub file: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub variant: Variant,
    pub package: PackageInfo,
    pub main_item: Option<String>,
    pub items: Vec<ManifestEntry>,
    /// Ids left in error, e.g. after detection misses.
    pub failed: Vec<String>,
}

/// `sticker_01.png`, `emoji_12.png`, ... (1-based).
pub fn file_name(variant: Variant, position: usize) -> String {
    format!("{}_{:02}.png", variant.as_str(), position + 1)
}

pub fn write_png(
    dir: &Path,
    variant: Variant,
    position: usize,
    image: &RgbaImage,
) -> anyhow::Result<PathBuf> {
    let path = dir.join(file_name(variant, position));
    let bytes = encode_png(image)?;
    fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn write_manifest(dir: &Path, manifest: &Manifest) -> anyhow::Result<PathBuf> {
    let path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_vec_pretty(manifest)?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))
}
