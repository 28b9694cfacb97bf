//! Sheet grid geometry tables.
//!
//! Each product [`Variant`] has its own table keyed by item count. The two
//! tables share grid shapes but differ in per-item crop size and edge
//! padding. Lookups are total: an unrecognised count resolves to the
//! variant's default entry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// Product type being produced. Selects the geometry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    Sticker,
    Emoji,
}

impl Variant {
    /// Lowercase name used in config values and file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sticker => "sticker",
            Self::Emoji => "emoji",
        }
    }

    /// All specs supported for this variant, ascending by item count.
    pub fn table(self) -> &'static [GridSpec] {
        match self {
            Self::Sticker => STICKER_SPECS,
            Self::Emoji => EMOJI_SPECS,
        }
    }

    /// Spec returned when a lookup misses.
    pub fn default_spec(self) -> GridSpec {
        match self {
            Self::Sticker => STICKER_DEFAULT,
            Self::Emoji => EMOJI_DEFAULT,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sticker" => Ok(Self::Sticker),
            "emoji" => Ok(Self::Emoji),
            other => Err(CoreError::Validation(format!(
                "Unknown variant '{other}'. Must be one of: sticker, emoji"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// GridSpec
// ---------------------------------------------------------------------------

/// Canvas geometry for one sheet layout.
///
/// Invariant: `rows * cols == item_count`, and the canvas divides evenly
/// into `cols` x `rows` cells, each at least as large as the crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSpec {
    pub item_count: u32,
    pub rows: u32,
    pub cols: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub crop_width: u32,
    pub crop_height: u32,
    pub edge_padding_px: u32,
}

impl GridSpec {
    /// Number of cells on one sheet.
    pub fn capacity(&self) -> usize {
        (self.rows * self.cols) as usize
    }

    /// Width of one grid cell in canvas pixels.
    pub fn cell_width(&self) -> u32 {
        self.canvas_width / self.cols.max(1)
    }

    /// Height of one grid cell in canvas pixels.
    pub fn cell_height(&self) -> u32 {
        self.canvas_height / self.rows.max(1)
    }

    /// Whether an image of `width` x `height` matches the canvas exactly.
    pub fn matches_canvas(&self, width: u32, height: u32) -> bool {
        width == self.canvas_width && height == self.canvas_height
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Sticker output size (LINE sticker maximum).
pub const STICKER_CROP_WIDTH: u32 = 370;
pub const STICKER_CROP_HEIGHT: u32 = 320;
pub const STICKER_EDGE_PADDING_PX: u32 = 2;

/// Emoji output size. Emoji are cropped flush, without padding.
pub const EMOJI_CROP_WIDTH: u32 = 180;
pub const EMOJI_CROP_HEIGHT: u32 = 180;
pub const EMOJI_EDGE_PADDING_PX: u32 = 0;

pub const DEFAULT_STICKER_COUNT: u32 = 8;
pub const DEFAULT_EMOJI_COUNT: u32 = 40;

const fn sticker(item_count: u32, rows: u32, cols: u32, width: u32, height: u32) -> GridSpec {
    GridSpec {
        item_count,
        rows,
        cols,
        canvas_width: width,
        canvas_height: height,
        crop_width: STICKER_CROP_WIDTH,
        crop_height: STICKER_CROP_HEIGHT,
        edge_padding_px: STICKER_EDGE_PADDING_PX,
    }
}

const fn emoji(item_count: u32, rows: u32, cols: u32, width: u32, height: u32) -> GridSpec {
    GridSpec {
        item_count,
        rows,
        cols,
        canvas_width: width,
        canvas_height: height,
        crop_width: EMOJI_CROP_WIDTH,
        crop_height: EMOJI_CROP_HEIGHT,
        edge_padding_px: EMOJI_EDGE_PADDING_PX,
    }
}

// Sticker cells are 400x350, emoji cells 200x200.
const STICKER_DEFAULT: GridSpec = sticker(DEFAULT_STICKER_COUNT, 2, 4, 1600, 700);
const EMOJI_DEFAULT: GridSpec = emoji(DEFAULT_EMOJI_COUNT, 5, 8, 1600, 1000);

pub const STICKER_SPECS: &[GridSpec] = &[
    STICKER_DEFAULT,
    sticker(16, 4, 4, 1600, 1400),
    sticker(24, 4, 6, 2400, 1400),
    sticker(32, 4, 8, 3200, 1400),
    sticker(40, 5, 8, 3200, 1750),
];

pub const EMOJI_SPECS: &[GridSpec] = &[
    emoji(8, 2, 4, 800, 400),
    emoji(16, 4, 4, 800, 800),
    emoji(24, 4, 6, 1200, 800),
    emoji(32, 4, 8, 1600, 800),
    EMOJI_DEFAULT,
];

/// Resolve the geometry for `item_count` items of the given variant.
///
/// Never fails: unsupported counts fall back to [`Variant::default_spec`].
pub fn lookup(item_count: u32, variant: Variant) -> GridSpec {
    variant
        .table()
        .iter()
        .find(|spec| spec.item_count == item_count)
        .copied()
        .unwrap_or_else(|| variant.default_spec())
}

/// Item counts that resolve to their own table entry.
pub fn supported_counts(variant: Variant) -> Vec<u32> {
    variant.table().iter().map(|spec| spec.item_count).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
