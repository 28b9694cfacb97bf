//! Grid slicing of composite sheets into individual keyed crops.
//!
//! For each cell (row-major) the slicer finds the tight bounding box of
//! non-background pixels, keys the background to transparent, and places
//! the subject centred on a fixed-size crop canvas. Cells without any
//! foreground produce nothing and are listed in the [`DetectionReport`].
//!
//! Only pixels inside the cell are ever read, so a subject that bleeds
//! over a cell border is clipped rather than merged with its neighbour.

use image::{imageops::FilterType, RgbaImage};
use serde::Serialize;

use crate::batch::absolute_index;
use crate::chroma::{ChromaKey, TRANSPARENT};
use crate::codec::{decode_rgba, resize_exact};
use crate::error::CoreError;
use crate::grid_spec::GridSpec;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// One synthesized composite, normalised to its canvas size.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub sheet_index: usize,
    pub image: RgbaImage,
    pub geometry: GridSpec,
    /// Cells expected to hold a subject (the batch size). Cells past this
    /// are still scanned but do not count as misses when empty.
    pub occupied: usize,
}

impl RawSheet {
    /// Wrap `image`, resampling it to the canvas size if it differs.
    pub fn new(sheet_index: usize, image: RgbaImage, geometry: GridSpec) -> Self {
        Self {
            sheet_index,
            image: resize_exact(image, geometry.canvas_width, geometry.canvas_height),
            geometry,
            occupied: geometry.capacity(),
        }
    }

    pub fn from_bytes(
        sheet_index: usize,
        bytes: &[u8],
        geometry: GridSpec,
    ) -> Result<Self, CoreError> {
        Ok(Self::new(sheet_index, decode_rgba(bytes)?, geometry))
    }

    pub fn with_occupied(mut self, occupied: usize) -> Self {
        self.occupied = occupied.min(self.geometry.capacity());
        self
    }

    /// Swap in a re-edited composite for the same sheet slot.
    pub fn replace_image(&mut self, image: RgbaImage) {
        self.image = resize_exact(
            image,
            self.geometry.canvas_width,
            self.geometry.canvas_height,
        );
    }
}

/// One cropped, keyed item.
#[derive(Debug, Clone)]
pub struct SlicedItem {
    pub absolute_index: usize,
    pub image: RgbaImage,
    pub cell_row: u32,
    pub cell_col: u32,
}

/// Expected vs. produced counts for one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionReport {
    pub sheet_index: usize,
    pub expected: usize,
    pub produced: usize,
    /// Occupied cell indices (row-major, sheet-local) with no foreground.
    pub missing_cells: Vec<usize>,
}

impl DetectionReport {
    pub fn is_complete(&self) -> bool {
        self.missing_cells.is_empty()
    }
}

/// Result of slicing one sheet: the detected items and what was missed.
#[derive(Debug, Clone)]
pub struct SliceOutcome {
    pub items: Vec<SlicedItem>,
    pub report: DetectionReport,
}

impl SliceOutcome {
    /// The whole sheet yielded nothing: likely all-green or malformed.
    pub fn no_objects_detected(&self) -> bool {
        self.items.is_empty()
    }
}

/// Axis-aligned box in sheet pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// What to do with a subject larger than the padded crop area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Keep scale, centre, and clip at the crop edge.
    #[default]
    Clip,
    /// Downscale uniformly until the subject fits inside the padding.
    Fit,
}

// ---------------------------------------------------------------------------
// Slicer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct GridSlicer {
    key: ChromaKey,
    oversize: OversizePolicy,
}

impl GridSlicer {
    pub fn new(key: ChromaKey) -> Self {
        Self {
            key,
            oversize: OversizePolicy::default(),
        }
    }

    pub fn with_oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.oversize = policy;
        self
    }

    pub fn key(&self) -> &ChromaKey {
        &self.key
    }

    pub fn slice(&self, sheet: &RawSheet) -> SliceOutcome {
        let geometry = &sheet.geometry;
        let capacity = geometry.capacity();
        let mut items = Vec::new();
        let mut missing_cells = Vec::new();

        for row in 0..geometry.rows {
            for col in 0..geometry.cols {
                let cell_index = (row * geometry.cols + col) as usize;
                match self.slice_cell(sheet, row, col) {
                    Some(image) => items.push(SlicedItem {
                        absolute_index: absolute_index(sheet.sheet_index, capacity, cell_index),
                        image,
                        cell_row: row,
                        cell_col: col,
                    }),
                    None if cell_index < sheet.occupied => missing_cells.push(cell_index),
                    None => {}
                }
            }
        }

        let report = DetectionReport {
            sheet_index: sheet.sheet_index,
            expected: sheet.occupied,
            produced: sheet.occupied - missing_cells.len(),
            missing_cells,
        };
        SliceOutcome { items, report }
    }

    fn slice_cell(&self, sheet: &RawSheet, row: u32, col: u32) -> Option<RgbaImage> {
        let region = cell_region(&sheet.geometry, row, col);
        let bounds = foreground_bounds(&sheet.image, region, &self.key)?;
        Some(self.render_crop(&sheet.image, bounds, &sheet.geometry))
    }

    fn render_crop(
        &self,
        image: &RgbaImage,
        bounds: BoundingBox,
        geometry: &GridSpec,
    ) -> RgbaImage {
        let crop_w = geometry.crop_width;
        let crop_h = geometry.crop_height;
        let inner_w = crop_w.saturating_sub(2 * geometry.edge_padding_px).max(1);
        let inner_h = crop_h.saturating_sub(2 * geometry.edge_padding_px).max(1);

        let mut subject =
            image::imageops::crop_imm(image, bounds.x, bounds.y, bounds.width, bounds.height)
                .to_image();
        self.key.key_in_place(&mut subject);

        let oversized = bounds.width > inner_w || bounds.height > inner_h;
        if oversized && self.oversize == OversizePolicy::Fit {
            let scale = f64::min(
                f64::from(inner_w) / f64::from(bounds.width),
                f64::from(inner_h) / f64::from(bounds.height),
            );
            let w = ((f64::from(bounds.width) * scale).round() as u32).clamp(1, inner_w);
            let h = ((f64::from(bounds.height) * scale).round() as u32).clamp(1, inner_h);
            subject = image::imageops::resize(&subject, w, h, FilterType::Triangle);
        }

        // Centred placement; a negative offset clips the subject evenly.
        let dx = (i64::from(crop_w) - i64::from(subject.width())) / 2;
        let dy = (i64::from(crop_h) - i64::from(subject.height())) / 2;
        let mut out = RgbaImage::from_pixel(crop_w, crop_h, TRANSPARENT);
        image::imageops::replace(&mut out, &subject, dx, dy);
        out
    }
}

/// Pixel rectangle of cell (`row`, `col`) as a bounding box.
pub fn cell_region(geometry: &GridSpec, row: u32, col: u32) -> BoundingBox {
    let width = geometry.cell_width();
    let height = geometry.cell_height();
    BoundingBox {
        x: col * width,
        y: row * height,
        width,
        height,
    }
}

/// Tight box around every non-background pixel inside `region`.
pub fn foreground_bounds(
    image: &RgbaImage,
    region: BoundingBox,
    key: &ChromaKey,
) -> Option<BoundingBox> {
    let x_end = (region.x + region.width).min(image.width());
    let y_end = (region.y + region.height).min(image.height());

    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut found = false;

    for y in region.y..y_end {
        for x in region.x..x_end {
            if key.is_background(image.get_pixel(x, y)) {
                continue;
            }
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| BoundingBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_spec::{lookup, Variant};
    use image::Rgba;

    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const RED: Rgba<u8> = Rgba([220, 20, 40, 255]);

    /// Green canvas with a `w` x `h` red block at `(x, y)` inside each listed cell.
    fn sheet(geometry: GridSpec, blocks: &[(usize, u32, u32, u32, u32)]) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(geometry.canvas_width, geometry.canvas_height, GREEN);
        for &(cell, x, y, w, h) in blocks {
            let row = cell as u32 / geometry.cols;
            let col = cell as u32 % geometry.cols;
            let region = cell_region(&geometry, row, col);
            for py in region.y + y..region.y + y + h {
                for px in region.x + x..region.x + x + w {
                    img.put_pixel(px, py, RED);
                }
            }
        }
        img
    }

    /// Bounds of opaque pixels in a crop.
    fn opaque_bounds(img: &RgbaImage) -> Option<BoundingBox> {
        let region = BoundingBox {
            x: 0,
            y: 0,
            width: img.width(),
            height: img.height(),
        };
        foreground_bounds(img, region, &ChromaKey::green(0))
    }

    #[test]
    fn full_sheet_yields_every_cell_in_row_major_order() {
        let geometry = lookup(16, Variant::Sticker);
        let blocks: Vec<_> = (0..16).map(|c| (c, 100, 100, 120, 90)).collect();
        let raw = RawSheet::new(0, sheet(geometry, &blocks), geometry);

        let outcome = GridSlicer::default().slice(&raw);

        assert_eq!(outcome.items.len(), 16);
        for (i, item) in outcome.items.iter().enumerate() {
            assert_eq!(item.absolute_index, i);
            assert_eq!(item.cell_row, i as u32 / 4);
            assert_eq!(item.cell_col, i as u32 % 4);
            assert_eq!(item.image.dimensions(), (370, 320));
        }
        assert!(outcome.report.is_complete());
        assert_eq!(outcome.report.produced, 16);
    }

    #[test]
    fn empty_cell_is_skipped_and_reported() {
        let geometry = lookup(8, Variant::Sticker);
        let blocks: Vec<_> = (0..8).filter(|c| *c != 5).map(|c| (c, 50, 50, 80, 80)).collect();
        let raw = RawSheet::new(1, sheet(geometry, &blocks), geometry);

        let outcome = GridSlicer::default().slice(&raw);

        assert_eq!(outcome.items.len(), 7);
        assert_eq!(outcome.report.missing_cells, vec![5]);
        assert_eq!(outcome.report.expected, 8);
        assert_eq!(outcome.report.produced, 7);
        let indices: Vec<usize> = outcome.items.iter().map(|i| i.absolute_index).collect();
        assert_eq!(indices, vec![8, 9, 10, 11, 12, 14, 15]);
        assert!(!outcome.no_objects_detected());
    }

    #[test]
    fn all_green_sheet_detects_nothing() {
        let geometry = lookup(8, Variant::Emoji);
        let raw = RawSheet::new(0, sheet(geometry, &[]), geometry);

        let outcome = GridSlicer::default().slice(&raw);

        assert!(outcome.no_objects_detected());
        assert_eq!(outcome.report.produced, 0);
        assert_eq!(outcome.report.missing_cells.len(), 8);
    }

    #[test]
    fn unoccupied_cells_are_not_misses() {
        let geometry = lookup(8, Variant::Sticker);
        let blocks: Vec<_> = (0..4).map(|c| (c, 10, 10, 50, 50)).collect();
        let raw = RawSheet::new(2, sheet(geometry, &blocks), geometry).with_occupied(4);

        let outcome = GridSlicer::default().slice(&raw);

        assert_eq!(outcome.items.len(), 4);
        assert!(outcome.report.is_complete());
        assert_eq!(outcome.report.expected, 4);
    }

    #[test]
    fn small_subject_gets_padding_on_every_side() {
        let geometry = lookup(8, Variant::Sticker);
        let pad = geometry.edge_padding_px;
        let (w, h) = (geometry.crop_width - 2 * pad, geometry.crop_height - 2 * pad);
        let raw = RawSheet::new(0, sheet(geometry, &[(0, 10, 10, w, h)]), geometry);

        let outcome = GridSlicer::default().slice(&raw);
        let crop = &outcome.items[0].image;
        let fg = opaque_bounds(crop).unwrap();

        assert!(fg.x >= pad);
        assert!(fg.y >= pad);
        assert!(crop.width() - (fg.x + fg.width) >= pad);
        assert!(crop.height() - (fg.y + fg.height) >= pad);
        assert_eq!((fg.width, fg.height), (w, h));
    }

    #[test]
    fn off_centre_subject_is_centred_in_crop() {
        let geometry = lookup(8, Variant::Sticker);
        let raw = RawSheet::new(0, sheet(geometry, &[(3, 0, 0, 40, 20)]), geometry);

        let outcome = GridSlicer::default().slice(&raw);
        let fg = opaque_bounds(&outcome.items[0].image).unwrap();

        assert_eq!(fg.x, (370 - 40) / 2);
        assert_eq!(fg.y, (320 - 20) / 2);
    }

    #[test]
    fn foreground_pixels_are_copied_unchanged_and_background_cleared() {
        let geometry = lookup(8, Variant::Emoji);
        let mut img = sheet(geometry, &[(0, 20, 20, 30, 30)]);
        // A green hole inside the subject must be keyed out too.
        img.put_pixel(35, 35, GREEN);
        let raw = RawSheet::new(0, img, geometry);

        let crop = &GridSlicer::default().slice(&raw).items[0].image;
        let fg = opaque_bounds(crop).unwrap();

        assert_eq!(*crop.get_pixel(fg.x, fg.y), RED);
        assert_eq!(*crop.get_pixel(fg.x + 15, fg.y + 15), TRANSPARENT);
        assert_eq!(*crop.get_pixel(0, 0), TRANSPARENT);
    }

    #[test]
    fn oversized_subject_is_clipped_without_scaling() {
        let geometry = lookup(8, Variant::Sticker);
        // Wider and taller than the 370x320 crop, still inside a 400x350 cell.
        let raw = RawSheet::new(0, sheet(geometry, &[(0, 5, 5, 390, 340)]), geometry);

        let crop = &GridSlicer::default().slice(&raw).items[0].image;
        let fg = opaque_bounds(crop).unwrap();

        assert_eq!(crop.dimensions(), (370, 320));
        assert_eq!((fg.x, fg.y, fg.width, fg.height), (0, 0, 370, 320));
    }

    #[test]
    fn oversized_subject_fits_when_requested() {
        let geometry = lookup(8, Variant::Sticker);
        let raw = RawSheet::new(0, sheet(geometry, &[(0, 0, 0, 396, 198)]), geometry);

        let slicer = GridSlicer::default().with_oversize_policy(OversizePolicy::Fit);
        let crop = &slicer.slice(&raw).items[0].image;
        let fg = opaque_bounds(crop).unwrap();

        assert_eq!(crop.dimensions(), (370, 320));
        assert!(fg.width <= 366 && fg.height <= 316);
        assert!(fg.x >= 2 && fg.y >= 2);
        // Aspect ratio 2:1 is kept within a pixel of rounding.
        assert!((i64::from(fg.width) - 2 * i64::from(fg.height)).abs() <= 2);
    }

    #[test]
    fn neighbouring_cells_do_not_bleed() {
        let geometry = lookup(8, Variant::Sticker);
        let mut img = sheet(geometry, &[(0, 150, 150, 50, 50)]);
        // Paint a stripe at the very left of cell 1.
        for y in 0..350 {
            img.put_pixel(400, y, RED);
        }
        let raw = RawSheet::new(0, img, geometry);

        let outcome = GridSlicer::default().slice(&raw);
        let first = opaque_bounds(&outcome.items[0].image).unwrap();
        let second = opaque_bounds(&outcome.items[1].image).unwrap();

        assert_eq!((first.width, first.height), (50, 50));
        assert_eq!((second.width, second.height), (1, 320));
    }

    #[test]
    fn never_more_items_than_cells() {
        let geometry = lookup(24, Variant::Emoji);
        let blocks: Vec<_> = (0..24).map(|c| (c, 0, 0, 200, 200)).collect();
        let raw = RawSheet::new(0, sheet(geometry, &blocks), geometry);

        let outcome = GridSlicer::default().slice(&raw);

        assert!(outcome.items.len() <= geometry.capacity());
        assert!(outcome
            .items
            .iter()
            .all(|i| i.image.dimensions() == (180, 180)));
    }

    #[test]
    fn off_size_sheets_are_normalised_to_canvas() {
        let geometry = lookup(8, Variant::Emoji);
        let raw = RawSheet::new(0, RgbaImage::from_pixel(400, 200, GREEN), geometry);
        assert_eq!(raw.image.dimensions(), (800, 400));
    }
}
