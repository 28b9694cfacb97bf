//! Shared fakes for pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use stickerkit_core::codec::encode_png;
use stickerkit_core::grid_spec::{lookup, Variant};
use stickerkit_core::item::{FontConfig, ItemConfig};
use stickerkit_pipeline::RunRequest;
use stickerkit_synthesis::{ItemEditor, SheetRequest, SheetSynthesizer, SynthesisError};
use tokio::sync::Notify;

pub const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

pub fn items(n: usize) -> Vec<ItemConfig> {
    (0..n)
        .map(|i| ItemConfig::new(format!("item-{i}"), format!("caption {i}")))
        .collect()
}

/// Emoji geometry keeps canvases small: 200x200 cells.
pub fn request(item_count: u32) -> RunRequest {
    RunRequest {
        base_image: encode_png(&RgbaImage::from_pixel(4, 4, BLUE)).unwrap(),
        style_prompt: "flat pastel".into(),
        font: FontConfig::default(),
        variant: Variant::Emoji,
        geometry: lookup(item_count, Variant::Emoji),
        include_text: true,
    }
}

/// Green canvas with a blue block in the cell of each requested item.
pub fn render_sheet(request: &SheetRequest, blank: &HashSet<String>) -> RgbaImage {
    let g = request.geometry;
    let mut img = RgbaImage::from_pixel(g.canvas_width, g.canvas_height, GREEN);
    for (cell, item) in request.items.iter().enumerate() {
        if blank.contains(&item.id) {
            continue;
        }
        let cell = cell as u32;
        let x0 = (cell % g.cols) * g.cell_width() + 40;
        let y0 = (cell / g.cols) * g.cell_height() + 40;
        for y in y0..y0 + 60 {
            for x in x0..x0 + 80 {
                img.put_pixel(x, y, BLUE);
            }
        }
    }
    img
}

#[derive(Default)]
pub struct FakeSynthesizer {
    pub calls: Mutex<Vec<usize>>,
    pub fail_on_sheet: Option<usize>,
    pub blank_ids: HashSet<String>,
    pub garbage: bool,
    /// Render at this size instead of the canvas size.
    pub render_size: Option<(u32, u32)>,
}

impl FakeSynthesizer {
    pub fn failing_on(sheet_index: usize) -> Self {
        Self {
            fail_on_sheet: Some(sheet_index),
            ..Default::default()
        }
    }

    pub fn blanking(ids: &[&str]) -> Self {
        Self {
            blank_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SheetSynthesizer for FakeSynthesizer {
    async fn synthesize(
        &self,
        _base_image: &[u8],
        request: &SheetRequest,
    ) -> Result<Vec<u8>, SynthesisError> {
        self.calls.lock().unwrap().push(request.sheet_index);
        if self.fail_on_sheet == Some(request.sheet_index) {
            return Err(SynthesisError::Api {
                status: 503,
                body: "upstream overloaded".into(),
            });
        }
        if self.garbage {
            return Ok(b"not an image".to_vec());
        }
        let mut sheet = render_sheet(request, &self.blank_ids);
        if let Some((w, h)) = self.render_size {
            sheet = image::imageops::resize(&sheet, w, h, image::imageops::FilterType::Nearest);
        }
        Ok(encode_png(&sheet).unwrap())
    }
}

/// Returns a blue square on green, or a rejection when `fail` is set.
#[derive(Default)]
pub struct FakeEditor {
    pub fail: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeEditor {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

pub fn edited_image() -> RgbaImage {
    let mut img = RgbaImage::from_pixel(20, 20, GREEN);
    for y in 5..15 {
        for x in 5..15 {
            img.put_pixel(x, y, BLUE);
        }
    }
    img
}

#[async_trait]
impl ItemEditor for FakeEditor {
    async fn edit(
        &self,
        _masked_image: &[u8],
        instruction: &str,
    ) -> Result<Vec<u8>, SynthesisError> {
        self.calls.lock().unwrap().push(instruction.to_string());
        if self.fail {
            return Err(SynthesisError::Rejected("content filtered".into()));
        }
        Ok(encode_png(&edited_image()).unwrap())
    }
}

/// Blocks inside `edit` until released, to hold a retry in flight.
#[derive(Default)]
pub struct GatedEditor {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl ItemEditor for GatedEditor {
    async fn edit(
        &self,
        _masked_image: &[u8],
        _instruction: &str,
    ) -> Result<Vec<u8>, SynthesisError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(encode_png(&edited_image()).unwrap())
    }
}
