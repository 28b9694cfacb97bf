//! Request payloads sent to the synthesis service.

use serde::Serialize;
use stickerkit_core::batch::Batch;
use stickerkit_core::grid_spec::{GridSpec, Variant};
use stickerkit_core::item::{FontConfig, ItemConfig};

/// One cell's content as seen by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetItem {
    pub id: String,
    pub text: String,
    pub visual_prompt_en: String,
    pub visual_prompt_zh: String,
    pub show_text: bool,
}

impl SheetItem {
    pub fn from_config(config: &ItemConfig, include_text: bool) -> Self {
        Self {
            id: config.id.clone(),
            text: config.display_text.clone(),
            visual_prompt_en: config.visual_prompt_en.clone(),
            visual_prompt_zh: config.visual_prompt_zh.clone(),
            show_text: config.effective_show_text(include_text),
        }
    }
}

/// Everything needed to synthesize one sheet apart from the base image.
///
/// Items are listed in row-major cell order.
#[derive(Debug, Clone, Serialize)]
pub struct SheetRequest {
    pub sheet_index: usize,
    pub total_sheets: usize,
    pub style_prompt: String,
    pub geometry: GridSpec,
    pub font: FontConfig,
    pub variant: Variant,
    pub items: Vec<SheetItem>,
}

impl SheetRequest {
    pub fn for_batch(
        batch: &Batch,
        total_sheets: usize,
        style_prompt: &str,
        geometry: GridSpec,
        font: &FontConfig,
        variant: Variant,
        include_text: bool,
    ) -> Self {
        Self {
            sheet_index: batch.sheet_index,
            total_sheets,
            style_prompt: style_prompt.to_string(),
            geometry,
            font: font.clone(),
            variant,
            items: batch
                .configs
                .iter()
                .map(|c| SheetItem::from_config(c, include_text))
                .collect(),
        }
    }
}
