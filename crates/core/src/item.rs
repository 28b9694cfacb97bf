//! Per-item creative configuration and run-level text settings.

use serde::{Deserialize, Serialize};

use crate::types::ItemId;

/// Content definition for one sticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemConfig {
    pub id: ItemId,
    /// Caption rendered onto the sticker when `show_text` is set.
    #[serde(default)]
    pub display_text: String,
    #[serde(default)]
    pub visual_prompt_en: String,
    #[serde(default)]
    pub visual_prompt_zh: String,
    #[serde(default = "default_show_text")]
    pub show_text: bool,
}

fn default_show_text() -> bool {
    true
}

impl ItemConfig {
    pub fn new(id: impl Into<ItemId>, display_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_text: display_text.into(),
            visual_prompt_en: String::new(),
            visual_prompt_zh: String::new(),
            show_text: true,
        }
    }

    pub fn with_prompts(mut self, en: impl Into<String>, zh: impl Into<String>) -> Self {
        self.visual_prompt_en = en.into();
        self.visual_prompt_zh = zh.into();
        self
    }

    pub fn without_text(mut self) -> Self {
        self.show_text = false;
        self
    }

    /// Whether the caption is drawn, given the run-level text switch.
    pub fn effective_show_text(&self, include_text: bool) -> bool {
        self.show_text && include_text
    }
}

/// Caption typography handed to the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontConfig {
    /// Caption language tag, e.g. `zh-TW`.
    pub language: String,
    /// Free-form font style name.
    pub family: String,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            language: "zh-TW".to_string(),
            family: "rounded sans-serif".to_string(),
        }
    }
}

/// Optional title/description passed through to the export collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub title: String,
    pub description: String,
}
