//! Single-item regenerate/edit flow and whole-sheet retouching.
//!
//! A retry touches exactly one item and never re-runs planning or sheet
//! generation. Its result is chroma-keyed the same way sliced cells are
//! before the item is marked `Success`.

use std::time::Duration;

use stickerkit_core::chroma::ChromaKey;
use stickerkit_core::codec::decode_rgba;
use stickerkit_core::slicer::RawSheet;
use stickerkit_synthesis::{ItemEditor, SynthesisError};

use crate::board::ItemBoard;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait spent in `Cooldown` before each attempt. Zero skips the state.
    pub cooldown: Duration,
}

impl RetryPolicy {
    /// Policy that waits `cooldown` in `Cooldown` before each edit.
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self { cooldown }
    }
}

pub struct ItemRetrier<E> {
    editor: E,
    key: ChromaKey,
    policy: RetryPolicy,
}

impl<E: ItemEditor> ItemRetrier<E> {
    pub fn new(editor: E, key: ChromaKey, policy: RetryPolicy) -> Self {
        Self {
            editor,
            key,
            policy,
        }
    }

    /// The provider used for single-item edits.
    pub fn editor(&self) -> &E {
        &self.editor
    }

    /// Regenerate one item from a masked image and an instruction.
    ///
    /// Fails fast with [`PipelineError::RetryInProgress`] if another retry
    /// for the same id is running or a full run holds the board. An edit
    /// failure leaves the item in `Error` and is returned as
    /// [`PipelineError::ItemRetry`].
    pub async fn retry(
        &self,
        board: &ItemBoard,
        item_id: &str,
        masked_image: &[u8],
        instruction: &str,
    ) -> Result<(), PipelineError> {
        let slot = board.slot(item_id)?;
        let _writer = slot
            .writer
            .try_lock()
            .map_err(|_| PipelineError::RetryInProgress(item_id.to_string()))?;

        slot.lifecycle.lock().await.start_generating()?;

        if !self.policy.cooldown.is_zero() {
            slot.lifecycle
                .lock()
                .await
                .enter_cooldown(self.policy.cooldown)?;
            tracing::info!(
                item_id,
                cooldown_ms = self.policy.cooldown.as_millis() as u64,
                "Cooling down before retry",
            );
            tokio::time::sleep(self.policy.cooldown).await;
            slot.lifecycle.lock().await.start_generating()?;
        }

        let result = match self.editor.edit(masked_image, instruction).await {
            Ok(bytes) => {
                decode_rgba(&bytes).map_err(|e| SynthesisError::MalformedResponse(e.to_string()))
            }
            Err(e) => Err(e),
        };

        let mut lifecycle = slot.lifecycle.lock().await;
        match result {
            Ok(image) => {
                lifecycle.succeed(self.key.key_image(&image))?;
                tracing::info!(
                    item_id,
                    attempts = lifecycle.attempts(),
                    "Item retry succeeded",
                );
                Ok(())
            }
            Err(source) => {
                lifecycle.fail(source.to_string())?;
                tracing::warn!(item_id, error = %source, "Item retry failed");
                Err(PipelineError::ItemRetry {
                    item_id: item_id.to_string(),
                    source,
                })
            }
        }
    }
}

/// Replace a raw sheet with an edited version before slicing.
///
/// The edited composite is resampled to the sheet's canvas; keying
/// happens later, during slicing.
pub async fn edit_sheet<E: ItemEditor>(
    editor: &E,
    sheet: &mut RawSheet,
    masked_image: &[u8],
    instruction: &str,
) -> Result<(), PipelineError> {
    let sheet_index = sheet.sheet_index;
    let image = match editor.edit(masked_image, instruction).await {
        Ok(bytes) => {
            decode_rgba(&bytes).map_err(|e| SynthesisError::MalformedResponse(e.to_string()))
        }
        Err(e) => Err(e),
    }
    .map_err(|source| {
        tracing::warn!(sheet_index, error = %source, "Sheet edit failed");
        PipelineError::ExternalCall {
            sheet_index,
            source,
        }
    })?;

    sheet.replace_image(image);
    tracing::info!(sheet_index, "Sheet replaced with edited version");
    Ok(())
}
