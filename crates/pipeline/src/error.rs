use stickerkit_core::error::CoreError;
use stickerkit_core::types::ItemId;
use stickerkit_synthesis::SynthesisError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Another multi-sheet run holds the orchestrator.
    #[error("A generation run is already in progress")]
    Busy,

    /// A sheet call failed; the whole run is void.
    #[error("Could not complete generation: sheet {sheet_index} failed: {source}")]
    ExternalCall {
        sheet_index: usize,
        source: SynthesisError,
    },

    /// A single-item edit failed; confined to that item.
    #[error("Retry of item {item_id} failed: {source}")]
    ItemRetry {
        item_id: ItemId,
        source: SynthesisError,
    },

    #[error("A retry for item {0} is already in progress")]
    RetryInProgress(ItemId),

    #[error(transparent)]
    Core(#[from] CoreError),
}
