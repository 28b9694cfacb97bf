//! Sticker-sheet production pipeline.
//!
//! Ties the pure building blocks of `stickerkit-core` to a synthesis
//! provider:
//!
//! - [`orchestrator`]: sequential, fail-fast generation of one sheet per batch
//! - [`slicing`]: slicing pass over a run's sheets with detection reports
//! - [`board`]: per-item lifecycles with single-writer retries
//! - [`retry`]: single-item regeneration and whole-sheet edits
//! - [`production`]: the end-to-end run

pub mod board;
pub mod error;
pub mod orchestrator;
pub mod production;
pub mod retry;
pub mod slicing;

pub use board::{AssignmentReport, ExportItem, ItemBoard, ItemSnapshot};
pub use error::PipelineError;
pub use orchestrator::{RunRequest, RunState, SheetOrchestrator, SheetProgress};
pub use production::{ProductionOutput, StickerPipeline};
pub use retry::{edit_sheet, ItemRetrier, RetryPolicy};
pub use slicing::{slice_sheets, SliceSummary};
