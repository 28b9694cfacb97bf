//! Sequential, fail-fast sheet generation.
//!
//! [`SheetOrchestrator::run`] requests one sheet per batch, strictly in
//! order: sheet `i + 1` is never requested before sheet `i` has returned.
//! The first failure aborts the run and discards every sheet produced so
//! far. The current [`RunState`] doubles as the global busy flag and can
//! be polled with [`SheetOrchestrator::state`] or watched via
//! [`SheetOrchestrator::subscribe`].

use serde::Serialize;
use stickerkit_core::batch::Batch;
use stickerkit_core::codec::decode_rgba;
use stickerkit_core::error::CoreError;
use stickerkit_core::grid_spec::{GridSpec, Variant};
use stickerkit_core::item::FontConfig;
use stickerkit_core::slicer::RawSheet;
use stickerkit_synthesis::{SheetRequest, SheetSynthesizer, SynthesisError};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running {
        run_id: Uuid,
        sheet_index: usize,
        total: usize,
    },
    Completed {
        run_id: Uuid,
        sheets: usize,
    },
    Failed {
        run_id: Uuid,
        sheet_index: usize,
        message: String,
    },
}

impl RunState {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

/// Reported before each sheet is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SheetProgress {
    pub sheet_index: usize,
    pub total: usize,
}

/// Run-wide inputs shared by every sheet request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Encoded character reference image every sheet conditions on.
    pub base_image: Vec<u8>,
    pub style_prompt: String,
    pub font: FontConfig,
    pub variant: Variant,
    pub geometry: GridSpec,
    /// Run-level caption switch, ANDed with each item's `show_text`.
    pub include_text: bool,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct SheetOrchestrator<S> {
    synthesizer: S,
    state: watch::Sender<RunState>,
}

impl<S: SheetSynthesizer> SheetOrchestrator<S> {
    pub fn new(synthesizer: S) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self { synthesizer, state }
    }

    pub fn synthesizer(&self) -> &S {
        &self.synthesizer
    }

    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().is_busy()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Generate one [`RawSheet`] per batch, in order.
    ///
    /// `on_progress` is invoked with `(sheet_index, total)` right before
    /// each sheet is requested. Fails with [`PipelineError::Busy`] if a
    /// run is already active, or [`PipelineError::ExternalCall`] on the
    /// first failed sheet.
    pub async fn run<F>(
        &self,
        batches: &[Batch],
        request: &RunRequest,
        mut on_progress: F,
    ) -> Result<Vec<RawSheet>, PipelineError>
    where
        F: FnMut(SheetProgress) + Send,
    {
        let run_id = Uuid::now_v7();
        let total = batches.len();

        let claimed = self.state.send_if_modified(|state| {
            if state.is_busy() {
                return false;
            }
            *state = RunState::Running {
                run_id,
                sheet_index: 0,
                total,
            };
            true
        });
        if !claimed {
            return Err(PipelineError::Busy);
        }
        let _guard = RunGuard {
            state: &self.state,
            run_id,
        };

        tracing::info!(%run_id, total, variant = %request.variant, "Starting sheet generation run");

        let mut sheets = Vec::with_capacity(total);
        for batch in batches {
            let sheet_index = batch.sheet_index;
            self.state.send_replace(RunState::Running {
                run_id,
                sheet_index,
                total,
            });
            on_progress(SheetProgress { sheet_index, total });

            match self.generate_sheet(batch, total, request).await {
                Ok(sheet) => {
                    tracing::info!(%run_id, sheet_index, total, "Sheet generated");
                    sheets.push(sheet);
                }
                Err(source) => {
                    tracing::error!(
                        %run_id,
                        sheet_index,
                        total,
                        discarded = sheets.len(),
                        error = %source,
                        "Sheet generation failed, aborting run",
                    );
                    self.state.send_replace(RunState::Failed {
                        run_id,
                        sheet_index,
                        message: source.to_string(),
                    });
                    return Err(PipelineError::ExternalCall {
                        sheet_index,
                        source,
                    });
                }
            }
        }

        self.state.send_replace(RunState::Completed {
            run_id,
            sheets: sheets.len(),
        });
        tracing::info!(%run_id, sheets = sheets.len(), "Sheet generation run completed");
        Ok(sheets)
    }

    async fn generate_sheet(
        &self,
        batch: &Batch,
        total: usize,
        request: &RunRequest,
    ) -> Result<RawSheet, SynthesisError> {
        let sheet_request = SheetRequest::for_batch(
            batch,
            total,
            &request.style_prompt,
            request.geometry,
            &request.font,
            request.variant,
            request.include_text,
        );
        let bytes = self
            .synthesizer
            .synthesize(&request.base_image, &sheet_request)
            .await?;
        let sheet_index = batch.sheet_index;
        let occupied = batch.len();
        let geometry = request.geometry;

        // Decode and canvas resampling are CPU-bound on sheets up to 3200x1750.
        let (width, height, sheet) = tokio::task::spawn_blocking(move || {
            let image = decode_rgba(&bytes)?;
            let (width, height) = image.dimensions();
            let sheet = RawSheet::new(sheet_index, image, geometry).with_occupied(occupied);
            Ok::<_, CoreError>((width, height, sheet))
        })
        .await
        .map_err(|e| SynthesisError::MalformedResponse(format!("sheet decode task failed: {e}")))?
        .map_err(|e| SynthesisError::MalformedResponse(e.to_string()))?;

        if !geometry.matches_canvas(width, height) {
            tracing::warn!(
                sheet_index,
                width,
                height,
                expected_width = geometry.canvas_width,
                expected_height = geometry.canvas_height,
                "Synthesized sheet had unexpected size, resampled to canvas",
            );
        }

        Ok(sheet)
    }
}

/// Clears the busy flag if a run future is dropped mid-flight.
struct RunGuard<'a> {
    state: &'a watch::Sender<RunState>,
    run_id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let run_id = self.run_id;
        self.state.send_if_modified(|state| {
            let sheet_index = match state {
                RunState::Running {
                    run_id: id,
                    sheet_index,
                    ..
                } if *id == run_id => *sheet_index,
                _ => return false,
            };
            tracing::warn!(%run_id, sheet_index, "Sheet generation run abandoned");
            *state = RunState::Failed {
                run_id,
                sheet_index,
                message: "run abandoned".to_string(),
            };
            true
        });
    }
}
