//! End-to-end run: plan, generate every sheet, slice, and assign results.

use serde::Serialize;
use stickerkit_core::batch::plan;
use stickerkit_core::item::ItemConfig;
use stickerkit_core::slicer::GridSlicer;
use stickerkit_synthesis::SheetSynthesizer;

use crate::board::{AssignmentReport, ItemBoard};
use crate::error::PipelineError;
use crate::orchestrator::{RunRequest, SheetOrchestrator, SheetProgress};
use crate::slicing::{slice_sheets, DetectionCounts, SliceSummary};

/// Reason recorded on every item when the run aborts.
pub const RUN_FAILED_REASON: &str = "could not complete generation";

pub struct StickerPipeline<S> {
    orchestrator: SheetOrchestrator<S>,
    slicer: GridSlicer,
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct ProductionOutput {
    pub summary: SliceSummary,
    pub assignment: AssignmentReport,
}

/// Serializable digest of a run, for manifests and logs.
#[derive(Debug, Clone, Serialize)]
pub struct ProductionDigest {
    pub sheets: usize,
    pub counts: DetectionCounts,
    pub missing_items: Vec<String>,
}

impl ProductionOutput {
    pub fn digest(&self) -> ProductionDigest {
        ProductionDigest {
            sheets: self.summary.reports.len(),
            counts: self.summary.counts(),
            missing_items: self.assignment.missing.clone(),
        }
    }
}

impl<S: SheetSynthesizer> StickerPipeline<S> {
    pub fn new(synthesizer: S, slicer: GridSlicer) -> Self {
        Self {
            orchestrator: SheetOrchestrator::new(synthesizer),
            slicer,
        }
    }

    pub fn orchestrator(&self) -> &SheetOrchestrator<S> {
        &self.orchestrator
    }

    pub fn slicer(&self) -> &GridSlicer {
        &self.slicer
    }

    /// Run the whole batch against `board`.
    ///
    /// Refused without touching any item if a single-item retry is in
    /// flight on `board`. Once started, a failed run leaves every item in
    /// `Error` and no partial results are assigned. Detection misses are
    /// not failures: the affected items end in `Error` and are listed in
    /// the assignment.
    pub async fn produce<F>(
        &self,
        configs: &[ItemConfig],
        board: &ItemBoard,
        request: &RunRequest,
        on_progress: F,
    ) -> Result<ProductionOutput, PipelineError>
    where
        F: FnMut(SheetProgress) + Send,
    {
        let batches = plan(configs, &request.geometry)?;
        if self.orchestrator.is_busy() {
            return Err(PipelineError::Busy);
        }
        let _claim = board.begin_run().await?;

        let sheets = match self.orchestrator.run(&batches, request, on_progress).await {
            Ok(sheets) => sheets,
            Err(e) => {
                let failed = board.fail_generating(RUN_FAILED_REASON).await;
                tracing::warn!(failed, error = %e, "Run failed, items marked as error");
                return Err(e);
            }
        };

        let summary = slice_sheets(&sheets, &self.slicer);
        let assignment = board.apply_sliced(&summary.items).await;
        Ok(ProductionOutput {
            summary,
            assignment,
        })
    }
}
