//! Slicing pass over every sheet of a run.

use serde::Serialize;
use stickerkit_core::slicer::{DetectionReport, GridSlicer, RawSheet, SlicedItem};

/// Sliced items of a whole run plus one detection report per sheet.
#[derive(Debug, Clone, Default)]
pub struct SliceSummary {
    /// Ordered by absolute index.
    pub items: Vec<SlicedItem>,
    pub reports: Vec<DetectionReport>,
}

/// Expected vs. produced counts, for user-facing warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionCounts {
    pub expected: usize,
    pub produced: usize,
}

impl SliceSummary {
    pub fn counts(&self) -> DetectionCounts {
        DetectionCounts {
            expected: self.reports.iter().map(|r| r.expected).sum(),
            produced: self.reports.iter().map(|r| r.produced).sum(),
        }
    }

    /// Reports of sheets with at least one empty occupied cell.
    pub fn misses(&self) -> impl Iterator<Item = &DetectionReport> {
        self.reports.iter().filter(|r| !r.is_complete())
    }

    pub fn has_misses(&self) -> bool {
        self.misses().next().is_some()
    }

    /// Nothing was detected on any sheet.
    pub fn no_objects_detected(&self) -> bool {
        self.items.is_empty()
    }

    /// Indices of sheets that produced zero items.
    pub fn empty_sheets(&self) -> Vec<usize> {
        self.reports
            .iter()
            .filter(|r| r.produced == 0)
            .map(|r| r.sheet_index)
            .collect()
    }
}

/// Slice every sheet in order. Detection misses are logged, never fatal.
pub fn slice_sheets(sheets: &[RawSheet], slicer: &GridSlicer) -> SliceSummary {
    let mut summary = SliceSummary::default();

    for sheet in sheets {
        let outcome = slicer.slice(sheet);
        if outcome.no_objects_detected() {
            tracing::warn!(
                sheet_index = sheet.sheet_index,
                "No objects detected on sheet; background may not be chroma green",
            );
        } else if !outcome.report.is_complete() {
            tracing::warn!(
                sheet_index = sheet.sheet_index,
                missing = ?outcome.report.missing_cells,
                "Some cells yielded no foreground",
            );
        }
        summary.items.extend(outcome.items);
        summary.reports.push(outcome.report);
    }

    summary.items.sort_by_key(|item| item.absolute_index);

    let counts = summary.counts();
    tracing::info!(
        sheets = sheets.len(),
        expected = counts.expected,
        produced = counts.produced,
        "Slicing complete",
    );
    summary
}
