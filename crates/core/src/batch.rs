//! Batch planning: partitioning item configs into one group per sheet.

use serde::Serialize;

use crate::error::CoreError;
use crate::grid_spec::GridSpec;
use crate::item::ItemConfig;

/// Item configs synthesized together onto one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    /// Position of this batch in the plan; also the sheet's index.
    pub sheet_index: usize,
    pub configs: Vec<ItemConfig>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

/// Map a cell on a given sheet back to its position in the source list.
pub fn absolute_index(sheet_index: usize, capacity: usize, cell_index: usize) -> usize {
    sheet_index * capacity + cell_index
}

/// Split `items` into consecutive sheet-sized batches, preserving order.
///
/// Every batch but the last holds exactly `spec.capacity()` configs. Empty
/// input yields an empty plan. Item content is not inspected.
pub fn plan(items: &[ItemConfig], spec: &GridSpec) -> Result<Vec<Batch>, CoreError> {
    let capacity = spec.capacity();
    if capacity == 0 {
        return Err(CoreError::Validation(format!(
            "Grid spec for {} items has zero capacity",
            spec.item_count
        )));
    }

    Ok(items
        .chunks(capacity)
        .enumerate()
        .map(|(sheet_index, chunk)| Batch {
            sheet_index,
            configs: chunk.to_vec(),
        })
        .collect())
}

/// Number of sheets needed for `item_count` items at `capacity` per sheet.
pub fn sheet_count(item_count: usize, capacity: usize) -> usize {
    if capacity == 0 {
        0
    } else {
        item_count.div_ceil(capacity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
