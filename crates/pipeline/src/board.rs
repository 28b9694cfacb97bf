//! Shared collection of item lifecycles.
//!
//! Each item lives in its own slot with two locks: a short-lived state
//! lock for reads and transitions, and a writer lock held for the whole
//! duration of a retry. Items never share a lock, so retries on different
//! ids proceed independently while a second retry on the same id is
//! refused.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use image::RgbaImage;
use serde::Serialize;
use stickerkit_core::error::CoreError;
use stickerkit_core::item::ItemConfig;
use stickerkit_core::lifecycle::{ItemLifecycle, ItemStatus};
use stickerkit_core::slicer::SlicedItem;
use stickerkit_core::types::ItemId;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::PipelineError;

/// Reason recorded on items whose cell yielded no foreground.
pub const DETECTION_MISS_REASON: &str = "no subject detected in its cell";

pub(crate) struct Slot {
    pub(crate) lifecycle: Mutex<ItemLifecycle>,
    pub(crate) writer: Arc<Mutex<()>>,
}

/// Point-in-time view of one item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSnapshot {
    pub item_id: ItemId,
    pub status: ItemStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub has_image: bool,
    pub cooldown_remaining_ms: u64,
}

/// Writer locks of every item, held for the length of a full run so no
/// single-item retry can interleave with it.
#[derive(Debug)]
#[must_use = "dropping the claim lets retries interleave with the run"]
pub struct RunClaim {
    _writers: Vec<OwnedMutexGuard<()>>,
}

/// A finished item in source order, for the export collaborator.
#[derive(Debug, Clone)]
pub struct ExportItem {
    pub item_id: ItemId,
    pub image: RgbaImage,
}

/// Outcome of mapping sliced cells back onto items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    pub assigned: usize,
    /// Items whose cell produced nothing; now in `Error`.
    pub missing: Vec<ItemId>,
    /// Absolute indices with no matching item.
    pub unmatched: Vec<usize>,
}

pub struct ItemBoard {
    order: Vec<ItemId>,
    slots: HashMap<ItemId, Arc<Slot>>,
    main_item: RwLock<Option<ItemId>>,
}

impl ItemBoard {
    /// Build a board of `Pending` items in the configs' order.
    pub fn new(configs: &[ItemConfig]) -> Result<Self, CoreError> {
        let mut order = Vec::with_capacity(configs.len());
        let mut slots = HashMap::with_capacity(configs.len());

        for config in configs {
            let slot = Arc::new(Slot {
                lifecycle: Mutex::new(ItemLifecycle::new(config.id.clone())),
                writer: Arc::new(Mutex::new(())),
            });
            if slots.insert(config.id.clone(), slot).is_some() {
                return Err(CoreError::Validation(format!(
                    "Duplicate item id '{}'",
                    config.id
                )));
            }
            order.push(config.id.clone());
        }

        Ok(Self {
            order,
            slots,
            main_item: RwLock::new(None),
        })
    }

    /// Number of items on the board.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Item ids in source order.
    pub fn ids(&self) -> &[ItemId] {
        &self.order
    }

    pub(crate) fn slot(&self, item_id: &str) -> Result<Arc<Slot>, CoreError> {
        self.slots
            .get(item_id)
            .cloned()
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))
    }

    /// Run `f` against one item's lifecycle under its state lock.
    pub async fn with_item<R>(
        &self,
        item_id: &str,
        f: impl FnOnce(&mut ItemLifecycle) -> R,
    ) -> Result<R, CoreError> {
        let slot = self.slot(item_id)?;
        let mut lifecycle = slot.lifecycle.lock().await;
        Ok(f(&mut lifecycle))
    }

    pub async fn status(&self, item_id: &str) -> Result<ItemStatus, CoreError> {
        self.with_item(item_id, |l| l.status()).await
    }

    pub async fn snapshot(&self) -> Vec<ItemSnapshot> {
        let now = Utc::now();
        let mut out = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let lifecycle = self.slots[id].lifecycle.lock().await;
            out.push(ItemSnapshot {
                item_id: id.clone(),
                status: lifecycle.status(),
                attempts: lifecycle.attempts(),
                last_error: lifecycle.last_error().map(str::to_string),
                has_image: lifecycle.last_image().is_some(),
                cooldown_remaining_ms: lifecycle.cooldown_remaining(now).as_millis() as u64,
            });
        }
        out
    }

    /// Put every item into `Generating` for a full multi-sheet run.
    ///
    /// All or nothing: fails with [`PipelineError::RetryInProgress`] if any
    /// item has a retry in flight (cooldown included), or with an invalid
    /// transition if any item cannot start generating. In both cases no
    /// item is touched.
    pub async fn begin_run(&self) -> Result<RunClaim, PipelineError> {
        let mut writers = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let writer = Arc::clone(&self.slots[id].writer)
                .try_lock_owned()
                .map_err(|_| PipelineError::RetryInProgress(id.clone()))?;
            writers.push(writer);
        }

        let mut lifecycles = Vec::with_capacity(self.order.len());
        for id in &self.order {
            lifecycles.push(self.slots[id].lifecycle.lock().await);
        }
        if let Some(blocked) = lifecycles
            .iter()
            .find(|l| !l.status().can_transition_to(ItemStatus::Generating))
        {
            return Err(CoreError::InvalidTransition {
                item_id: blocked.item_id().to_string(),
                from: blocked.status(),
                to: ItemStatus::Generating,
            }
            .into());
        }
        for lifecycle in &mut lifecycles {
            lifecycle.start_generating()?;
        }

        Ok(RunClaim { _writers: writers })
    }

    /// Fail every item still `Generating`. Returns how many were failed.
    pub async fn fail_generating(&self, reason: &str) -> usize {
        let mut failed = 0;
        for id in &self.order {
            let mut lifecycle = self.slots[id].lifecycle.lock().await;
            if lifecycle.status() == ItemStatus::Generating && lifecycle.fail(reason).is_ok() {
                failed += 1;
            }
        }
        failed
    }

    /// Mark items `Success` by absolute index; items left `Generating`
    /// afterwards had no detection and are marked `Error`.
    pub async fn apply_sliced(&self, items: &[SlicedItem]) -> AssignmentReport {
        let mut report = AssignmentReport::default();

        for item in items {
            let Some(id) = self.order.get(item.absolute_index) else {
                tracing::warn!(
                    absolute_index = item.absolute_index,
                    "Sliced cell has no matching item",
                );
                report.unmatched.push(item.absolute_index);
                continue;
            };
            let mut lifecycle = self.slots[id].lifecycle.lock().await;
            match lifecycle.succeed(item.image.clone()) {
                Ok(()) => report.assigned += 1,
                Err(e) => {
                    tracing::warn!(item_id = %id, error = %e, "Could not assign sliced image");
                    report.unmatched.push(item.absolute_index);
                }
            }
        }

        for id in &self.order {
            let mut lifecycle = self.slots[id].lifecycle.lock().await;
            if lifecycle.status() == ItemStatus::Generating
                && lifecycle.fail(DETECTION_MISS_REASON).is_ok()
            {
                report.missing.push(id.clone());
            }
        }

        if !report.missing.is_empty() {
            tracing::warn!(
                expected = self.order.len(),
                produced = report.assigned,
                "Detection misses left items in error",
            );
        }
        report
    }

    /// Successful images in source order.
    pub async fn export(&self) -> Vec<ExportItem> {
        let mut out = Vec::new();
        for id in &self.order {
            let lifecycle = self.slots[id].lifecycle.lock().await;
            if lifecycle.status() != ItemStatus::Success {
                continue;
            }
            if let Some(image) = lifecycle.last_image() {
                out.push(ExportItem {
                    item_id: id.clone(),
                    image: image.clone(),
                });
            }
        }
        out
    }

    /// Pick the item used as the package's main/tab image.
    pub async fn set_main(&self, item_id: &str) -> Result<(), CoreError> {
        let status = self.status(item_id).await?;
        if status != ItemStatus::Success {
            return Err(CoreError::Validation(format!(
                "Item '{item_id}' cannot be main while {status}"
            )));
        }
        *self.main_item.write().await = Some(item_id.to_string());
        Ok(())
    }

    /// The chosen main item if still successful, else the first success.
    pub async fn main_item(&self) -> Option<ItemId> {
        let chosen = self.main_item.read().await.clone();
        if let Some(id) = chosen {
            if matches!(self.status(&id).await, Ok(ItemStatus::Success)) {
                return Some(id);
            }
        }
        for id in &self.order {
            if self.slots[id].lifecycle.lock().await.status() == ItemStatus::Success {
                return Some(id.clone());
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn configs(n: usize) -> Vec<ItemConfig> {
        (0..n)
            .map(|i| ItemConfig::new(format!("s-{i}"), format!("#{i}")))
            .collect()
    }

    fn sliced(index: usize) -> SlicedItem {
        SlicedItem {
            absolute_index: index,
            image: RgbaImage::new(4, 4),
            cell_row: 0,
            cell_col: index as u32,
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut items = configs(2);
        items[1].id = "s-0".into();
        assert_matches!(ItemBoard::new(&items).err(), Some(CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn items_start_pending() {
        let board = ItemBoard::new(&configs(3)).unwrap();
        let snap = board.snapshot().await;
        assert_eq!(snap.len(), 3);
        assert!(snap.iter().all(|s| s.status == ItemStatus::Pending));
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let board = ItemBoard::new(&configs(1)).unwrap();
        assert_matches!(board.status("nope").await, Err(CoreError::ItemNotFound(_)));
    }

    #[tokio::test]
    async fn sliced_items_map_by_absolute_index() {
        let board = ItemBoard::new(&configs(4)).unwrap();
        let _claim = board.begin_run().await.unwrap();

        let report = board.apply_sliced(&[sliced(0), sliced(2), sliced(9)]).await;

        assert_eq!(report.assigned, 2);
        assert_eq!(report.missing, vec!["s-1".to_string(), "s-3".to_string()]);
        assert_eq!(report.unmatched, vec![9]);
        assert_eq!(board.status("s-2").await.unwrap(), ItemStatus::Success);
        let err = board.with_item("s-1", |l| l.last_error().map(str::to_string)).await;
        assert_eq!(err.unwrap().as_deref(), Some(DETECTION_MISS_REASON));
    }

    #[tokio::test]
    async fn run_is_refused_while_an_item_is_held_by_a_writer() {
        let board = ItemBoard::new(&configs(3)).unwrap();
        let slot = board.slot("s-1").unwrap();
        let writer = slot.writer.try_lock().unwrap();

        assert_matches!(
            board.begin_run().await,
            Err(PipelineError::RetryInProgress(ref id)) if id == "s-1"
        );
        assert!(board.snapshot().await.iter().all(|s| s.status == ItemStatus::Pending));

        drop(writer);
        assert!(board.begin_run().await.is_ok());
    }

    #[tokio::test]
    async fn run_start_is_all_or_nothing() {
        let board = ItemBoard::new(&configs(3)).unwrap();
        board
            .with_item("s-2", |l| l.start_generating())
            .await
            .unwrap()
            .unwrap();

        assert_matches!(
            board.begin_run().await,
            Err(PipelineError::Core(CoreError::InvalidTransition { ref item_id, .. }))
                if item_id == "s-2"
        );
        assert_eq!(board.status("s-0").await.unwrap(), ItemStatus::Pending);
        assert_eq!(board.status("s-1").await.unwrap(), ItemStatus::Pending);
        assert_eq!(board.snapshot().await[0].attempts, 0);
    }

    #[tokio::test]
    async fn failed_run_marks_all_generating_items() {
        let board = ItemBoard::new(&configs(3)).unwrap();
        let _claim = board.begin_run().await.unwrap();
        assert_eq!(board.fail_generating("could not complete generation").await, 3);
        assert_eq!(board.status("s-0").await.unwrap(), ItemStatus::Error);
    }

    #[tokio::test]
    async fn export_keeps_source_order_and_skips_failures() {
        let board = ItemBoard::new(&configs(3)).unwrap();
        let _claim = board.begin_run().await.unwrap();
        board.apply_sliced(&[sliced(2), sliced(0)]).await;

        let ids: Vec<String> = board.export().await.into_iter().map(|e| e.item_id).collect();
        assert_eq!(ids, vec!["s-0", "s-2"]);
    }

    #[tokio::test]
    async fn main_item_defaults_to_first_success() {
        let board = ItemBoard::new(&configs(3)).unwrap();
        assert_eq!(board.main_item().await, None);

        let _claim = board.begin_run().await.unwrap();
        board.apply_sliced(&[sliced(1), sliced(2)]).await;
        assert_eq!(board.main_item().await.as_deref(), Some("s-1"));

        board.set_main("s-2").await.unwrap();
        assert_eq!(board.main_item().await.as_deref(), Some("s-2"));
        assert_matches!(board.set_main("s-0").await, Err(CoreError::Validation(_)));
    }
}
