//! Per-item status state machine.
//!
//! ```text
//! Pending ──► Generating ──► Success ──(re-edit)──► Generating
//!                 │  ▲  └──► Error ──(retry)──► Generating
//!                 ▼  │
//!               Cooldown
//! ```
//!
//! Transitions are independent per item and never touch sibling items.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{ItemId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    Generating,
    /// Self-imposed wait before the next attempt is issued.
    Cooldown,
    Error,
    Success,
}

impl ItemStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Generating => "Generating",
            Self::Cooldown => "Cooldown",
            Self::Error => "Error",
            Self::Success => "Success",
        }
    }

    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, Generating)
                | (Generating, Success)
                | (Generating, Error)
                | (Generating, Cooldown)
                | (Cooldown, Generating)
                | (Error, Generating)
                | (Success, Generating)
        )
    }

    /// Statuses that represent an in-flight attempt.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Generating | Self::Cooldown)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle record for a single item.
#[derive(Debug, Clone)]
pub struct ItemLifecycle {
    item_id: ItemId,
    status: ItemStatus,
    last_image: Option<RgbaImage>,
    last_error: Option<String>,
    cooldown_until: Option<Timestamp>,
    /// Number of times the item entered `Generating` from outside `Cooldown`.
    attempts: u32,
    updated_at: Timestamp,
}

impl ItemLifecycle {
    /// Fresh `Pending` record with no attempts.
    pub fn new(item_id: impl Into<ItemId>) -> Self {
        Self {
            item_id: item_id.into(),
            status: ItemStatus::Pending,
            last_image: None,
            last_error: None,
            cooldown_until: None,
            attempts: 0,
            updated_at: Utc::now(),
        }
    }

    /// Id of the item this record tracks.
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ItemStatus {
        self.status
    }

    /// Most recent successful image, kept across later failures.
    pub fn last_image(&self) -> Option<&RgbaImage> {
        self.last_image.as_ref()
    }

    /// Reason of the latest failure, cleared on success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Generation attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Time of the last transition.
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// End of the current cooldown, if one is running.
    pub fn cooldown_until(&self) -> Option<Timestamp> {
        self.cooldown_until
    }

    /// Time left before a cooldown expires, zero when not cooling down.
    pub fn cooldown_remaining(&self, now: Timestamp) -> Duration {
        match (self.status, self.cooldown_until) {
            (ItemStatus::Cooldown, Some(until)) => (until - now).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    /// Enter `Generating`: first attempt, manual retry, re-edit, or the
    /// end of a cooldown.
    pub fn start_generating(&mut self) -> Result<(), CoreError> {
        let resumed = self.status == ItemStatus::Cooldown;
        self.transition(ItemStatus::Generating)?;
        self.cooldown_until = None;
        if !resumed {
            self.attempts += 1;
        }
        Ok(())
    }

    /// Move to `Cooldown` for `duration`, starting now.
    pub fn enter_cooldown(&mut self, duration: Duration) -> Result<(), CoreError> {
        self.transition(ItemStatus::Cooldown)?;
        let delta = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        let until = self
            .updated_at
            .checked_add_signed(delta)
            .unwrap_or(self.updated_at);
        self.cooldown_until = Some(until);
        Ok(())
    }

    /// Store `image` and move to `Success`.
    pub fn succeed(&mut self, image: RgbaImage) -> Result<(), CoreError> {
        self.transition(ItemStatus::Success)?;
        self.last_image = Some(image);
        self.last_error = None;
        Ok(())
    }

    /// Mark the attempt failed. A previous successful image is kept.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        self.transition(ItemStatus::Error)?;
        self.last_error = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, next: ItemStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                item_id: self.item_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
