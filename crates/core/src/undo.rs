//! Undo window for block deletions.
//!
//! A deleted subtree is held here until its deadline passes. Until then
//! [`UndoBuffer::undo`] hands it back for restoration; afterwards
//! [`UndoBuffer::take_expired`] releases it for the backend delete.

use std::time::{Duration, Instant};

use crate::tree::DetachedSubtree;
use crate::types::EntityId;

/// Default time a deletion stays undoable.
pub const DEFAULT_UNDO_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PendingDeletion {
    pub subtree: DetachedSubtree,
    pub deadline: Instant,
}

impl PendingDeletion {
    pub fn block_id(&self) -> &str {
        &self.subtree.root_id
    }
}

#[derive(Debug)]
pub struct UndoBuffer {
    window: Duration,
    pending: Vec<PendingDeletion>,
}

impl Default for UndoBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_WINDOW)
    }
}

impl UndoBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Hold `subtree` until `now + window`. Returns the deadline.
    ///
    /// Staging the same block twice replaces the earlier entry.
    pub fn stage(&mut self, subtree: DetachedSubtree, now: Instant) -> Instant {
        let deadline = now + self.window;
        self.pending.retain(|p| p.subtree.root_id != subtree.root_id);
        self.pending.push(PendingDeletion { subtree, deadline });
        deadline
    }

    /// Withdraw a pending deletion. `None` if it was never staged or has
    /// already been taken for commit.
    pub fn undo(&mut self, block_id: &str) -> Option<DetachedSubtree> {
        let idx = self.pending.iter().position(|p| p.block_id() == block_id)?;
        Some(self.pending.remove(idx).subtree)
    }

    pub fn is_pending(&self, block_id: &str) -> bool {
        self.pending.iter().any(|p| p.block_id() == block_id)
    }

    /// Remove and return every deletion whose deadline is at or before `now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<PendingDeletion> {
        let (expired, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.deadline <= now);
        self.pending = keep;
        expired
    }

    /// Remove and return one deletion if its deadline has passed.
    pub fn take_if_expired(&mut self, block_id: &str, now: Instant) -> Option<PendingDeletion> {
        let idx = self
            .pending
            .iter()
            .position(|p| p.block_id() == block_id && p.deadline <= now)?;
        Some(self.pending.remove(idx))
    }

    pub fn pending_ids(&self) -> Vec<EntityId> {
        self.pending.iter().map(|p| p.subtree.root_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
