//! Content block actions: create, edit, move, and delete with an undo
//! window.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use quill_core::undo::UndoBuffer;
use quill_core::unit::{ContentUnit, NewBlock, UnitUpdate};
use quill_events::{EventBus, NotificationService, WorkspaceEvent};
use tokio::sync::RwLock;

use crate::api::ApiClient;
use crate::error::ClientResult;
use crate::SharedWorkspace;

pub struct BlockService {
    api: ApiClient,
    workspace: SharedWorkspace,
    bus: Arc<EventBus>,
    notifications: Option<Arc<NotificationService>>,
    undo: Mutex<UndoBuffer>,
    /// Held shared by each commit from before it leaves the buffer until its
    /// `DELETE` returns; `flush` takes it exclusively to wait them out.
    commits: RwLock<()>,
}

impl BlockService {
    pub fn new(
        api: ApiClient,
        workspace: SharedWorkspace,
        bus: Arc<EventBus>,
        undo_window: Duration,
    ) -> Self {
        Self {
            api,
            workspace,
            bus,
            notifications: None,
            undo: Mutex::new(UndoBuffer::new(undo_window)),
            commits: RwLock::new(()),
        }
    }

    pub fn with_notifications(mut self, notifications: Arc<NotificationService>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    fn undo_buffer(&self) -> MutexGuard<'_, UndoBuffer> {
        self.undo.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn create(&self, block: &NewBlock) -> ClientResult<ContentUnit> {
        let created = self.api.create_block(block).await?;
        self.workspace.write().await.blocks_mut().insert(created.clone())?;
        tracing::info!(block_id = %created.id, parent_id = ?created.parent_id, "Block created");
        Ok(created)
    }

    pub async fn update(&self, id: &str, update: &UnitUpdate) -> ClientResult<ContentUnit> {
        let saved = self.api.update_block(id, update).await?;
        self.workspace.write().await.apply_unit(saved.clone())?;
        Ok(saved)
    }

    /// Move a block under `new_parent` (root level when `None`) at `index`.
    ///
    /// The move is checked against the cached tree first; moving a block
    /// under itself or one of its descendants never reaches the backend.
    pub async fn move_block(
        &self,
        id: &str,
        new_parent: Option<&str>,
        index: usize,
    ) -> ClientResult<ContentUnit> {
        let mv = {
            let ws = self.workspace.read().await;
            let mut preview = ws.blocks().clone();
            preview.move_block(id, new_parent, index)?
        };
        let moved = self.api.move_block(&mv).await?;

        let mut ws = self.workspace.write().await;
        ws.blocks_mut().move_block(id, new_parent, index)?;
        tracing::info!(
            block_id = %id,
            new_parent_id = ?mv.new_parent_id,
            new_order_index = mv.new_order_index,
            "Block moved",
        );
        Ok(ws.unit(id).cloned().unwrap_or(moved))
    }

    /// Remove a block and its subtree locally, and delete it on the backend
    /// once the undo window lapses. Returns the commit deadline.
    pub async fn delete_with_undo(self: &Arc<Self>, id: &str) -> ClientResult<Instant> {
        let subtree = self.workspace.write().await.blocks_mut().detach_subtree(id)?;
        let window = self.undo_buffer().window();
        let deadline = self.undo_buffer().stage(subtree, Instant::now());
        self.bus.publish(WorkspaceEvent::BlockDeleted {
            block_id: id.to_string(),
        });
        tracing::info!(block_id = %id, window_ms = window.as_millis() as u64, "Block deletion staged");

        let service = Arc::clone(self);
        let block_id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Err(e) = service.commit(&block_id).await {
                tracing::error!(block_id = %block_id, error = %e, "Block deletion failed");
            }
        });
        Ok(deadline)
    }

    /// Bring back a block deleted within the undo window. Returns `false`
    /// when there is nothing to undo.
    pub async fn undo(&self, id: &str) -> ClientResult<bool> {
        let subtree = self.undo_buffer().undo(id);
        let Some(subtree) = subtree else {
            return Ok(false);
        };
        self.workspace.write().await.blocks_mut().restore_subtree(subtree)?;
        self.bus.publish(WorkspaceEvent::BlockRestored {
            block_id: id.to_string(),
        });
        tracing::info!(block_id = %id, "Block deletion undone");
        Ok(true)
    }

    pub fn pending_deletions(&self) -> Vec<String> {
        self.undo_buffer().pending_ids()
    }

    /// Commit every pending deletion now, ignoring remaining undo time, and
    /// wait for commits already under way. Used before exit so staged
    /// deletions are not lost.
    pub async fn flush(&self) -> ClientResult<()> {
        let pending = self.undo_buffer().take_expired(far_future());
        for deletion in pending {
            self.delete_remote(deletion.block_id()).await?;
        }
        let _idle = self.commits.write().await;
        Ok(())
    }

    async fn commit(&self, id: &str) -> ClientResult<()> {
        let _committing = self.commits.read().await;
        let deletion = self.undo_buffer().take_if_expired(id, Instant::now());
        let Some(deletion) = deletion else {
            // Undone, flushed, or restaged with a later deadline.
            return Ok(());
        };
        if let Err(e) = self.delete_remote(id).await {
            // Put the block back so the cache matches the backend.
            let restored = self
                .workspace
                .write()
                .await
                .blocks_mut()
                .restore_subtree(deletion.subtree);
            if let Err(restore_err) = restored {
                tracing::warn!(block_id = %id, error = %restore_err, "Could not restore block");
            }
            if let Some(n) = &self.notifications {
                n.error(format!("Deleting block failed: {e}"));
            }
            return Err(e);
        }
        Ok(())
    }

    async fn delete_remote(&self, id: &str) -> ClientResult<()> {
        match self.api.delete_block(id).await {
            Ok(()) => {}
            // Already gone on the backend: the deletion is effectively done.
            Err(e) if e.is_not_found() => {
                tracing::debug!(block_id = %id, "Block already deleted on backend");
            }
            Err(e) => return Err(e),
        }
        self.bus.publish(WorkspaceEvent::BlockDeletionCommitted {
            block_id: id.to_string(),
        });
        tracing::info!(block_id = %id, "Block deletion committed");
        Ok(())
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(365 * 24 * 3600)
}
