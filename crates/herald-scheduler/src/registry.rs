//! Worker registry: campaign id → live dispatch loop.
//!
//! All read-modify-write sequences on the map happen under one lock, so
//! check-and-spawn is atomic and at most one loop is alive per campaign id.
//! `stop` signals cancellation under the lock, then waits outside it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use herald_core::HeraldError;
use herald_core::error::Result;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::worker::{DispatchContext, process_campaign};

struct WorkerEntry {
    /// Distinguishes this run from a later one for the same campaign.
    run_id: u64,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
    task: AbortHandle,
}

impl WorkerEntry {
    fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }
}

struct RegistryInner {
    ctx: Arc<DispatchContext>,
    workers: Mutex<HashMap<String, WorkerEntry>>,
    next_run: AtomicU64,
}

/// Tracks running dispatch loops. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct WorkerRegistry {
    inner: Arc<RegistryInner>,
}

impl WorkerRegistry {
    pub fn new(ctx: Arc<DispatchContext>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                ctx,
                workers: Mutex::new(HashMap::new()),
                next_run: AtomicU64::new(1),
            }),
        }
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<String, WorkerEntry>> {
        self.inner
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn a dispatch loop for `campaign_id` unless one is already alive.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, campaign_id: &str) -> Result<()> {
        let mut workers = self.workers();

        if let Some(entry) = workers.get(campaign_id) {
            if entry.is_alive() {
                return Err(HeraldError::AlreadyRunning(campaign_id.to_string()));
            }
            workers.remove(campaign_id);
            tracing::warn!("🧹 Cleaned up dead task for campaign {campaign_id}");
        }

        let run_id = self.inner.next_run.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        let registry = self.clone();
        let ctx = self.inner.ctx.clone();
        let id = campaign_id.to_string();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let exit = process_campaign(ctx, id.clone(), token).await;
            registry.deregister(&id, run_id);
            let _ = done_tx.send(true);
            exit
        });

        workers.insert(
            campaign_id.to_string(),
            WorkerEntry {
                run_id,
                cancel,
                done: done_rx,
                task: handle.abort_handle(),
            },
        );
        tracing::info!("▶️ Started worker for campaign {campaign_id}");
        Ok(())
    }

    /// Remove the entry only if it still belongs to `run_id`.
    fn deregister(&self, campaign_id: &str, run_id: u64) {
        let mut workers = self.workers();
        if workers.get(campaign_id).is_some_and(|e| e.run_id == run_id) {
            workers.remove(campaign_id);
            tracing::info!("📤 Campaign {campaign_id} removed from running campaigns");
        }
    }

    /// Cancel the loop for `campaign_id` and wait until it has exited.
    pub async fn stop(&self, campaign_id: &str) -> Result<()> {
        let (run_id, mut done) = {
            let workers = self.workers();
            let Some(entry) = workers.get(campaign_id) else {
                return Err(HeraldError::NotRunning(campaign_id.to_string()));
            };
            entry.cancel.cancel();
            (entry.run_id, entry.done.clone())
        };

        // Sender dropped means the task is gone too.
        let _ = done.wait_for(|finished| *finished).await;

        let mut workers = self.workers();
        if workers.get(campaign_id).is_some_and(|e| e.run_id == run_id) {
            workers.remove(campaign_id);
        }
        tracing::info!("⏹️ Stopped worker for campaign {campaign_id}");
        Ok(())
    }

    /// Wait for the current loop of `campaign_id` to exit on its own.
    /// Returns immediately when nothing is registered.
    pub async fn wait(&self, campaign_id: &str) {
        let done = self.workers().get(campaign_id).map(|e| e.done.clone());
        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    pub fn is_running(&self, campaign_id: &str) -> bool {
        self.workers()
            .get(campaign_id)
            .is_some_and(WorkerEntry::is_alive)
    }

    pub fn running_ids(&self) -> Vec<String> {
        self.workers()
            .iter()
            .filter(|(_, e)| e.is_alive())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Stop every live loop. Used on shutdown.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.workers().keys().cloned().collect();
        for id in ids {
            match self.stop(&id).await {
                Ok(()) | Err(HeraldError::NotRunning(_)) => {}
                Err(e) => tracing::error!("❌ Failed to stop campaign {id}: {e}"),
            }
        }
    }
}
