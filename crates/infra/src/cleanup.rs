//! Background deletion of superseded and expired documents.
//!
//! Auth decisions never wait on cleanup: callers `enqueue` and move on. A
//! single tokio task drains the queue, retrying each delete a few times with
//! a short backoff. Failures are logged and counted, then dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

use crate::metrics::AuthMetrics;
use crate::store::Documents;

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupTask {
    pub collection: String,
    pub id: String,
    /// Short label for logs ("expired", "superseded", ...).
    pub reason: &'static str,
}

impl CleanupTask {
    pub fn delete(collection: impl Into<String>, id: impl Into<String>, reason: &'static str) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            reason,
        }
    }
}

/// Handle to the cleanup worker. Cheap to clone.
#[derive(Clone)]
pub struct CleanupQueue {
    sender: mpsc::UnboundedSender<CleanupTask>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl CleanupQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(documents: Documents, metrics: Arc<AuthMetrics>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<CleanupTask>();
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let worker_pending = pending.clone();
        let worker_idle = idle.clone();
        tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                run_task(&documents, &metrics, &task).await;
                if worker_pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                    worker_idle.notify_waiters();
                }
            }
            debug!("cleanup queue closed");
        });

        Self {
            sender,
            pending,
            idle,
        }
    }

    pub fn enqueue(&self, task: CleanupTask) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if let Err(err) = self.sender.send(task) {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            warn!(collection = %err.0.collection, id = %err.0.id, "cleanup worker gone; task dropped");
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Resolves once every enqueued task has been processed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn run_task(documents: &Documents, metrics: &AuthMetrics, task: &CleanupTask) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match documents.delete(&task.collection, &task.id).await {
            Ok(_) => {
                debug!(collection = %task.collection, reason = task.reason, "cleanup delete done");
                return;
            }
            Err(err) if attempt < MAX_ATTEMPTS => {
                debug!(collection = %task.collection, attempt, error = %err, "cleanup delete failed; retrying");
                tokio::time::sleep(BASE_BACKOFF * 2u32.pow(attempt - 1)).await;
            }
            Err(err) => {
                metrics.cleanup_failed();
                warn!(
                    collection = %task.collection,
                    reason = task.reason,
                    attempts = attempt,
                    error = %err,
                    "cleanup delete failed; giving up"
                );
                return;
            }
        }
    }
}
