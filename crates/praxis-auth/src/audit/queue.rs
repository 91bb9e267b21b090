//! Queued audit writer.
//!
//! Evaluators hand entries to a single worker task over a bounded channel.
//! The worker drains entries in batches, writes each one to the durable sink
//! with bounded retry and exponential backoff, then acknowledges the sender.
//! `append` resolves only after the acknowledgement, so delivery is
//! at-least-once and a decision is never returned unaudited.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::AuthResult;
use crate::audit::{AuditEntry, AuditFilter, AuditRecorder};
use crate::config::AuditConfig;
use crate::error::AuthError;

struct PendingEntry {
    entry: AuditEntry,
    ack: oneshot::Sender<AuthResult<()>>,
}

/// [`AuditRecorder`] that routes writes through a background worker.
pub struct QueuedAuditRecorder {
    sender: mpsc::Sender<PendingEntry>,
    sink: Arc<dyn AuditRecorder>,
    worker: JoinHandle<()>,
}

impl QueuedAuditRecorder {
    /// Spawns the worker on the current Tokio runtime.
    #[must_use]
    pub fn spawn(sink: Arc<dyn AuditRecorder>, config: &AuditConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let worker = tokio::spawn(run_worker(receiver, Arc::clone(&sink), config.clone()));
        Self {
            sender,
            sink,
            worker,
        }
    }

    /// Stops accepting entries, waits for queued ones to be written, and
    /// stops the worker.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the worker panicked.
    pub async fn shutdown(self) -> AuthResult<()> {
        drop(self.sender);
        self.worker
            .await
            .map_err(|e| AuthError::internal(format!("audit worker failed: {e}")))
    }
}

impl std::fmt::Debug for QueuedAuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedAuditRecorder")
            .field("capacity", &self.sender.max_capacity())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuditRecorder for QueuedAuditRecorder {
    async fn append(&self, entry: AuditEntry) -> AuthResult<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(PendingEntry { entry, ack })
            .await
            .map_err(|_| AuthError::audit("audit worker is not running"))?;
        done.await
            .map_err(|_| AuthError::audit("audit worker dropped the entry"))?
    }

    async fn query(&self, filter: &AuditFilter) -> AuthResult<Vec<AuditEntry>> {
        self.sink.query(filter).await
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<PendingEntry>,
    sink: Arc<dyn AuditRecorder>,
    config: AuditConfig,
) {
    let batch_size = config.batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);

    while receiver.recv_many(&mut batch, batch_size).await > 0 {
        tracing::trace!(entries = batch.len(), "Writing audit batch");
        for pending in batch.drain(..) {
            let result = write_with_retry(sink.as_ref(), pending.entry, &config).await;
            // The caller may have been cancelled; the entry is written regardless.
            let _ = pending.ack.send(result);
        }
    }

    tracing::debug!("Audit queue closed, worker exiting");
}

async fn write_with_retry(
    sink: &dyn AuditRecorder,
    entry: AuditEntry,
    config: &AuditConfig,
) -> AuthResult<()> {
    let mut attempt = 0u32;
    loop {
        match sink.append(entry.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < config.max_retries => {
                let delay = config.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
                tracing::warn!(
                    audit_id = %entry.audit_id,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Audit write failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    audit_id = %entry.audit_id,
                    attempts = attempt + 1,
                    error = %e,
                    "Audit write failed permanently"
                );
                return Err(AuthError::audit(format!(
                    "entry {} not persisted after {} attempts: {e}",
                    entry.audit_id,
                    attempt + 1
                )));
            }
        }
    }
}
