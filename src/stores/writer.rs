//! Background persistence of incidents and audit records.
//!
//! # Responsibilities
//! - Accept writes from the request path without awaiting the store
//! - Apply them in submission order on a single worker task
//! - Log and swallow store failures
//!
//! # Design Decisions
//! - Bounded queue: a full queue drops the write (warn + metric), it never blocks a request
//! - The worker exits once every `StoreWriter` handle is dropped, after draining the queue

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::audit::types::{AuditCompletion, AuditRecord};
use crate::observability::metrics;
use crate::security::types::SecurityFinding;
use crate::stores::{AuditStore, IncidentStore};

/// A unit of work for the writer task.
#[derive(Debug)]
pub enum StoreJob {
    Incident(SecurityFinding),
    AuditStart(AuditRecord),
    AuditComplete(AuditCompletion),
    Flush(oneshot::Sender<()>),
}

impl StoreJob {
    fn kind(&self) -> &'static str {
        match self {
            StoreJob::Incident(_) => "incident",
            StoreJob::AuditStart(_) => "audit_start",
            StoreJob::AuditComplete(_) => "audit_complete",
            StoreJob::Flush(_) => "flush",
        }
    }
}

/// Cloneable handle used by the admission stages.
#[derive(Clone, Debug)]
pub struct StoreWriter {
    tx: mpsc::Sender<StoreJob>,
}

impl StoreWriter {
    /// Spawn the worker task. The returned handle completes after the last writer is dropped.
    pub fn spawn(
        incidents: Arc<dyn IncidentStore>,
        audits: Arc<dyn AuditStore>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(rx, incidents, audits));
        (Self { tx }, handle)
    }

    /// A writer with no worker; the caller drains the queue.
    #[cfg(test)]
    pub(crate) fn detached(capacity: usize) -> (Self, mpsc::Receiver<StoreJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn incident(&self, finding: SecurityFinding) {
        self.submit(StoreJob::Incident(finding));
    }

    pub fn audit_start(&self, record: AuditRecord) {
        self.submit(StoreJob::AuditStart(record));
    }

    pub fn audit_complete(&self, completion: AuditCompletion) {
        self.submit(StoreJob::AuditComplete(completion));
    }

    fn submit(&self, job: StoreJob) {
        let kind = job.kind();
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(kind, "Store write queue full, dropping record");
                metrics::record_dropped_write(kind);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(kind, "Store writer stopped, dropping record");
                metrics::record_dropped_write(kind);
            }
        }
    }

    /// Wait until every job submitted before this call has been applied.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(StoreJob::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<StoreJob>,
    incidents: Arc<dyn IncidentStore>,
    audits: Arc<dyn AuditStore>,
) {
    tracing::debug!("Store writer started");

    while let Some(job) = rx.recv().await {
        match job {
            StoreJob::Incident(finding) => match incidents.create(&finding).await {
                Ok(id) => tracing::debug!(
                    incident_id = %id,
                    category = %finding.category,
                    source_ip = %finding.source_ip,
                    "Incident recorded"
                ),
                Err(e) => tracing::warn!(
                    category = %finding.category,
                    error = %e,
                    "Failed to record incident"
                ),
            },
            StoreJob::AuditStart(record) => {
                if let Err(e) = audits.start(&record).await {
                    tracing::warn!(
                        request_id = %record.request_id,
                        error = %e,
                        "Failed to log request start"
                    );
                }
            }
            StoreJob::AuditComplete(completion) => {
                if let Err(e) = audits.complete(&completion).await {
                    tracing::warn!(
                        request_id = %completion.request_id,
                        error = %e,
                        "Failed to log request completion"
                    );
                }
            }
            StoreJob::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    tracing::debug!("Store writer drained, exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::types::{FindingCategory, Severity};
    use crate::stores::{InMemoryAuditStore, InMemoryIncidentStore, StoreError};
    use async_trait::async_trait;

    struct BrokenIncidents;

    #[async_trait]
    impl IncidentStore for BrokenIncidents {
        async fn create(&self, _finding: &SecurityFinding) -> Result<String, StoreError> {
            Err(StoreError::Unavailable("database down".into()))
        }
    }

    fn finding() -> SecurityFinding {
        SecurityFinding::new(FindingCategory::Xss, Severity::Medium, "10.0.0.9", "probe")
    }

    #[tokio::test]
    async fn test_jobs_are_applied_in_order() {
        let incidents = Arc::new(InMemoryIncidentStore::new());
        let audits = Arc::new(InMemoryAuditStore::new());
        let (writer, handle) = StoreWriter::spawn(incidents.clone(), audits.clone(), 16);

        writer.incident(finding());
        writer.incident(finding());
        writer.flush().await;
        assert_eq!(incidents.incidents().len(), 2);

        drop(writer);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failures_are_swallowed() {
        let audits = Arc::new(InMemoryAuditStore::new());
        let (writer, handle) = StoreWriter::spawn(Arc::new(BrokenIncidents), audits, 4);

        writer.incident(finding());
        writer.flush().await;

        // The worker survived the failure and still answers.
        writer.flush().await;
        drop(writer);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let writer = StoreWriter { tx };

        writer.incident(finding());
        writer.incident(finding());

        assert!(matches!(rx.try_recv(), Ok(StoreJob::Incident(_))));
        assert!(rx.try_recv().is_err());
    }
}
