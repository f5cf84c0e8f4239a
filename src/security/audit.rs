//! Asynchronous request audit logging.
//!
//! [`AuditLogger::log`] only enqueues; a single writer task drains the queue
//! and persists one record at a time, so audit-store latency never reaches
//! the request path. Write failures are logged and dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::persistence::{AuditRecord, AuditSink};
use crate::queue::WorkQueue;

/// Decouples audit writes from request handling.
#[derive(Debug)]
pub struct AuditLogger {
    queue: WorkQueue<AuditRecord>,
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    /// Creates a logger writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            queue: WorkQueue::new(),
            sink,
        }
    }

    /// Enqueues one audit record. Never blocks.
    pub fn log(&self, token: &str, timestamp: DateTime<Utc>, resource: &str) {
        self.queue.push(AuditRecord::new(token, timestamp, resource));
    }

    /// Number of records waiting to be written.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Spawns the writer task on the current runtime.
    #[must_use]
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let logger = Arc::clone(self);
        tokio::spawn(async move { logger.run(cancel).await })
    }

    /// Writes queued records until `cancel` fires, then flushes the backlog.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("audit writer starting");
        loop {
            let record = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                record = self.queue.wait_and_pop() => record,
            };
            self.write(&record).await;
        }

        let mut flushed = 0_usize;
        while let Some(record) = self.queue.try_pop() {
            self.write(&record).await;
            flushed += 1;
        }
        tracing::info!(flushed, "audit writer stopped");
    }

    async fn write(&self, record: &AuditRecord) {
        if let Err(err) = self.sink.write(record).await {
            tracing::warn!(
                record_id = %record.id,
                resource = %record.resource,
                error = %err,
                "audit record dropped"
            );
        }
    }
}
