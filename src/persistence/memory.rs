//! In-process persistence collaborators.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::models::AuditRecord;
use super::{AuditSink, TokenStore};
use crate::error::{DispatchError, DispatchResult};

/// Allow-list held in memory.
///
/// Counts every lookup so callers can observe cache effectiveness.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashSet<String>>,
    lookups: AtomicU64,
    offline: AtomicBool,
}

impl MemoryTokenStore {
    /// Creates a store allowing `tokens`.
    #[must_use]
    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: Mutex::new(tokens.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Adds a token to the allow-list.
    pub fn grant(&self, token: impl Into<String>) {
        self.tokens.lock().insert(token.into());
    }

    /// Removes a token from the allow-list.
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.lock().remove(token)
    }

    /// Makes every subsequent lookup fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of lookups served so far.
    #[must_use]
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn is_valid(&self, token: &str) -> DispatchResult<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(DispatchError::Persistence("token store offline".to_string()));
        }
        Ok(self.tokens.lock().contains(token))
    }
}

/// Audit sink collecting records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns a copy of the records written so far.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Number of records written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, record: &AuditRecord) -> DispatchResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Persistence("audit store unavailable".to_string()));
        }
        self.records.lock().push(record.clone());
        Ok(())
    }
}
