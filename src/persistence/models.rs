//! Database models for audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One audited request, as written to the `audit_log` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record id.
    pub id: Uuid,
    /// Access token presented by the caller.
    pub token: String,
    /// When the request was received.
    pub timestamp: DateTime<Utc>,
    /// Requested resource (e.g. request type or endpoint).
    pub resource: String,
}

impl AuditRecord {
    /// Creates a record with a fresh id.
    #[must_use]
    pub fn new(token: impl Into<String>, timestamp: DateTime<Utc>, resource: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            token: token.into(),
            timestamp,
            resource: resource.into(),
        }
    }
}
