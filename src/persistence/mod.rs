//! Persistence collaborators: access-token allow-list and audit store.
//!
//! The dispatch core only depends on the [`TokenStore`] and [`AuditSink`]
//! traits. [`postgres::PostgresPersistence`] implements both over
//! `sqlx::PgPool`; [`memory`] provides in-process implementations for
//! standalone deployments and tests.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;

pub use memory::{MemoryAuditSink, MemoryTokenStore};
pub use models::AuditRecord;
pub use postgres::PostgresPersistence;

use crate::error::DispatchResult;

/// Persistent allow-list of access tokens.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Returns `true` if `token` is on the allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Persistence`](crate::error::DispatchError::Persistence)
    /// if the store cannot be queried.
    async fn is_valid(&self, token: &str) -> DispatchResult<bool>;
}

/// Durable destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    /// Persists one record.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Persistence`](crate::error::DispatchError::Persistence)
    /// on store failure.
    async fn write(&self, record: &AuditRecord) -> DispatchResult<()>;
}
