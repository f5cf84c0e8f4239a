//! PostgreSQL implementation of the persistence collaborators.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::AuditRecord;
use super::{AuditSink, TokenStore};
use crate::config::DispatchConfig;
use crate::error::{DispatchError, DispatchResult};

/// PostgreSQL-backed allow-list and audit store using `sqlx::PgPool`.
///
/// Expects the tables:
///
/// ```sql
/// CREATE TABLE access_tokens (token TEXT PRIMARY KEY, revoked BOOLEAN NOT NULL DEFAULT FALSE);
/// CREATE TABLE audit_log (id UUID PRIMARY KEY, token TEXT NOT NULL,
///                         requested_at TIMESTAMPTZ NOT NULL, resource TEXT NOT NULL);
/// ```
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Creates a persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError::Persistence`] if the database is unreachable.
    pub async fn connect(config: &DispatchConfig) -> DispatchResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| DispatchError::Persistence(format!("connect: {e}")))?;
        tracing::info!(
            max_connections = config.database_max_connections,
            "connected to persistence store"
        );
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl TokenStore for PostgresPersistence {
    async fn is_valid(&self, token: &str) -> DispatchResult<bool> {
        let found = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM access_tokens WHERE token = $1 AND revoked = FALSE)",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }
}

#[async_trait]
impl AuditSink for PostgresPersistence {
    async fn write(&self, record: &AuditRecord) -> DispatchResult<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, token, requested_at, resource) VALUES ($1, $2, $3, $4)",
        )
        .bind(record.id)
        .bind(&record.token)
        .bind(record.timestamp)
        .bind(&record.resource)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
