//! Dispatch error types with outcome-code mapping.
//!
//! [`DispatchError`] is the central error type for the dispatch core. Each
//! variant maps to a numeric error code and to the [`Outcome`] reported in a
//! [`Message`](crate::domain::Message)'s system response, so that failures
//! surface to the caller without escaping the dispatch loop.

use std::any::Any;

use crate::domain::{Outcome, TypeId};

/// Convenience alias used throughout the crate.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Dispatch-core error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category      | Outcome             |
/// |-----------|---------------|---------------------|
/// | 1000–1999 | Registration  | `RegistrationError` |
/// | 2000–2999 | Request       | `RequestError`      |
/// | 3000–3999 | System        | `SystemError`       |
/// | 4000–4999 | Resource      | `SystemError`       |
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No worker group is registered for the request type.
    #[error("no processor registered for request type {0}")]
    UnknownRequestType(TypeId),

    /// The worker group has no factory to construct instances from.
    #[error("no factory registered for worker group {0}")]
    MissingFactory(TypeId),

    /// The well-known dispatcher is absent from the identity registry.
    #[error("dispatcher is not registered")]
    DispatcherNotRegistered,

    /// The worker group reached its instance ceiling.
    #[error("worker pool exhausted for group {group} (max {max} instances)")]
    PoolExhausted {
        /// Worker group whose pool is exhausted.
        group: TypeId,
        /// Configured instance ceiling.
        max: usize,
    },

    /// A correlated wait was not satisfied in time.
    #[error("timed out after {waited_ms} ms waiting for response {correlation_id}")]
    Timeout {
        /// Internal id of the awaited response.
        correlation_id: u64,
        /// Milliseconds spent waiting.
        waited_ms: u64,
    },

    /// A worker or store was asked for an operation it does not implement.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Underlying store failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A worker reported a failure while handling a request.
    #[error("worker failed: {0}")]
    WorkerFailed(String),

    /// A worker panicked while handling a request.
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    /// A code path that exists only as a hook.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Configuration value could not be interpreted.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The dispatcher stopped before the request was served.
    #[error("dispatcher stopped before serving request {0}")]
    Cancelled(u64),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::UnknownRequestType(_) => 1001,
            Self::MissingFactory(_) => 1002,
            Self::DispatcherNotRegistered => 1003,
            Self::Unsupported(_) => 2001,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::WorkerFailed(_) => 3002,
            Self::WorkerPanicked(_) => 3003,
            Self::NotImplemented(_) => 3004,
            Self::InvalidConfig(_) => 3005,
            Self::Cancelled(_) => 3006,
            Self::PoolExhausted { .. } => 4001,
            Self::Timeout { .. } => 4002,
        }
    }

    /// Returns the outcome recorded on a message that failed with this error.
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        match self {
            Self::UnknownRequestType(_)
            | Self::MissingFactory(_)
            | Self::DispatcherNotRegistered => Outcome::RegistrationError,
            Self::Unsupported(_) => Outcome::RequestError,
            Self::PoolExhausted { .. }
            | Self::Timeout { .. }
            | Self::Persistence(_)
            | Self::WorkerFailed(_)
            | Self::WorkerPanicked(_)
            | Self::NotImplemented(_)
            | Self::InvalidConfig(_)
            | Self::Cancelled(_)
            | Self::Internal(_) => Outcome::SystemError,
        }
    }

    /// Builds a [`DispatchError::WorkerPanicked`] from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let text = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::WorkerPanicked(text)
    }

    /// Returns `true` if the caller may retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::PoolExhausted { .. })
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
