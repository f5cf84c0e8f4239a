//! Access-token authorization with an in-memory cache.
//!
//! [`AuthorizationGate`] answers from its token cache when it can and falls
//! back to the persistent [`TokenStore`] on a miss. Only positive answers are
//! cached.
//!
//! The cache lock is released while the store is queried, so two callers
//! presenting the same uncached token may both query the store. The second
//! insert is idempotent.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::persistence::TokenStore;

/// Validates opaque access tokens.
#[derive(Debug)]
pub struct AuthorizationGate {
    cache: Mutex<HashSet<String>>,
    store: Arc<dyn TokenStore>,
}

impl AuthorizationGate {
    /// Creates a gate backed by `store` with an empty cache.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            cache: Mutex::new(HashSet::new()),
            store,
        }
    }

    /// Returns `true` if `token` is authorized.
    ///
    /// Store failures are logged and treated as "not authorized".
    pub async fn authorize(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        if self.cache.lock().contains(token) {
            return true;
        }

        match self.store.is_valid(token).await {
            Ok(true) => {
                self.cache.lock().insert(token.to_string());
                tracing::debug!("token authorized and cached");
                true
            }
            Ok(false) => {
                tracing::debug!("token rejected");
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "token store lookup failed");
                false
            }
        }
    }

    /// Drops a token from the cache so the next check consults the store.
    pub fn evict(&self, token: &str) -> bool {
        self.cache.lock().remove(token)
    }

    /// Number of cached tokens.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}
