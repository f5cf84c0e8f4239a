//! Request-type → worker-group directory.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::TypeId;

/// Static map from request type to the worker group that serves it.
///
/// Populated at startup, one entry per supported request type. A request
/// type may list several groups; [`ProcessorDirectory::resolve`] returns the
/// first one registered.
#[derive(Debug, Default)]
pub struct ProcessorDirectory {
    entries: RwLock<HashMap<TypeId, Vec<TypeId>>>,
}

impl ProcessorDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `request_type` to `worker_group`.
    ///
    /// Registering the same pair twice is a no-op.
    pub fn register(&self, request_type: TypeId, worker_group: TypeId) {
        let mut entries = self.entries.write();
        let groups = entries.entry(request_type).or_default();
        if !groups.contains(&worker_group) {
            groups.push(worker_group);
        }
    }

    /// Returns the worker group for `request_type`, or `None` if unknown.
    #[must_use]
    pub fn resolve(&self, request_type: TypeId) -> Option<TypeId> {
        self.entries
            .read()
            .get(&request_type)
            .and_then(|groups| groups.first().copied())
    }

    /// Returns every worker group registered for `request_type`.
    #[must_use]
    pub fn groups_for(&self, request_type: TypeId) -> Vec<TypeId> {
        self.entries
            .read()
            .get(&request_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of known request types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if no request types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
