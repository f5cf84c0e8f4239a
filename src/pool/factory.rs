//! Type-id-keyed table of worker factories.
//!
//! Each worker group registers one [`WorkerFactory`] at startup; pools look
//! it up lazily on their first miss.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::WorkerFactory;
use crate::domain::TypeId;

/// Shared factory handle.
pub type SharedFactory<W> = Arc<dyn WorkerFactory<W>>;

/// Map from worker group to its factory.
pub struct FactoryTable<W: ?Sized> {
    factories: RwLock<HashMap<TypeId, SharedFactory<W>>>,
}

impl<W: ?Sized> FactoryTable<W> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the factory for `group`, replacing any previous one.
    pub fn register(&self, group: TypeId, factory: SharedFactory<W>) {
        tracing::debug!(%group, max = factory.max_instance_count(), "worker factory registered");
        self.factories.write().insert(group, factory);
    }

    /// Returns the factory for `group`.
    #[must_use]
    pub fn get(&self, group: TypeId) -> Option<SharedFactory<W>> {
        self.factories.read().get(&group).map(Arc::clone)
    }

    /// Returns `true` if `group` has a factory.
    #[must_use]
    pub fn contains(&self, group: TypeId) -> bool {
        self.factories.read().contains_key(&group)
    }
}

impl<W: ?Sized> Default for FactoryTable<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: ?Sized> fmt::Debug for FactoryTable<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factories = self.factories.read();
        let mut groups: Vec<&TypeId> = factories.keys().collect();
        groups.sort_unstable();
        f.debug_struct("FactoryTable")
            .field("groups", &groups)
            .finish()
    }
}
