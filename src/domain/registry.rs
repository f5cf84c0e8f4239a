//! Type-indexed identity registry with per-group locking.
//!
//! [`IdentityRegistry`] maps a [`Name`] to a shared object. Objects are grouped
//! by [`TypeId`]; each group holds its registered instances plus at most one
//! exemplar, and is protected by its own mutex so that groups never contend
//! with each other.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{InstanceId, Name, TypeId};

/// A registered object.
pub type Object = Arc<dyn Any + Send + Sync>;

/// Live instances and the exemplar of one type.
#[derive(Default)]
struct RegistryGroup {
    exemplar: Option<Object>,
    instances: HashMap<InstanceId, Object>,
}

impl fmt::Debug for RegistryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryGroup")
            .field("has_exemplar", &self.exemplar.is_some())
            .field("instances", &self.instances.len())
            .finish()
    }
}

/// Process-wide map from [`Name`] to object.
///
/// Uses a `RwLock<HashMap<...>>` for the outer group map and a per-group
/// `Arc<Mutex<RegistryGroup>>`.
///
/// # Concurrency
///
/// - Operations on one group are serialized.
/// - Operations on different groups run concurrently.
/// - Groups are created on first reference and never expire.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    groups: RwLock<HashMap<TypeId, Arc<Mutex<RegistryGroup>>>>,
}

impl IdentityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, type_id: TypeId) -> Arc<Mutex<RegistryGroup>> {
        if let Some(group) = self.groups.read().get(&type_id) {
            return Arc::clone(group);
        }
        let mut groups = self.groups.write();
        Arc::clone(groups.entry(type_id).or_default())
    }

    fn existing_group(&self, type_id: TypeId) -> Option<Arc<Mutex<RegistryGroup>>> {
        self.groups.read().get(&type_id).map(Arc::clone)
    }

    /// Registers `obj` under `name` unless an instance is already present.
    ///
    /// Exemplar names replace the group's exemplar unconditionally. For
    /// instance names the first writer wins: if the instance id is already
    /// bound, the existing object is returned and `obj` is discarded.
    pub fn register_if_absent(&self, name: &Name, obj: Object) -> Object {
        let group = self.group(name.type_id);
        let mut group = group.lock();
        if name.is_exemplar() {
            group.exemplar = Some(Arc::clone(&obj));
            return obj;
        }
        Arc::clone(group.instances.entry(name.instance_id).or_insert(obj))
    }

    /// Registers every `(name, object)` pair, returning the bound objects.
    pub fn register_many<I>(&self, objs: I) -> Vec<Object>
    where
        I: IntoIterator<Item = (Name, Object)>,
    {
        objs.into_iter()
            .map(|(name, obj)| self.register_if_absent(&name, obj))
            .collect()
    }

    /// Looks up the object bound to `name`.
    ///
    /// A miss is not an error; callers fall back to their own store.
    #[must_use]
    pub fn find(&self, name: &Name) -> Option<Object> {
        let group = self.existing_group(name.type_id)?;
        let group = group.lock();
        if name.is_exemplar() {
            group.exemplar.as_ref().map(Arc::clone)
        } else {
            group.instances.get(&name.instance_id).map(Arc::clone)
        }
    }

    /// Looks up `name` and downcasts the bound object to `T`.
    ///
    /// Returns `None` on a miss or if the object is not a `T`.
    #[must_use]
    pub fn find_as<T>(&self, name: &Name) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.find(name)?.downcast::<T>().ok()
    }

    /// Returns `true` if an object is bound to `name`.
    #[must_use]
    pub fn contains(&self, name: &Name) -> bool {
        self.find(name).is_some()
    }

    /// Removes the object bound to `name`, returning it.
    ///
    /// Unbinding an exemplar name clears the group's exemplar.
    pub fn unbind(&self, name: &Name) -> Option<Object> {
        let group = self.existing_group(name.type_id)?;
        let mut group = group.lock();
        if name.is_exemplar() {
            group.exemplar.take()
        } else {
            group.instances.remove(&name.instance_id)
        }
    }

    /// Returns the number of instances (exemplar excluded) in a group.
    #[must_use]
    pub fn len(&self, type_id: TypeId) -> usize {
        self.existing_group(type_id)
            .map_or(0, |group| group.lock().instances.len())
    }

    /// Returns `true` if the group holds no instances.
    #[must_use]
    pub fn is_empty(&self, type_id: TypeId) -> bool {
        self.len(type_id) == 0
    }
}
