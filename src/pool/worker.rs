//! Capability contracts for pooled workers and the factories that build them.
//!
//! A pool only ever sees the narrow [`Worker`] interface; a [`WorkerFactory`]
//! is consulted solely when the pool has to construct a new instance.

use std::fmt;
use std::marker::PhantomData;

use crate::domain::{Message, Name};
use crate::error::DispatchResult;

/// A reusable, stateful request processor.
///
/// Lifecycle per use: `activate` → `dispatch` → `passivate`. The pool calls
/// `passivate` before an instance is made available again, so per-request
/// references must be cleared there.
pub trait Worker: Send + fmt::Debug {
    /// Request-scoped initialization for session-style workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker cannot serve `msg`.
    fn activate(&mut self, msg: &Message) -> DispatchResult<()> {
        let _ = msg;
        Ok(())
    }

    /// Clears any per-request state held by the worker.
    fn passivate(&mut self);

    /// Serves `msg`, writing the response into it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unsupported`](crate::error::DispatchError::Unsupported)
    /// for operations the worker does not implement, or another variant for a
    /// genuine fault.
    fn dispatch(&mut self, msg: &mut Message) -> DispatchResult<()>;
}

/// Constructor for one worker group.
pub trait WorkerFactory<W: ?Sized>: Send + Sync + fmt::Debug {
    /// Builds a fresh instance identified by `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if construction fails (e.g. a store lookup).
    fn make_instance(&self, name: &Name) -> DispatchResult<Box<W>>;

    /// Maximum number of instances that may ever be live for the group.
    fn max_instance_count(&self) -> usize;
}

/// [`WorkerFactory`] backed by a constructor closure.
pub struct FnFactory<W: ?Sized, F> {
    make: F,
    max_instances: usize,
    _worker: PhantomData<fn() -> Box<W>>,
}

impl<W, F> FnFactory<W, F>
where
    W: ?Sized,
    F: Fn(&Name) -> DispatchResult<Box<W>> + Send + Sync,
{
    /// Wraps `make`, allowing at most `max_instances` live instances.
    #[must_use]
    pub const fn new(max_instances: usize, make: F) -> Self {
        Self {
            make,
            max_instances,
            _worker: PhantomData,
        }
    }
}

impl<W: ?Sized, F> fmt::Debug for FnFactory<W, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFactory")
            .field("max_instances", &self.max_instances)
            .finish_non_exhaustive()
    }
}

impl<W, F> WorkerFactory<W> for FnFactory<W, F>
where
    W: ?Sized,
    F: Fn(&Name) -> DispatchResult<Box<W>> + Send + Sync,
{
    fn make_instance(&self, name: &Name) -> DispatchResult<Box<W>> {
        (self.make)(name)
    }

    fn max_instance_count(&self) -> usize {
        self.max_instances
    }
}
