//! Bounded pool of reusable workers for one group.
//!
//! [`ResourcePool`] hands out idle workers when it has them and constructs new
//! ones through the group's [`WorkerFactory`] otherwise, never letting the
//! number of live instances (idle plus checked out) exceed the factory's
//! `max_instance_count`.

use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use super::{FactoryTable, Worker};
use crate::domain::{InstanceId, Name, TypeId};
use crate::error::{DispatchError, DispatchResult};

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Worker group served by the pool.
    pub group: TypeId,
    /// Workers ready for checkout.
    pub idle: usize,
    /// Live instances (idle plus checked out).
    pub allocated: usize,
    /// Instance ceiling reported by the factory (`0` if none is registered).
    pub max: usize,
    /// Total instances ever constructed.
    pub total_created: u64,
}

impl PoolStats {
    /// Workers currently checked out.
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.allocated.saturating_sub(self.idle)
    }
}

/// Per-group pool of workers.
///
/// # Concurrency
///
/// Checkout and checkin are short critical sections over the idle stack.
/// The live-instance count is reserved atomically before construction, so
/// concurrent misses cannot overshoot the ceiling.
#[derive(Debug)]
pub struct ResourcePool<W: Worker + ?Sized> {
    group: TypeId,
    factories: Arc<FactoryTable<W>>,
    idle: Mutex<Vec<Box<W>>>,
    allocated: AtomicUsize,
    next_instance: AtomicU64,
}

impl<W: Worker + ?Sized> ResourcePool<W> {
    /// Creates an empty pool for `group`; instances are built lazily.
    #[must_use]
    pub fn new(group: TypeId, factories: Arc<FactoryTable<W>>) -> Self {
        Self {
            group,
            factories,
            idle: Mutex::new(Vec::new()),
            allocated: AtomicUsize::new(0),
            next_instance: AtomicU64::new(0),
        }
    }

    /// Returns the worker group served by this pool.
    #[must_use]
    pub const fn group(&self) -> TypeId {
        self.group
    }

    /// Pops an idle worker without constructing one.
    pub fn try_checkout(&self) -> Option<Box<W>> {
        self.idle.lock().pop()
    }

    /// Returns a worker to the idle stack.
    ///
    /// The caller is expected to have passivated it. A worker that would
    /// leave more idle instances than live ones was not checked out of this
    /// pool; it is dropped and `false` is returned.
    pub fn checkin(&self, worker: Box<W>) -> bool {
        let mut idle = self.idle.lock();
        if idle.len() >= self.allocated.load(Ordering::Acquire) {
            drop(idle);
            tracing::warn!(group = %self.group, "surplus worker checked in; dropped");
            return false;
        }
        idle.push(worker);
        true
    }

    /// Checks out an idle worker or constructs a new one.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::MissingFactory`] if the group has no factory.
    /// - [`DispatchError::PoolExhausted`] if the instance ceiling is reached.
    /// - [`DispatchError::WorkerPanicked`] if the factory panics.
    /// - Any error returned by the factory's `make_instance`.
    ///
    /// A failed or panicking construction gives its reserved slot back.
    pub fn acquire(&self) -> DispatchResult<Box<W>> {
        if let Some(worker) = self.try_checkout() {
            return Ok(worker);
        }

        let factory = self
            .factories
            .get(self.group)
            .ok_or(DispatchError::MissingFactory(self.group))?;
        let max = factory.max_instance_count();

        let reserved = self
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            });
        let Ok(previous) = reserved else {
            tracing::warn!(group = %self.group, max, "worker pool exhausted");
            return Err(DispatchError::PoolExhausted {
                group: self.group,
                max,
            });
        };

        let instance = self.next_instance.fetch_add(1, Ordering::Relaxed) + 1;
        let name = Name::new(self.group, InstanceId::new(instance));
        let built = std::panic::catch_unwind(AssertUnwindSafe(|| factory.make_instance(&name)))
            .unwrap_or_else(|payload| Err(DispatchError::from_panic(&*payload)));
        match built {
            Ok(worker) => {
                tracing::debug!(
                    group = %self.group,
                    allocated = previous + 1,
                    max,
                    "worker constructed"
                );
                Ok(worker)
            }
            Err(err) => {
                self.allocated.fetch_sub(1, Ordering::AcqRel);
                tracing::warn!(group = %self.group, error = %err, "worker construction failed");
                Err(err)
            }
        }
    }

    /// Checks out a worker wrapped in a guard that returns it on release.
    ///
    /// # Errors
    ///
    /// Same as [`ResourcePool::acquire`].
    pub fn checkout(self: &Arc<Self>) -> DispatchResult<PooledWorker<W>> {
        let worker = self.acquire()?;
        Ok(PooledWorker {
            pool: Arc::clone(self),
            worker: Some(worker),
        })
    }

    /// Drops a worker permanently, freeing its slot under the ceiling.
    pub fn discard(&self, worker: Box<W>) {
        drop(worker);
        self.allocated.fetch_sub(1, Ordering::AcqRel);
        tracing::debug!(group = %self.group, "worker discarded");
    }

    /// Returns the current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            group: self.group,
            idle: self.idle.lock().len(),
            allocated: self.allocated.load(Ordering::Acquire),
            max: self
                .factories
                .get(self.group)
                .map_or(0, |f| f.max_instance_count()),
            total_created: self.next_instance.load(Ordering::Relaxed),
        }
    }
}

/// A checked-out worker.
///
/// Releasing the guard (explicitly or by drop, including during unwinding)
/// passivates the worker and checks it back into its pool.
#[derive(Debug)]
pub struct PooledWorker<W: Worker + ?Sized> {
    pool: Arc<ResourcePool<W>>,
    worker: Option<Box<W>>,
}

impl<W: Worker + ?Sized> PooledWorker<W> {
    /// Passivates the worker and returns it to the pool.
    pub fn release(mut self) {
        self.return_to_pool();
    }

    /// Removes the worker from circulation instead of returning it.
    pub fn discard(mut self) {
        if let Some(worker) = self.worker.take() {
            self.pool.discard(worker);
        }
    }

    fn return_to_pool(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.passivate();
            let _ = self.pool.checkin(worker);
        }
    }
}

impl<W: Worker + ?Sized> Deref for PooledWorker<W> {
    type Target = W;

    fn deref(&self) -> &W {
        // Only `release`/`discard`/drop take the worker, and they consume the guard.
        match self.worker.as_deref() {
            Some(worker) => worker,
            None => unreachable!("pooled worker accessed after release"),
        }
    }
}

impl<W: Worker + ?Sized> DerefMut for PooledWorker<W> {
    fn deref_mut(&mut self) -> &mut W {
        match self.worker.as_deref_mut() {
            Some(worker) => worker,
            None => unreachable!("pooled worker accessed after release"),
        }
    }
}

impl<W: Worker + ?Sized> Drop for PooledWorker<W> {
    fn drop(&mut self) {
        self.return_to_pool();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::domain::Message;
    use crate::pool::FnFactory;

    #[derive(Debug)]
    struct Lattice {
        scratch: Option<u64>,
        passivated: Arc<AtomicBool>,
    }

    impl Worker for Lattice {
        fn passivate(&mut self) {
            self.scratch = None;
            self.passivated.store(true, Ordering::SeqCst);
        }

        fn dispatch(&mut self, msg: &mut Message) -> DispatchResult<()> {
            self.scratch = Some(msg.correlation_id());
            Ok(())
        }
    }

    const GROUP: TypeId = TypeId::new(20);

    fn pool_with_max(max: usize) -> (Arc<ResourcePool<dyn Worker>>, Arc<AtomicBool>) {
        let passivated = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&passivated);
        let factories: Arc<FactoryTable<dyn Worker>> = Arc::new(FactoryTable::new());
        factories.register(
            GROUP,
            Arc::new(FnFactory::new(max, move |_: &Name| {
                let worker: Box<dyn Worker> = Box::new(Lattice {
                    scratch: None,
                    passivated: Arc::clone(&flag),
                });
                Ok(worker)
            })),
        );
        (Arc::new(ResourcePool::new(GROUP, factories)), passivated)
    }

    #[test]
    fn acquire_constructs_on_miss_and_reuses_on_hit() {
        let (pool, _) = pool_with_max(2);
        let Ok(worker) = pool.acquire() else {
            panic!("first acquire should construct");
        };
        assert_eq!(pool.stats().allocated, 1);
        assert!(pool.checkin(worker));
        assert_eq!(pool.stats().idle, 1);

        let Ok(_again) = pool.acquire() else {
            panic!("second acquire should reuse");
        };
        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.total_created, 1);
        assert_eq!(stats.outstanding(), 1);
    }

    #[test]
    fn exhausted_pool_returns_typed_error() {
        let (pool, _) = pool_with_max(1);
        let Ok(_held) = pool.acquire() else {
            panic!("first acquire should succeed");
        };
        let result = pool.acquire();
        let Err(DispatchError::PoolExhausted { group, max }) = result else {
            panic!("expected PoolExhausted");
        };
        assert_eq!(group, GROUP);
        assert_eq!(max, 1);
    }

    #[test]
    fn missing_factory_is_registration_error() {
        let pool: ResourcePool<dyn Worker> =
            ResourcePool::new(TypeId::new(99), Arc::new(FactoryTable::new()));
        assert!(matches!(
            pool.acquire(),
            Err(DispatchError::MissingFactory(_))
        ));
        assert_eq!(pool.stats().max, 0);
    }

    #[test]
    fn instances_are_named_by_allocation_counter() {
        let names = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&names);
        let factories: Arc<FactoryTable<dyn Worker>> = Arc::new(FactoryTable::new());
        factories.register(
            GROUP,
            Arc::new(FnFactory::new(3, move |name: &Name| {
                seen.lock().push(name.clone());
                let worker: Box<dyn Worker> = Box::new(Lattice {
                    scratch: None,
                    passivated: Arc::new(AtomicBool::new(false)),
                });
                Ok(worker)
            })),
        );
        let pool = Arc::new(ResourcePool::new(GROUP, factories));
        let Ok(a) = pool.checkout() else {
            panic!("checkout a");
        };
        let Ok(b) = pool.checkout() else {
            panic!("checkout b");
        };
        drop((a, b));

        let names = names.lock();
        let ids: Vec<u64> = names.iter().map(|n| n.instance_id.get()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(names.iter().all(|n| n.type_id == GROUP && !n.is_exemplar()));
        assert_eq!(pool.stats().total_created, 2);
    }

    #[test]
    fn guard_passivates_and_checks_in_on_release() {
        let (pool, passivated) = pool_with_max(1);
        let Ok(mut guard) = pool.checkout() else {
            panic!("checkout should succeed");
        };
        let mut msg = Message::new(TypeId::new(1), serde_json::Value::Null).with_internal_id(4);
        assert!(guard.dispatch(&mut msg).is_ok());
        assert_eq!(pool.stats().idle, 0);

        guard.release();
        assert!(passivated.load(Ordering::SeqCst));
        assert_eq!(pool.stats().idle, 1);
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn guard_returns_worker_when_dropped_during_panic() {
        let (pool, passivated) = pool_with_max(1);
        let pool_for_panic = Arc::clone(&pool);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let Ok(_guard) = pool_for_panic.checkout() else {
                return;
            };
            panic!("pricing blew up");
        }));
        assert!(outcome.is_err());
        assert!(passivated.load(Ordering::SeqCst));
        assert_eq!(pool.stats().idle, 1);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn discard_frees_capacity() {
        let (pool, _) = pool_with_max(1);
        let Ok(guard) = pool.checkout() else {
            panic!("checkout should succeed");
        };
        guard.discard();
        assert_eq!(pool.stats().allocated, 0);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn failed_construction_does_not_consume_capacity() {
        let factories: Arc<FactoryTable<dyn Worker>> = Arc::new(FactoryTable::new());
        factories.register(
            GROUP,
            Arc::new(FnFactory::new(1, |_: &Name| -> DispatchResult<Box<dyn Worker>> {
                Err(DispatchError::Persistence("curve store offline".to_string()))
            })),
        );
        let pool: ResourcePool<dyn Worker> = ResourcePool::new(GROUP, factories);
        assert!(matches!(pool.acquire(), Err(DispatchError::Persistence(_))));
        assert!(matches!(pool.acquire(), Err(DispatchError::Persistence(_))));
        assert_eq!(pool.stats().allocated, 0);
    }

    fn stray_worker() -> Box<dyn Worker> {
        Box::new(Lattice {
            scratch: None,
            passivated: Arc::new(AtomicBool::new(false)),
        })
    }

    #[test]
    fn foreign_checkins_cannot_grow_pool_past_ceiling() {
        let (pool, _) = pool_with_max(1);
        let Ok(worker) = pool.acquire() else {
            panic!("first acquire should construct");
        };
        assert!(pool.checkin(worker));

        assert!(!pool.checkin(stray_worker()));
        assert!(!pool.checkin(stray_worker()));

        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.allocated, 1);
        assert!(stats.idle + stats.outstanding() <= stats.max);
    }

    #[test]
    fn checkin_into_empty_pool_is_rejected() {
        let (pool, _) = pool_with_max(2);
        assert!(!pool.checkin(stray_worker()));
        assert_eq!(pool.stats().idle, 0);
    }

    #[test]
    fn panicking_factory_reports_error_and_frees_slot() {
        let panicked_once = Arc::new(AtomicBool::new(false));
        let first = Arc::clone(&panicked_once);
        let factories: Arc<FactoryTable<dyn Worker>> = Arc::new(FactoryTable::new());
        factories.register(
            GROUP,
            Arc::new(FnFactory::new(1, move |_: &Name| {
                if !first.swap(true, Ordering::SeqCst) {
                    panic!("calibration data corrupt");
                }
                let worker: Box<dyn Worker> = Box::new(Lattice {
                    scratch: None,
                    passivated: Arc::new(AtomicBool::new(false)),
                });
                Ok(worker)
            })),
        );
        let pool: ResourcePool<dyn Worker> = ResourcePool::new(GROUP, factories);

        let Err(DispatchError::WorkerPanicked(text)) = pool.acquire() else {
            panic!("expected WorkerPanicked");
        };
        assert!(text.contains("calibration data corrupt"));
        assert_eq!(pool.stats().allocated, 0);

        assert!(pool.acquire().is_ok());
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn concurrent_checkouts_never_exceed_ceiling() {
        let (pool, _) = pool_with_max(3);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if let Ok(guard) = pool.checkout() {
                            let stats = pool.stats();
                            assert!(stats.allocated <= 3);
                            drop(guard);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            let Ok(()) = handle.join() else {
                panic!("worker thread panicked");
            };
        }
        let stats = pool.stats();
        assert!(stats.allocated <= 3);
        assert_eq!(stats.idle, stats.allocated);
    }
}
