//! Dispatcher: drains inbound requests through pooled workers.
//!
//! Every message follows the same path: dequeue → resolve worker group →
//! check out a worker → `activate` + `dispatch` → passivate and check in →
//! publish to the [`ResponseCorrelator`]. Failures at any step are recorded
//! on the message itself, so the response is always published and the
//! waiting caller never times out because of a fault.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{InstanceId, Message, Name, Outcome, TypeId};
use crate::error::{DispatchError, DispatchResult};
use crate::pool::{FactoryTable, PoolStats, ResourcePool, Worker};
use crate::queue::{ResponseCorrelator, WorkQueue};
use crate::service::ProcessorDirectory;

/// Type group of the dispatcher in the identity registry.
pub const DISPATCHER_TYPE: TypeId = TypeId::new(1);

/// Well-known instance id of the process-local dispatcher.
pub const DISPATCHER_INSTANCE: InstanceId = InstanceId::new(1);

/// Owns the inbound queue and one resource pool per worker group.
///
/// A single loop task serves messages strictly in arrival order; the
/// response correlator relies on that order.
#[derive(Debug)]
pub struct Dispatcher {
    inbound: WorkQueue<Message>,
    responses: Arc<ResponseCorrelator>,
    directory: Arc<ProcessorDirectory>,
    factories: Arc<FactoryTable<dyn Worker>>,
    pools: Mutex<HashMap<TypeId, Arc<ResourcePool<dyn Worker>>>>,
    stopped: AtomicBool,
}

impl Dispatcher {
    /// Creates a dispatcher publishing to `responses`.
    #[must_use]
    pub fn new(
        directory: Arc<ProcessorDirectory>,
        factories: Arc<FactoryTable<dyn Worker>>,
        responses: Arc<ResponseCorrelator>,
    ) -> Self {
        Self {
            inbound: WorkQueue::new(),
            responses,
            directory,
            factories,
            pools: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Registry name of the well-known dispatcher.
    #[must_use]
    pub fn registry_name() -> Name {
        Name::new(DISPATCHER_TYPE, DISPATCHER_INSTANCE)
    }

    /// Enqueues `msg` for service. Never blocks.
    ///
    /// Once the loop has stopped, `msg` is answered at once with a
    /// `SystemError` response.
    pub fn handle(&self, msg: Message) {
        tracing::trace!(
            type_id = %msg.type_id,
            correlation_id = msg.correlation_id(),
            "request queued"
        );
        self.inbound.push(msg);
        // Re-checked after the push so a request racing the final drain is
        // still answered.
        if self.stopped.load(Ordering::SeqCst) {
            let _ = self.drain_cancelled();
        }
    }

    /// Returns `true` once the dispatch loop has stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Returns the number of requests waiting for service.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inbound.len()
    }

    /// Returns the correlator this dispatcher publishes to.
    #[must_use]
    pub fn responses(&self) -> &Arc<ResponseCorrelator> {
        &self.responses
    }

    /// Returns statistics for the pool serving `group`, if it exists yet.
    #[must_use]
    pub fn pool_stats(&self, group: TypeId) -> Option<PoolStats> {
        self.pools.lock().get(&group).map(|pool| pool.stats())
    }

    fn pool_for(&self, group: TypeId) -> Arc<ResourcePool<dyn Worker>> {
        let mut pools = self.pools.lock();
        let pool = pools
            .entry(group)
            .or_insert_with(|| Arc::new(ResourcePool::new(group, Arc::clone(&self.factories))));
        Arc::clone(pool)
    }

    /// Spawns the dispatch loop on the current runtime.
    #[must_use]
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.run(cancel).await })
    }

    /// Runs the dispatch loop until `cancel` fires.
    ///
    /// Requests still queued at cancellation are answered with a
    /// `SystemError` response so their callers are released.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("dispatcher starting");
        loop {
            let msg = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                msg = self.inbound.wait_and_pop() => msg,
            };
            let served = self.serve(msg).await;
            self.responses.push(served);
        }
        self.stopped.store(true, Ordering::SeqCst);
        let cancelled = self.drain_cancelled();
        tracing::info!(cancelled, "dispatcher stopped");
    }

    /// Serves one message, recording any failure on it.
    async fn serve(&self, mut msg: Message) -> Message {
        let type_id = msg.type_id;
        let correlation_id = msg.correlation_id();

        let Some(group) = self.directory.resolve(type_id) else {
            let err = DispatchError::UnknownRequestType(type_id);
            tracing::warn!(%type_id, correlation_id, error = %err, "unroutable request");
            msg.fail(err.outcome(), err.to_string());
            return msg;
        };

        let pool = self.pool_for(group);
        let sequence = msg.sequence.clone();
        // Construction may hit a store, so checkout runs off the runtime
        // threads together with the dispatch.
        let joined = tokio::task::spawn_blocking(move || {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| -> DispatchResult<()> {
                let mut worker = pool.checkout()?;
                worker.activate(&msg)?;
                let served = worker.dispatch(&mut msg);
                worker.release();
                served
            }));
            (msg, result)
        })
        .await;

        match joined {
            Ok((msg, Ok(Ok(())))) => {
                tracing::debug!(%type_id, %group, correlation_id, "request served");
                msg
            }
            Ok((mut msg, Ok(Err(err)))) => {
                tracing::warn!(%type_id, %group, correlation_id, error = %err, "request failed");
                msg.fail(err.outcome(), err.to_string());
                msg
            }
            Ok((mut msg, Err(payload))) => {
                let err = DispatchError::from_panic(&*payload);
                tracing::error!(%type_id, %group, correlation_id, error = %err, "worker panicked");
                msg.fail(err.outcome(), err.to_string());
                msg
            }
            Err(join_err) => {
                // The request payload went down with the task; answer with
                // the envelope only so the caller is still released.
                tracing::error!(%type_id, %group, correlation_id, error = %join_err, "worker task lost");
                let mut msg = Message::new(type_id, serde_json::Value::Null);
                msg.set_sequence(sequence);
                msg.fail(Outcome::SystemError, join_err.to_string());
                msg
            }
        }
    }

    /// Answers every queued request with [`DispatchError::Cancelled`].
    fn drain_cancelled(&self) -> usize {
        let mut drained = 0_usize;
        while let Some(mut msg) = self.inbound.try_pop() {
            let err = DispatchError::Cancelled(msg.correlation_id());
            msg.fail(err.outcome(), err.to_string());
            self.responses.push(msg);
            drained += 1;
        }
        drained
    }
}
