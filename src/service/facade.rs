//! Entry point used by the transport layer.
//!
//! [`Facade`] composes the authorization gate, the audit logger and the
//! router. A typical request goes `authorize` → `log_request` →
//! `handle_request`, the last of which routes the message and then waits for
//! its correlated response.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::Router;
use crate::domain::Message;
use crate::error::DispatchResult;
use crate::queue::ResponseCorrelator;
use crate::security::{AuditLogger, AuthorizationGate};

/// Composed authorize / audit / route entry point.
#[derive(Debug)]
pub struct Facade {
    router: Arc<Router>,
    auth: AuthorizationGate,
    audit: Arc<AuditLogger>,
    responses: Arc<ResponseCorrelator>,
    next_id: AtomicU64,
    response_timeout: Duration,
    audit_enabled: bool,
}

impl Facade {
    /// Creates a facade waiting on `responses` for at most `response_timeout`.
    #[must_use]
    pub fn new(
        router: Arc<Router>,
        auth: AuthorizationGate,
        audit: Arc<AuditLogger>,
        responses: Arc<ResponseCorrelator>,
        response_timeout: Duration,
        audit_enabled: bool,
    ) -> Self {
        Self {
            router,
            auth,
            audit,
            responses,
            next_id: AtomicU64::new(1),
            response_timeout,
            audit_enabled,
        }
    }

    /// Returns `true` if `token` may use the service.
    pub async fn authorize(&self, token: &str) -> bool {
        self.auth.authorize(token).await
    }

    /// Records an access for auditing. Never blocks the caller.
    pub fn log_request(&self, token: &str, timestamp: DateTime<Utc>, resource: &str) {
        if self.audit_enabled {
            self.audit.log(token, timestamp, resource);
        }
    }

    /// Routes `msg` without waiting and returns its correlation id.
    ///
    /// A message whose internal id is 0 is assigned the next id from a
    /// process-wide counter. Caller-chosen ids are kept as they are and must
    /// not collide with generated ones.
    ///
    /// # Errors
    ///
    /// Propagates routing failures from [`Router::route`].
    pub fn submit(&self, msg: Message) -> DispatchResult<u64> {
        let msg = if msg.correlation_id() == 0 {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            msg.with_internal_id(id)
        } else {
            msg
        };
        let correlation_id = msg.correlation_id();
        self.router.route(msg)?;
        Ok(correlation_id)
    }

    /// Waits for the response correlated with `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Timeout`](crate::error::DispatchError::Timeout)
    /// when the configured response timeout elapses first.
    pub async fn await_response(&self, correlation_id: u64) -> DispatchResult<Message> {
        self.responses
            .wait_and_pop(correlation_id, self.response_timeout)
            .await
    }

    /// Routes `msg` and waits for its response.
    ///
    /// Faults while serving the request are reported through the returned
    /// message's outcome, not as an `Err`.
    ///
    /// # Errors
    ///
    /// Routing failures and correlated-wait timeouts.
    pub async fn handle_request(&self, msg: Message) -> DispatchResult<Message> {
        let correlation_id = self.submit(msg)?;
        let response = self.await_response(correlation_id).await;
        if let Err(err) = &response {
            tracing::warn!(correlation_id, error = %err, "request abandoned");
        }
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::domain::{IdentityRegistry, Name, Object, Outcome, TypeId};
    use crate::error::DispatchError;
    use crate::persistence::{AuditSink, MemoryAuditSink, MemoryTokenStore, TokenStore};
    use crate::pool::{FactoryTable, FnFactory, Worker};
    use crate::service::{DeploymentMode, Dispatcher, ProcessorDirectory};

    const QUOTE: TypeId = TypeId::new(200);
    const QUOTER: TypeId = TypeId::new(20);

    #[derive(Debug)]
    struct Quoter;

    impl Worker for Quoter {
        fn passivate(&mut self) {}

        fn dispatch(&mut self, msg: &mut Message) -> DispatchResult<()> {
            msg.response = serde_json::json!({ "quoted": msg.correlation_id() });
            Ok(())
        }
    }

    struct Harness {
        facade: Facade,
        dispatcher: Arc<Dispatcher>,
        sink: Arc<MemoryAuditSink>,
        store: Arc<MemoryTokenStore>,
    }

    fn harness(timeout: Duration, audit_enabled: bool) -> Harness {
        let directory = Arc::new(ProcessorDirectory::new());
        directory.register(QUOTE, QUOTER);
        let factories: Arc<FactoryTable<dyn Worker>> = Arc::new(FactoryTable::new());
        factories.register(
            QUOTER,
            Arc::new(FnFactory::new(1, |_: &Name| {
                let worker: Box<dyn Worker> = Box::new(Quoter);
                Ok(worker)
            })),
        );
        let responses = Arc::new(ResponseCorrelator::new());
        let dispatcher = Arc::new(Dispatcher::new(directory, factories, Arc::clone(&responses)));

        let registry = Arc::new(IdentityRegistry::new());
        let _ = registry.register_if_absent(
            &Dispatcher::registry_name(),
            Arc::clone(&dispatcher) as Object,
        );
        let router = Arc::new(Router::new(registry, DeploymentMode::Standalone));

        let store = Arc::new(MemoryTokenStore::with_tokens(["desk-1"]));
        let sink = Arc::new(MemoryAuditSink::new());
        let facade = Facade::new(
            router,
            AuthorizationGate::new(Arc::clone(&store) as Arc<dyn TokenStore>),
            Arc::new(AuditLogger::new(Arc::clone(&sink) as Arc<dyn AuditSink>)),
            responses,
            timeout,
            audit_enabled,
        );
        Harness {
            facade,
            dispatcher,
            sink,
            store,
        }
    }

    #[tokio::test]
    async fn handle_request_round_trips_through_dispatcher() {
        let h = harness(Duration::from_secs(5), true);
        let cancel = CancellationToken::new();
        let _loop = h.dispatcher.spawn(cancel.clone());

        let Ok(reply) = h
            .facade
            .handle_request(Message::new(QUOTE, serde_json::json!({})))
            .await
        else {
            panic!("request should be answered");
        };
        assert_eq!(reply.outcome(), Outcome::Success);
        assert_eq!(reply.correlation_id(), 1);
        assert_eq!(reply.response.get("quoted"), Some(&serde_json::json!(1)));
        cancel.cancel();
    }

    #[tokio::test]
    async fn submit_allocates_increasing_ids_and_keeps_caller_ids() {
        let h = harness(Duration::from_secs(5), true);
        let first = h.facade.submit(Message::new(QUOTE, serde_json::Value::Null));
        let second = h.facade.submit(Message::new(QUOTE, serde_json::Value::Null));
        let explicit = h
            .facade
            .submit(Message::new(QUOTE, serde_json::Value::Null).with_internal_id(900));
        assert!(matches!(first, Ok(1)));
        assert!(matches!(second, Ok(2)));
        assert!(matches!(explicit, Ok(900)));
        assert_eq!(h.dispatcher.queued(), 3);
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let h = harness(Duration::from_millis(50), true);
        let result = h
            .facade
            .handle_request(Message::new(QUOTE, serde_json::Value::Null))
            .await;
        assert!(matches!(result, Err(DispatchError::Timeout { correlation_id: 1, .. })));
    }

    #[tokio::test]
    async fn authorize_delegates_to_gate() {
        let h = harness(Duration::from_secs(1), true);
        assert!(h.facade.authorize("desk-1").await);
        assert!(h.facade.authorize("desk-1").await);
        assert!(!h.facade.authorize("desk-2").await);
        assert_eq!(h.store.lookups(), 2);
    }

    #[tokio::test]
    async fn log_request_respects_audit_switch() {
        let enabled = harness(Duration::from_secs(1), true);
        enabled.facade.log_request("desk-1", Utc::now(), "quote");
        assert_eq!(enabled.facade.audit.pending(), 1);

        let disabled = harness(Duration::from_secs(1), false);
        disabled.facade.log_request("desk-1", Utc::now(), "quote");
        assert_eq!(disabled.facade.audit.pending(), 0);
        assert!(disabled.sink.is_empty());
    }
}
