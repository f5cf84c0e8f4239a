//! Process-scoped composition root.
//!
//! [`DispatchContext`] is built once at startup and owns every shared
//! component: the identity registry, the processor directory, the factory
//! table, the dispatcher and the facade. It also owns the cancellation token
//! threaded into the two background loops.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DispatchConfig;
use crate::domain::{IdentityRegistry, Object, TypeId};
use crate::error::{DispatchError, DispatchResult};
use crate::persistence::{
    AuditSink, MemoryAuditSink, MemoryTokenStore, PostgresPersistence, TokenStore,
};
use crate::pool::{FactoryTable, SharedFactory, Worker};
use crate::queue::ResponseCorrelator;
use crate::security::{AuditLogger, AuthorizationGate};
use crate::service::{Dispatcher, Facade, ProcessorDirectory, Router};

/// Builder for [`DispatchContext`].
///
/// Collaborators not supplied explicitly come from PostgreSQL when
/// persistence is enabled, and from in-memory stores otherwise.
#[derive(Debug)]
pub struct DispatchContextBuilder {
    config: DispatchConfig,
    token_store: Option<Arc<dyn TokenStore>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

impl DispatchContextBuilder {
    /// Uses `store` as the token allow-list.
    #[must_use]
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Uses `sink` as the audit store.
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Wires every component together.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Persistence`] if PostgreSQL is needed and
    /// unreachable.
    pub async fn build(self) -> DispatchResult<DispatchContext> {
        let (token_store, audit_sink) = match (self.token_store, self.audit_sink) {
            (Some(store), Some(sink)) => (store, sink),
            (store, sink) if self.config.persistence_enabled => {
                let pg = Arc::new(PostgresPersistence::connect(&self.config).await?);
                let store = match store {
                    Some(store) => store,
                    None => Arc::clone(&pg) as Arc<dyn TokenStore>,
                };
                let sink = match sink {
                    Some(sink) => sink,
                    None => pg as Arc<dyn AuditSink>,
                };
                (store, sink)
            }
            (store, sink) => {
                let store = match store {
                    Some(store) => store,
                    None => {
                        tracing::warn!("persistence disabled; token allow-list starts empty");
                        Arc::new(MemoryTokenStore::default()) as Arc<dyn TokenStore>
                    }
                };
                let sink = match sink {
                    Some(sink) => sink,
                    None => Arc::new(MemoryAuditSink::new()) as Arc<dyn AuditSink>,
                };
                (store, sink)
            }
        };
        DispatchContext::assemble(self.config, token_store, audit_sink)
    }
}

/// Shared state of one dispatch process.
#[derive(Debug)]
pub struct DispatchContext {
    config: DispatchConfig,
    registry: Arc<IdentityRegistry>,
    directory: Arc<ProcessorDirectory>,
    factories: Arc<FactoryTable<dyn Worker>>,
    dispatcher: Arc<Dispatcher>,
    audit: Arc<AuditLogger>,
    facade: Arc<Facade>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchContext {
    /// Starts building a context from `config`.
    #[must_use]
    pub fn builder(config: DispatchConfig) -> DispatchContextBuilder {
        DispatchContextBuilder {
            config,
            token_store: None,
            audit_sink: None,
        }
    }

    fn assemble(
        config: DispatchConfig,
        token_store: Arc<dyn TokenStore>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> DispatchResult<Self> {
        let registry = Arc::new(IdentityRegistry::new());
        let directory = Arc::new(ProcessorDirectory::new());
        let factories: Arc<FactoryTable<dyn Worker>> = Arc::new(FactoryTable::new());
        let responses = Arc::new(ResponseCorrelator::new());

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&directory),
            Arc::clone(&factories),
            Arc::clone(&responses),
        ));
        let bound = registry.register_if_absent(
            &Dispatcher::registry_name(),
            Arc::clone(&dispatcher) as Object,
        );
        if bound.downcast::<Dispatcher>().is_err() {
            return Err(DispatchError::Internal(
                "dispatcher name bound to a foreign object".to_string(),
            ));
        }

        let router = Arc::new(Router::new(Arc::clone(&registry), config.deployment_mode));
        let audit = Arc::new(AuditLogger::new(audit_sink));
        let facade = Arc::new(Facade::new(
            router,
            AuthorizationGate::new(token_store),
            Arc::clone(&audit),
            responses,
            config.response_timeout,
            config.audit_enabled,
        ));

        tracing::info!(
            mode = %config.deployment_mode,
            persistence = config.persistence_enabled,
            audit = config.audit_enabled,
            "dispatch context assembled"
        );

        Ok(Self {
            config,
            registry,
            directory,
            factories,
            dispatcher,
            audit,
            facade,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Registers the worker group serving `request_type`.
    ///
    /// The factory is keyed by `group`, so several request types can share
    /// one pool by naming the same group.
    pub fn register_processor(
        &self,
        request_type: TypeId,
        group: TypeId,
        factory: SharedFactory<dyn Worker>,
    ) {
        self.directory.register(request_type, group);
        self.factories.register(group, factory);
    }

    /// Spawns the dispatcher and audit loops. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            tracing::warn!("dispatch context already started");
            return;
        }
        tasks.push(self.dispatcher.spawn(self.cancel.child_token()));
        tasks.push(self.audit.spawn(self.cancel.child_token()));
        tracing::info!("dispatch context started");
    }

    /// Stops both loops and waits for them to finish.
    ///
    /// Queued audit records are flushed. Requests still queued for dispatch,
    /// and any submitted afterwards, are answered with a `SystemError`
    /// response.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "background task ended abnormally");
            }
        }
        tracing::info!("dispatch context stopped");
    }

    /// Returns the configuration the context was built from.
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Returns the identity registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    /// Returns the processor directory.
    #[must_use]
    pub const fn directory(&self) -> &Arc<ProcessorDirectory> {
        &self.directory
    }

    /// Returns the worker factory table.
    #[must_use]
    pub const fn factories(&self) -> &Arc<FactoryTable<dyn Worker>> {
        &self.factories
    }

    /// Returns the local dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns the entry point used by the transport layer.
    #[must_use]
    pub const fn facade(&self) -> &Arc<Facade> {
        &self.facade
    }

    /// Returns the audit logger.
    #[must_use]
    pub const fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    async fn context() -> DispatchContext {
        let Ok(ctx) = DispatchContext::builder(DispatchConfig::in_memory())
            .build()
            .await
        else {
            panic!("in-memory context should build");
        };
        ctx
    }

    #[tokio::test]
    async fn dispatcher_is_registered_under_well_known_name() {
        let ctx = context().await;
        let Some(found) = ctx.registry().find_as::<Dispatcher>(&Dispatcher::registry_name()) else {
            panic!("dispatcher should be registered");
        };
        assert!(Arc::ptr_eq(&found, ctx.dispatcher()));
    }

    #[tokio::test]
    async fn register_processor_fills_directory_and_factories() {
        use crate::domain::Name;
        use crate::pool::FnFactory;

        #[derive(Debug)]
        struct Idle;
        impl Worker for Idle {
            fn passivate(&mut self) {}
            fn dispatch(&mut self, _msg: &mut crate::domain::Message) -> DispatchResult<()> {
                Ok(())
            }
        }

        let ctx = context().await;
        ctx.register_processor(
            TypeId::new(300),
            TypeId::new(30),
            Arc::new(FnFactory::new(2, |_: &Name| {
                let worker: Box<dyn Worker> = Box::new(Idle);
                Ok(worker)
            })),
        );
        assert_eq!(ctx.directory().resolve(TypeId::new(300)), Some(TypeId::new(30)));
        assert!(ctx.factories().contains(TypeId::new(30)));
    }

    #[tokio::test]
    async fn start_twice_then_shutdown() {
        let ctx = context().await;
        ctx.start();
        ctx.start();
        assert_eq!(ctx.tasks.lock().len(), 2);
        ctx.shutdown().await;
        assert!(ctx.tasks.lock().is_empty());
    }
}
