//! Deployment-aware routing of inbound requests.
//!
//! In standalone and app-server deployments the router hands every request
//! to the well-known local [`Dispatcher`], found through the identity
//! registry. Load-balancer deployments would forward over a network
//! transport; that path is a hook only and reports `NotImplemented`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::Dispatcher;
use crate::domain::{IdentityRegistry, Message};
use crate::error::{DispatchError, DispatchResult};

/// Process deployment topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// Single process serving its own requests.
    #[default]
    Standalone,
    /// Application server behind a front end; still dispatches locally.
    AppServer,
    /// Front end distributing requests to remote app servers.
    LoadBalancer,
}

impl FromStr for DeploymentMode {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standalone" => Ok(Self::Standalone),
            "app_server" | "appserver" | "app-server" => Ok(Self::AppServer),
            "load_balancer" | "loadbalancer" | "load-balancer" => Ok(Self::LoadBalancer),
            other => Err(DispatchError::InvalidConfig(format!(
                "unknown deployment mode: {other}"
            ))),
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Standalone => "standalone",
            Self::AppServer => "app_server",
            Self::LoadBalancer => "load_balancer",
        };
        f.write_str(s)
    }
}

/// Forwards requests according to the current deployment mode.
#[derive(Debug)]
pub struct Router {
    registry: Arc<IdentityRegistry>,
    mode: RwLock<DeploymentMode>,
}

impl Router {
    /// Creates a router resolving the dispatcher through `registry`.
    #[must_use]
    pub fn new(registry: Arc<IdentityRegistry>, mode: DeploymentMode) -> Self {
        Self {
            registry,
            mode: RwLock::new(mode),
        }
    }

    /// Returns the current deployment mode.
    #[must_use]
    pub fn mode(&self) -> DeploymentMode {
        *self.mode.read()
    }

    /// Switches the deployment mode.
    pub fn set_mode(&self, mode: DeploymentMode) {
        tracing::info!(%mode, "deployment mode changed");
        *self.mode.write() = mode;
    }

    /// Hands `msg` to its destination.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotImplemented`] in load-balancer mode.
    /// - [`DispatchError::DispatcherNotRegistered`] if no local dispatcher
    ///   is bound under its well-known name.
    pub fn route(&self, msg: Message) -> DispatchResult<()> {
        match self.mode() {
            DeploymentMode::Standalone | DeploymentMode::AppServer => {
                let dispatcher = self
                    .registry
                    .find_as::<Dispatcher>(&Dispatcher::registry_name())
                    .ok_or(DispatchError::DispatcherNotRegistered)?;
                dispatcher.handle(msg);
                Ok(())
            }
            DeploymentMode::LoadBalancer => {
                tracing::error!(
                    correlation_id = msg.correlation_id(),
                    "remote routing requested in load-balancer mode"
                );
                Err(DispatchError::NotImplemented("load-balancer routing"))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Object, TypeId};
    use crate::pool::FactoryTable;
    use crate::queue::ResponseCorrelator;
    use crate::service::ProcessorDirectory;

    fn registry_with_dispatcher() -> (Arc<IdentityRegistry>, Arc<Dispatcher>) {
        let registry = Arc::new(IdentityRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(ProcessorDirectory::new()),
            Arc::new(FactoryTable::new()),
            Arc::new(ResponseCorrelator::new()),
        ));
        let obj: Object = Arc::clone(&dispatcher) as Object;
        let _ = registry.register_if_absent(&Dispatcher::registry_name(), obj);
        (registry, dispatcher)
    }

    #[test]
    fn parses_deployment_modes() {
        assert_eq!("standalone".parse::<DeploymentMode>().ok(), Some(DeploymentMode::Standalone));
        assert_eq!("APP_SERVER".parse::<DeploymentMode>().ok(), Some(DeploymentMode::AppServer));
        assert_eq!(
            "load-balancer".parse::<DeploymentMode>().ok(),
            Some(DeploymentMode::LoadBalancer)
        );
        assert!("cluster".parse::<DeploymentMode>().is_err());
    }

    #[test]
    fn standalone_routes_to_local_dispatcher() {
        let (registry, dispatcher) = registry_with_dispatcher();
        let router = Router::new(registry, DeploymentMode::Standalone);
        assert!(router.route(Message::new(TypeId::new(1), serde_json::Value::Null)).is_ok());
        assert_eq!(dispatcher.queued(), 1);
    }

    #[test]
    fn app_server_routes_locally_too() {
        let (registry, dispatcher) = registry_with_dispatcher();
        let router = Router::new(registry, DeploymentMode::AppServer);
        assert!(router.route(Message::new(TypeId::new(1), serde_json::Value::Null)).is_ok());
        assert_eq!(dispatcher.queued(), 1);
    }

    #[test]
    fn load_balancer_mode_is_not_implemented() {
        let (registry, dispatcher) = registry_with_dispatcher();
        let router = Router::new(registry, DeploymentMode::Standalone);
        router.set_mode(DeploymentMode::LoadBalancer);
        let result = router.route(Message::new(TypeId::new(1), serde_json::Value::Null));
        assert!(matches!(result, Err(DispatchError::NotImplemented(_))));
        assert_eq!(dispatcher.queued(), 0);
    }

    #[test]
    fn missing_dispatcher_is_reported() {
        let router = Router::new(Arc::new(IdentityRegistry::new()), DeploymentMode::Standalone);
        let result = router.route(Message::new(TypeId::new(1), serde_json::Value::Null));
        assert!(matches!(result, Err(DispatchError::DispatcherNotRegistered)));
    }
}
