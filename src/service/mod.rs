//! Service layer: request routing and dispatch.
//!
//! [`Facade`] is the entry point; [`Router`] picks the destination for the
//! current [`DeploymentMode`]; [`Dispatcher`] serves requests through pooled
//! workers using the [`ProcessorDirectory`] to find each request's group.

pub mod directory;
pub mod dispatcher;
pub mod facade;
pub mod router;

pub use directory::ProcessorDirectory;
pub use dispatcher::{DISPATCHER_INSTANCE, DISPATCHER_TYPE, Dispatcher};
pub use facade::Facade;
pub use router::{DeploymentMode, Router};
