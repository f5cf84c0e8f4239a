//! Domain layer: identities, the message envelope, and the identity registry.
//!
//! This module contains the addressing scheme shared by every component
//! ([`Name`]), the request/response envelope ([`Message`]), and the
//! type-indexed [`IdentityRegistry`].

pub mod message;
pub mod name;
pub mod registry;

pub use message::{Message, Outcome, Sequence, SystemResponse};
pub use name::{AttrValue, InstanceId, Name, TypeId};
pub use registry::{IdentityRegistry, Object};
