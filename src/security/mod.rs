//! Access control and request auditing.

pub mod audit;
pub mod auth;

pub use audit::AuditLogger;
pub use auth::AuthorizationGate;
