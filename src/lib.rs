//! # pricing-dispatch
//!
//! Request dispatch core for a derivatives-pricing service.
//!
//! Inbound compute requests are authorized, audited and routed to a single
//! in-process dispatcher. The dispatcher serves them in arrival order through
//! bounded pools of reusable workers and publishes every response, failed or
//! not, to a correlated response queue on which the caller waits.
//!
//! ## Architecture
//!
//! ```text
//! Transport layer (excluded)
//!     │
//!     ├── Facade (service/)          authorize · log_request · handle_request
//!     │     ├── AuthorizationGate (security/) ── TokenStore (persistence/)
//!     │     └── AuditLogger (security/) ─────── AuditSink (persistence/)
//!     │
//!     ├── Router (service/)          deployment mode → destination
//!     │     └── IdentityRegistry (domain/)
//!     │
//!     ├── Dispatcher (service/)      WorkQueue → ProcessorDirectory
//!     │     └── ResourcePool (pool/) ── FactoryTable · Worker
//!     │
//!     └── ResponseCorrelator (queue/)
//! ```
//!
//! [`context::DispatchContext`] wires all of it together once per process.

pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod pool;
pub mod queue;
pub mod security;
pub mod service;
pub mod telemetry;
