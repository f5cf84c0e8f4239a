//! Worker pooling: capability contracts, factory table, and bounded pools.
//!
//! A [`ResourcePool`] is generic over the worker type it holds. The dispatcher
//! instantiates it with `dyn Worker`, one pool per worker group, with every
//! group's constructor registered in a shared [`FactoryTable`].

pub mod factory;
pub mod resource_pool;
pub mod worker;

pub use factory::{FactoryTable, SharedFactory};
pub use resource_pool::{PoolStats, PooledWorker, ResourcePool};
pub use worker::{FnFactory, Worker, WorkerFactory};
