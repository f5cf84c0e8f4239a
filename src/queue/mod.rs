//! Queue disciplines: plain FIFO and correlation-aware response queue.

pub mod correlator;
pub mod work_queue;

pub use correlator::ResponseCorrelator;
pub use work_queue::WorkQueue;
