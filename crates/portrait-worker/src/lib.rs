//! Portrait Worker Library
//!
//! Derivative jobs run off the request path on a bounded worker pool.

pub mod queue;

pub use queue::{
    DerivativeJob, DerivativeQueue, DerivativeQueueConfig, DerivativeTicket, WorkerError,
};
