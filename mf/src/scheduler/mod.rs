//! Scheduler for outbound requests
//!
//! Admits submitted requests to a transport multiplexer under a concurrency
//! cap and yields finished responses one pull at a time, in finish order.

mod config;
mod core;
mod error;
mod queue;
mod registry;

pub use config::SchedulerConfig;
pub use core::Scheduler;
pub use error::SchedulerError;
pub use queue::{
    CompletionQueue, Descriptor, PendingQueue, Pull, QueueState, SchedulerState, SchedulerStats,
};
pub use registry::{InFlight, InFlightRegistry};
