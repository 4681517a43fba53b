//! multifetch - bounded-concurrency request scheduler
//!
//! Submit any number of requests; at most `max_concurrent` run at once, and
//! each [`Scheduler::pull`] hands back one finished response, in the order
//! the transport finishes them rather than the order they were submitted.
//!
//! # Modules
//!
//! - [`scheduler`] - pending queue, in-flight registry, completion queue, pull loop
//! - [`transport`] - multiplexer trait and the reqwest-backed implementation
//! - [`response`] - finished responses and header/body parsing
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface
//!
//! # Example
//!
//! ```ignore
//! use multifetch::{HttpHandle, HttpMultiplexer, Pull, Scheduler, SchedulerConfig};
//!
//! let mut scheduler = Scheduler::new(HttpMultiplexer::default(), SchedulerConfig::default());
//! scheduler.submit_with(HttpHandle::get("https://example.com/"), "home");
//! while let Pull::Ready(response) = scheduler.pull().await {
//!     println!("{:?} {}", response.user_data, response.status());
//! }
//! ```

pub mod cli;
pub mod config;
pub mod response;
pub mod scheduler;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, HttpConfig};
pub use response::{Header, Response};
pub use scheduler::{Descriptor, Pull, QueueState, Scheduler, SchedulerConfig, SchedulerError, SchedulerState};
pub use transport::{
    Drive, ErrorCode, HandleId, HttpHandle, HttpMultiplexer, Multiplexer, RawOutput, Rejected, TransferError,
    TransferInfo,
};
