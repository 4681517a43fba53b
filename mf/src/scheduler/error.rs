//! Scheduler error types

use thiserror::Error;

use crate::transport::HandleId;

/// Bookkeeping failures inside the scheduler
///
/// Per-request transfer failures are not errors here; they travel inside the
/// response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Finished handle {0} has no in-flight descriptor")]
    UnknownHandle(HandleId),

    #[error("Handle {0} is already in flight")]
    DuplicateHandle(HandleId),
}
