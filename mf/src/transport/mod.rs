//! Transport multiplexer abstraction
//!
//! The scheduler never touches sockets. It hands admitted handles to a
//! [`Multiplexer`], asks it to make progress, blocks on it when nothing can
//! progress, and drains the handles it reports finished.

mod error;
mod handle;
mod http;
#[cfg(test)]
pub mod mock;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use error::{ErrorCode, TransferError};
pub use handle::HttpHandle;
pub use http::HttpMultiplexer;

/// Stable identity of a submitted request
///
/// Allocated by the scheduler at submission; never reused within one
/// scheduler, so two requests are never confused even when their payloads
/// compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of one `drive_once` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drive {
    /// Admitted handles that have not finished yet
    pub running: usize,

    /// More progress is possible right now without blocking
    pub call_again: bool,
}

/// A handle the multiplexer refused to admit
#[derive(Debug)]
pub struct Rejected<H> {
    pub handle: H,
    pub error: TransferError,
}

/// Transfer metrics of a finished handle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferInfo {
    /// Effective URL (after redirects)
    pub url: String,
    pub method: String,
    /// Response status, 0 when no response arrived
    pub status: u16,
    pub http_version: String,
    /// Bytes of header data at the start of the raw content
    pub header_size: usize,
    /// Declared Content-Length, if any
    pub content_length: Option<u64>,
    /// Body bytes received
    pub size_download: usize,
    /// Seconds until the response head arrived
    pub starttransfer_time: f64,
    /// Seconds for the whole transfer
    pub total_time: f64,
}

impl TransferInfo {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Flatten into a field name -> value mapping
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Everything a finished handle produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
    pub info: TransferInfo,
    /// Header block (when `info.header_size > 0`) followed by the body
    pub content: Vec<u8>,
}

/// Lower-level engine that runs admitted handles concurrently
#[async_trait]
pub trait Multiplexer: Send {
    /// Caller-built transport handle
    type Handle: Send + 'static;

    /// Start running a handle; hands it back with an error when it cannot run
    fn admit_handle(&mut self, id: HandleId, handle: Self::Handle) -> Result<(), Rejected<Self::Handle>>;

    /// Make whatever progress is possible without blocking
    fn drive_once(&mut self) -> Drive;

    /// Suspend until some admitted handle can make progress
    async fn block_until_ready(&mut self);

    /// Next handle that finished since the last call, non-blocking
    fn next_finished_handle(&mut self) -> Option<HandleId>;

    /// Take the buffered output of a finished handle
    fn raw_output_of(&mut self, id: HandleId) -> Option<RawOutput>;

    /// Error state of a finished handle
    fn error_of(&self, id: HandleId) -> Option<TransferError>;

    /// Remove a handle (finished or not) and give it back
    fn release_handle(&mut self, id: HandleId) -> Option<Self::Handle>;

    /// Free the transport resources of a released handle
    fn close_handle(&mut self, handle: Self::Handle) {
        drop(handle);
    }
}
