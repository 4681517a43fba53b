//! Per-request transfer errors
//!
//! A failed transfer is not a scheduler failure: the error travels inside the
//! finished response and the request still counts as completed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric transfer error classification (curl-compatible values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    #[default]
    Ok,
    UnsupportedProtocol,
    UrlMalformed,
    CouldntConnect,
    OperationTimedOut,
    Aborted,
    TooManyRedirects,
    SendError,
    RecvError,
    BadContentEncoding,
    Unknown,
}

impl ErrorCode {
    /// Numeric code
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::UnsupportedProtocol => 1,
            ErrorCode::UrlMalformed => 3,
            ErrorCode::CouldntConnect => 7,
            ErrorCode::OperationTimedOut => 28,
            ErrorCode::Aborted => 42,
            ErrorCode::TooManyRedirects => 47,
            ErrorCode::SendError => 55,
            ErrorCode::RecvError => 56,
            ErrorCode::BadContentEncoding => 61,
            ErrorCode::Unknown => 99,
        }
    }

    /// Human-readable description of the code
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Ok => "No error",
            ErrorCode::UnsupportedProtocol => "Unsupported protocol",
            ErrorCode::UrlMalformed => "URL using bad/illegal format or missing URL",
            ErrorCode::CouldntConnect => "Couldn't connect to server",
            ErrorCode::OperationTimedOut => "Timeout was reached",
            ErrorCode::Aborted => "Operation was aborted",
            ErrorCode::TooManyRedirects => "Number of redirects hit maximum amount",
            ErrorCode::SendError => "Failed sending data to the peer",
            ErrorCode::RecvError => "Failure when receiving data from the peer",
            ErrorCode::BadContentEncoding => "Unrecognized or bad HTTP Content or Transfer-Encoding",
            ErrorCode::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error state of a finished transfer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferError {
    pub code: ErrorCode,
    pub message: String,
}

impl TransferError {
    /// The "no error" sentinel
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// True when the transfer succeeded
    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::Ok
    }

    /// Human-readable description of the code, absent on success
    pub fn description(&self) -> Option<&'static str> {
        if self.is_ok() {
            None
        } else {
            Some(self.code.description())
        }
    }

    /// Classify a reqwest error
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        // Connect timeouts report both is_timeout and is_connect; timeout wins
        let code = if err.is_timeout() {
            ErrorCode::OperationTimedOut
        } else if err.is_builder() {
            ErrorCode::UrlMalformed
        } else if err.is_connect() {
            ErrorCode::CouldntConnect
        } else if err.is_redirect() {
            ErrorCode::TooManyRedirects
        } else if err.is_decode() {
            ErrorCode::BadContentEncoding
        } else if err.is_body() {
            ErrorCode::RecvError
        } else if err.is_request() {
            ErrorCode::SendError
        } else {
            ErrorCode::Unknown
        };
        Self::new(code, error_chain(err))
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            write!(f, "ok")
        } else {
            write!(f, "error {}: {}", self.code, self.message)
        }
    }
}

/// Render an error and its sources on one line
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
