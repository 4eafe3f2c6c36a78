use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failed collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    Timeout,
    RateLimited,
    Transport,
    Unavailable,
    /// The response arrived but could not be used.
    Malformed,
    /// The service refused the request outright.
    Rejected,
    /// An external process exited unsuccessfully or produced unusable output.
    ProcessFailed,
}

impl ServiceErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceErrorKind::Timeout => "timeout",
            ServiceErrorKind::RateLimited => "rate_limited",
            ServiceErrorKind::Transport => "transport",
            ServiceErrorKind::Unavailable => "unavailable",
            ServiceErrorKind::Malformed => "malformed",
            ServiceErrorKind::Rejected => "rejected",
            ServiceErrorKind::ProcessFailed => "process_failed",
        }
    }
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every collaborator trait.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ServiceErrorKind::Timeout,
            format!("no response after {}ms", after.as_millis()),
        )
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::RateLimited, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Transport, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Unavailable, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Malformed, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Rejected, message)
    }

    pub fn process_failed(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::ProcessFailed, message)
    }

    /// Everything except an outright rejection may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, ServiceErrorKind::Rejected)
    }
}
