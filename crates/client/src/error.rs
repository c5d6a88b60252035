// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes surfaced to UI collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Upstream,
    Network,
    Decode,
    Cancelled,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Upstream => "UPSTREAM_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Decode => "DECODE_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a failed request, after refresh and retry handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// 4xx other than 401 (or an unexpected non-success status). Never retried.
    Client { status: u16, body: String },
    /// 401 that survived the refresh-and-replay path.
    Unauthorized { body: String },
    /// 5xx after the retry budget was spent (or on an exempt endpoint).
    Server { status: u16, body: String },
    /// Connect, timeout, or body read failure.
    Network(String),
    /// A successful response whose body did not decode.
    Decode(String),
    /// The request could not be built (bad path or base URL).
    InvalidRequest(String),
    /// Reading or writing the stored credential failed.
    Storage(String),
    /// The caller cancelled the request. Not reported as a failure.
    Cancelled,
}

impl ClientError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => Self::Unauthorized { body },
            500..=599 => Self::Server { status, body },
            _ => Self::Client { status, body },
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Client { .. } => ErrorCode::BadRequest,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::Server { .. } => ErrorCode::Upstream,
            Self::Network(_) => ErrorCode::Network,
            Self::Decode(_) => ErrorCode::Decode,
            Self::InvalidRequest(_) => ErrorCode::BadRequest,
            Self::Storage(_) => ErrorCode::Internal,
            Self::Cancelled => ErrorCode::Cancelled,
        }
    }

    /// HTTP status of the response that caused this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Network errors and 5xx are transient; everything else is terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client { status, body } => write!(f, "client error ({status}): {body}"),
            Self::Unauthorized { body } => write!(f, "unauthorized: {body}"),
            Self::Server { status, body } => write!(f, "server error ({status}): {body}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::Storage(msg) => write!(f, "credential storage error: {msg}"),
            Self::Cancelled => f.write_str("request cancelled"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
