// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry policy: exponential backoff for transient failures.

use std::time::Duration;

use crate::error::ClientError;
use crate::request::{normalize_path, ApiRequest, Method};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Initial backoff duration.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Maximum backoff duration.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Client delivery link creation: a 5xx there indicates a data problem on
/// the server, and repeating the write could duplicate the link.
pub const DEFAULT_NO_RETRY_ENDPOINTS: &[&str] = &["POST /api/sharing/client/create/"];

/// An endpoint identified by method and path, parsed from `"METHOD /path"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRule {
    pub method: Method,
    pub path: String,
}

impl EndpointRule {
    pub fn matches(&self, req: &ApiRequest) -> bool {
        self.method == req.method && self.path == normalize_path(&req.path)
    }
}

impl std::str::FromStr for EndpointRule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (method, path) = s
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| anyhow::anyhow!("expected \"METHOD /path\", got {s:?}"))?;
        let path = path.trim();
        if path.is_empty() {
            anyhow::bail!("missing path in endpoint rule {s:?}");
        }
        Ok(Self { method: method.parse()?, path: normalize_path(path) })
    }
}

impl std::fmt::Display for EndpointRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Outcome of consulting the policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

/// Decides, per failure, whether a request is retried and after what delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Endpoints whose 5xx responses are surfaced immediately.
    pub no_retry_on_server_error: Vec<EndpointRule>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            no_retry_on_server_error: DEFAULT_NO_RETRY_ENDPOINTS
                .iter()
                .filter_map(|rule| rule.parse().ok())
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Backoff before retry number `attempt + 1`: `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.checked_mul(factor).unwrap_or(self.max_delay).min(self.max_delay)
    }

    pub fn is_exempt(&self, req: &ApiRequest) -> bool {
        self.no_retry_on_server_error.iter().any(|rule| rule.matches(req))
    }

    /// `attempt` counts retries already made for this request; `replayed`
    /// marks the one replay that follows a credential refresh.
    pub fn decide(
        &self,
        req: &ApiRequest,
        err: &ClientError,
        attempt: u32,
        replayed: bool,
    ) -> RetryDecision {
        if replayed || !err.is_transient() {
            return RetryDecision::GiveUp;
        }
        if matches!(err, ClientError::Server { .. }) && self.is_exempt(req) {
            return RetryDecision::GiveUp;
        }
        if attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry { delay: self.delay_for(attempt) }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
