// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::client::{ClientSettings, DEFAULT_REFRESH_PATH};
use crate::retry::{EndpointRule, RetryPolicy, DEFAULT_NO_RETRY_ENDPOINTS};

/// Configuration for the API client.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// API base URL.
    #[arg(long, default_value = "http://127.0.0.1:8000", env = "PV_API_URL")]
    pub api_url: String,

    /// Directory holding the persisted credential.
    #[arg(long, env = "PV_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Token refresh endpoint path.
    #[arg(long, default_value = DEFAULT_REFRESH_PATH, env = "PV_REFRESH_PATH")]
    pub refresh_path: String,

    /// Retries after the first attempt for transient failures.
    #[arg(long, default_value_t = 3, env = "PV_MAX_RETRIES")]
    pub max_retries: u32,

    /// Initial retry backoff in milliseconds.
    #[arg(long, default_value_t = 1000, env = "PV_RETRY_BASE_MS")]
    pub retry_base_ms: u64,

    /// Maximum retry backoff in milliseconds.
    #[arg(long, default_value_t = 30000, env = "PV_RETRY_MAX_MS")]
    pub retry_max_ms: u64,

    /// Endpoint whose server errors are never retried, as "METHOD /path".
    /// Repeatable. Replaces the defaults when given.
    #[arg(long = "no-retry-endpoint", value_name = "METHOD /PATH")]
    pub no_retry_endpoints: Vec<String>,

    /// How long a finished refresh is reused by late 401s, in milliseconds.
    #[arg(long, default_value_t = 2000, env = "PV_REFRESH_GRACE_MS")]
    pub refresh_grace_ms: u64,

    /// How long a deduplicated response is shared, in milliseconds.
    #[arg(long, default_value_t = 2000, env = "PV_DEDUP_TTL_MS")]
    pub dedup_ttl_ms: u64,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 30000, env = "PV_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Log format (json or text).
    #[arg(long, env = "PV_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "PV_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ClientConfig {
    pub fn retry_policy(&self) -> anyhow::Result<RetryPolicy> {
        let rules: Vec<&str> = if self.no_retry_endpoints.is_empty() {
            DEFAULT_NO_RETRY_ENDPOINTS.to_vec()
        } else {
            self.no_retry_endpoints.iter().map(String::as_str).collect()
        };
        let no_retry_on_server_error =
            rules.into_iter().map(str::parse::<EndpointRule>).collect::<anyhow::Result<_>>()?;

        Ok(RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
            no_retry_on_server_error,
        })
    }

    pub fn settings(&self) -> anyhow::Result<ClientSettings> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            anyhow::bail!("--api-url must be an http(s) URL, got {:?}", self.api_url);
        }
        if self.retry_base_ms > self.retry_max_ms {
            anyhow::bail!("--retry-base-ms must not exceed --retry-max-ms");
        }
        Ok(ClientSettings {
            base_url: self.api_url.clone(),
            refresh_path: self.refresh_path.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            retry: self.retry_policy()?,
            refresh_grace: Duration::from_millis(self.refresh_grace_ms),
            dedup_ttl: Duration::from_millis(self.dedup_ttl_ms),
        })
    }

    /// The configured state directory, or the resolved default.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(crate::credential::state_dir)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
