// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PhotoVault API client: bearer credentials shared across instances,
//! single-flight token refresh, retries with backoff, and deduplication of
//! anonymous reads.

pub mod auth;
pub mod client;
pub mod command;
pub mod config;
pub mod credential;
pub mod dedup;
pub mod error;
pub mod request;
pub mod retry;
pub mod session;
pub mod test_support;

use std::sync::OnceLock;

use tracing::debug;

pub use client::{ClientSettings, HttpClient};
pub use error::{ClientError, ErrorCode};
pub use request::{ApiRequest, ApiResponse, Method};

/// Install the rustls crypto provider used by reqwest. Idempotent.
pub fn ensure_crypto() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}
