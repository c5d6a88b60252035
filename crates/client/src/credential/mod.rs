// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential storage, cross-instance change propagation, and single-flight refresh.
//!
//! The stored credential is shared by every client instance of a profile.
//! Instances learn about each other's writes through storage change
//! notifications, which are treated as an at-least-once, unordered channel.

pub mod persist;
pub mod refresh;
pub mod storage;
pub mod store;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Storage key holding the serialized [`Credential`].
pub const CREDENTIAL_KEY: &str = "photovault.credential";

/// Transient key written then removed on every credential write, so that
/// other instances are notified even when the value is unchanged.
pub const UPDATED_MARKER_KEY: &str = "photovault.credential.updated";

/// Bearer credential issued by login or refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token }
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Where a credential change originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// Written by this instance.
    Local,
    /// Observed through storage, written by another instance.
    Remote,
}

/// Process-wide credential events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CredentialEvent {
    /// The stored credential changed. Listeners re-validate the session.
    Changed { origin: ChangeOrigin },
    /// A refresh produced a new credential.
    Refreshed,
    /// Refresh failed and the credential was cleared; the user must log in again.
    LoginRequired { reason: String },
}

/// Resolve the state directory for the persisted credential.
///
/// Checks `PV_STATE_DIR`, then `$XDG_STATE_HOME/photovault`,
/// then `$HOME/.local/state/photovault`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PV_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("photovault");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/photovault");
    }
    PathBuf::from(".photovault")
}
