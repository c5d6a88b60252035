// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential store over shared storage, with local and remote change events.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::credential::storage::Storage;
use crate::credential::{
    ChangeOrigin, Credential, CredentialEvent, CREDENTIAL_KEY, UPDATED_MARKER_KEY,
};

/// Holds the current bearer credential in persistent, shared storage.
///
/// Never caches the credential: every [`get`](Self::get) re-reads storage so
/// a value written by another instance is seen on the next request.
pub struct CredentialStore {
    storage: Arc<dyn Storage>,
    event_tx: broadcast::Sender<CredentialEvent>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn Storage>) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        Arc::new(Self { storage, event_tx })
    }

    /// Read the stored credential. Unreadable or corrupt values read as absent.
    pub fn get(&self) -> Option<Credential> {
        let raw = match self.storage.get(CREDENTIAL_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(err = %e, "failed to read stored credential");
                return None;
            }
        };
        parse_credential(&raw)
    }

    /// Write (or clear, with `None`) the stored credential and notify listeners.
    pub fn set(&self, credential: Option<&Credential>) -> anyhow::Result<()> {
        match credential {
            Some(credential) => {
                let json = serde_json::to_string(credential)?;
                self.storage.set(CREDENTIAL_KEY, &json)?;
                // Other instances must fire even if the value did not change.
                let stamp = uuid::Uuid::new_v4().to_string();
                self.storage.set(UPDATED_MARKER_KEY, &stamp)?;
                self.storage.remove(UPDATED_MARKER_KEY)?;
            }
            None => {
                self.storage.remove(CREDENTIAL_KEY)?;
            }
        }
        debug!(present = credential.is_some(), "credential stored");
        self.emit(CredentialEvent::Changed { origin: ChangeOrigin::Local });
        Ok(())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        self.set(None)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: CredentialEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Forward storage changes made by other instances as
    /// [`CredentialEvent::Changed`] with [`ChangeOrigin::Remote`].
    ///
    /// The task ends when the underlying storage is dropped.
    pub fn spawn_remote_listener(&self) -> tokio::task::JoinHandle<()> {
        let mut storage_rx = self.storage.subscribe();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            loop {
                let event = match storage_rx.recv().await {
                    Ok(e) => e,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Missed changes collapse into one re-validation.
                        debug!(skipped = n, "credential listener lagged");
                        let _ = event_tx.send(CredentialEvent::Changed { origin: ChangeOrigin::Remote });
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if event.key == CREDENTIAL_KEY || event.key == UPDATED_MARKER_KEY {
                    debug!(key = %event.key, "credential changed by another instance");
                    let _ = event_tx.send(CredentialEvent::Changed { origin: ChangeOrigin::Remote });
                }
            }
        })
    }
}

/// Parse a stored value: JSON credential, or a bare access token.
fn parse_credential(raw: &str) -> Option<Credential> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('{') {
        return Some(Credential::new(trimmed, None));
    }
    match serde_json::from_str::<Credential>(trimmed) {
        Ok(c) if !c.access_token.is_empty() => Some(c),
        Ok(_) => None,
        Err(e) => {
            warn!(err = %e, "stored credential is corrupt, ignoring");
            None
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
