// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state, re-validated whenever the credential changes.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth;
use crate::client::HttpClient;
use crate::credential::CredentialEvent;
use crate::error::ClientError;

/// What the UI knows about the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Not yet validated.
    Unknown,
    Anonymous,
    Authenticated { user: Value },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Publishes [`SessionState`] and keeps it current as credentials change,
/// including changes written by other instances.
pub struct SessionMonitor {
    client: HttpClient,
    state_tx: watch::Sender<SessionState>,
}

impl SessionMonitor {
    pub fn new(client: HttpClient) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Unknown);
        Arc::new(Self { client, state_tx })
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Check the stored credential against the API and publish the result.
    ///
    /// Network and server failures keep the previous state.
    pub async fn revalidate(&self) -> SessionState {
        let next = if self.client.store().get().is_none() {
            SessionState::Anonymous
        } else {
            match auth::me(&self.client).await {
                Ok(user) => SessionState::Authenticated { user },
                Err(ClientError::Unauthorized { .. }) => SessionState::Anonymous,
                Err(e) => {
                    warn!(err = %e, "session re-validation failed, keeping previous state");
                    return self.state();
                }
            }
        };

        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            info!(
                from = state_name(state),
                to = state_name(&next),
                "session state changed"
            );
            *state = next.clone();
            true
        });
        next
    }

    /// Validate once, then re-validate on every credential event until
    /// `shutdown` fires. Bursts of events collapse into one re-validation.
    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let mut events = self.client.subscribe();
        tokio::spawn(async move {
            this.revalidate().await;
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    e = events.recv() => e,
                };
                match event {
                    Ok(e) => debug!(?e, "credential event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "session monitor lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                drain(&mut events);
                this.revalidate().await;
            }
        })
    }
}

fn drain(events: &mut broadcast::Receiver<CredentialEvent>) {
    loop {
        match events.try_recv() {
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

fn state_name(state: &SessionState) -> &'static str {
    match state {
        SessionState::Unknown => "unknown",
        SessionState::Anonymous => "anonymous",
        SessionState::Authenticated { .. } => "authenticated",
    }
}
