// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight credential refresh.
//!
//! State machine: `Idle -> Refreshing -> Settled -> Idle`.
//!
//! The first caller to hit an expired credential starts one refresh task and
//! every concurrent caller waits on it. Waiters are registered and flushed
//! under the same lock, so none can miss the wakeup. After resolution the
//! outcome stays visible for a grace window, so 401s that were already in
//! flight reuse it instead of starting a second refresh.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::credential::store::CredentialStore;
use crate::credential::{Credential, CredentialEvent};

/// Default window during which a finished refresh is reused.
pub const DEFAULT_REFRESH_GRACE: Duration = Duration::from_secs(2);

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<oneshot::Sender<Option<Credential>>> },
    Settled { outcome: Option<Credential>, until: Instant },
}

/// Observable phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
    Settled,
}

/// Ensures at most one refresh call is in flight per client instance.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    state: Mutex<RefreshState>,
    grace: Duration,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<CredentialStore>, grace: Duration) -> Arc<Self> {
        Arc::new(Self { store, state: Mutex::new(RefreshState::Idle), grace })
    }

    pub fn phase(&self) -> RefreshPhase {
        let mut state = self.state.lock();
        expire_settled(&mut state);
        match *state {
            RefreshState::Idle => RefreshPhase::Idle,
            RefreshState::Refreshing { .. } => RefreshPhase::Refreshing,
            RefreshState::Settled { .. } => RefreshPhase::Settled,
        }
    }

    /// Obtain a fresh credential after an authentication-expired response.
    ///
    /// `stale` is the credential the failed request was sent with. `refresh`
    /// is only invoked when this caller starts the refresh; it receives the
    /// currently stored credential. Returns `None` if the refresh failed.
    pub async fn await_refresh<F, Fut>(
        self: &Arc<Self>,
        stale: Option<&Credential>,
        refresh: F,
    ) -> Option<Credential>
    where
        F: FnOnce(Option<Credential>) -> Fut,
        Fut: Future<Output = anyhow::Result<Credential>> + Send + 'static,
    {
        let current = self.store.get();

        let (rx, lead) = {
            let mut state = self.state.lock();
            expire_settled(&mut state);
            match &mut *state {
                RefreshState::Settled { outcome, .. } => {
                    return settled_result(outcome, current, stale);
                }
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    (rx, false)
                }
                RefreshState::Idle => {
                    // Another instance (or a login) already replaced the credential.
                    if current.is_some() && current.as_ref() != stale {
                        debug!("stored credential already rotated, skipping refresh");
                        return current;
                    }
                    let (tx, rx) = oneshot::channel();
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    (rx, true)
                }
            }
        };

        if lead {
            info!("credential expired, refreshing");
            // Detached, so cancelling this caller does not abort the refresh
            // for everyone else waiting on it.
            let task = tokio::spawn(refresh(current));
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let result = match task.await {
                    Ok(r) => r,
                    Err(e) => Err(anyhow::anyhow!("refresh task failed: {e}")),
                };
                this.finish(result);
            });
        }

        rx.await.unwrap_or(None)
    }

    fn finish(&self, result: anyhow::Result<Credential>) {
        let outcome = match result {
            Ok(credential) => {
                if let Err(e) = self.store.set(Some(&credential)) {
                    warn!(err = %e, "failed to store refreshed credential");
                }
                info!("credential refreshed");
                self.store.emit(CredentialEvent::Refreshed);
                Some(credential)
            }
            Err(e) => {
                warn!(err = %e, "credential refresh failed, login required");
                if let Err(e) = self.store.clear() {
                    warn!(err = %e, "failed to clear credential after refresh failure");
                }
                self.store.emit(CredentialEvent::LoginRequired { reason: e.to_string() });
                None
            }
        };

        let waiters = {
            let mut state = self.state.lock();
            let prev = std::mem::replace(
                &mut *state,
                RefreshState::Settled {
                    outcome: outcome.clone(),
                    until: Instant::now() + self.grace,
                },
            );
            match prev {
                RefreshState::Refreshing { waiters } => waiters,
                _ => Vec::new(),
            }
        };

        debug!(waiters = waiters.len(), "flushing refresh waiters");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// The settled outcome holds only while it is still the stored credential.
/// A login or logout since then wins, unless the store holds the very
/// credential the request already failed with.
fn settled_result(
    outcome: &Option<Credential>,
    current: Option<Credential>,
    stale: Option<&Credential>,
) -> Option<Credential> {
    if current == *outcome {
        debug!("reusing just-finished refresh");
        return current;
    }
    match current {
        Some(c) if Some(&c) != stale => {
            debug!("credential replaced since refresh settled");
            Some(c)
        }
        _ => None,
    }
}

fn expire_settled(state: &mut RefreshState) {
    if let RefreshState::Settled { until, .. } = state {
        if Instant::now() >= *until {
            *state = RefreshState::Idle;
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
