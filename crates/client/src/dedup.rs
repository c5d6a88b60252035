// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request deduplication for anonymous, cacheable reads.
//!
//! Concurrent callers with the same [`RequestSignature`] share one in-flight
//! request. The entry is kept for a TTL after it resolves, so a burst of
//! near-simultaneous duplicates collapses into one network round trip.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::ClientError;
use crate::request::{ApiResponse, RequestSignature};

/// Default time a resolved entry is kept.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(2);

type SharedResult = Shared<BoxFuture<'static, Result<ApiResponse, ClientError>>>;

struct Entry {
    generation: u64,
    future: SharedResult,
}

/// Collapses concurrent identical requests into one.
pub struct RequestDeduplicator {
    entries: Arc<Mutex<HashMap<RequestSignature, Entry>>>,
    ttl: Duration,
    next_generation: AtomicU64,
}

impl RequestDeduplicator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Number of in-flight or recently completed entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the shared result for `signature`, calling `perform` only if no
    /// entry exists.
    ///
    /// The request runs in its own task: dropping this future (a cancelled
    /// caller) never cancels it for other callers.
    pub async fn fetch<F, Fut>(
        &self,
        signature: RequestSignature,
        perform: F,
    ) -> Result<ApiResponse, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ApiResponse, ClientError>> + Send + 'static,
    {
        let shared = {
            let mut entries = self.entries.lock();
            match entries.get(&signature) {
                Some(entry) => {
                    debug!(%signature, "joining deduplicated request");
                    entry.future.clone()
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let task = tokio::spawn(perform());
                    let future = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) => Err(ClientError::Network(format!("request task failed: {e}"))),
                        }
                    }
                    .boxed()
                    .shared();

                    self.schedule_removal(signature.clone(), generation, future.clone());
                    entries.insert(signature, Entry { generation, future: future.clone() });
                    future
                }
            }
        };
        shared.await
    }

    /// Remove the entry `ttl` after it resolves, unless it was replaced.
    fn schedule_removal(&self, signature: RequestSignature, generation: u64, future: SharedResult) {
        let entries = Arc::clone(&self.entries);
        let ttl = self.ttl;
        tokio::spawn(async move {
            let _ = future.await;
            tokio::time::sleep(ttl).await;
            let mut entries = entries.lock();
            if entries.get(&signature).map(|e| e.generation) == Some(generation) {
                entries.remove(&signature);
                debug!(%signature, "deduplicated entry expired");
            }
        });
    }
}

impl Default for RequestDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
