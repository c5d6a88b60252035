// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated HTTP client: credentials, refresh-and-replay, retries, dedup.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::auth::refresh_with_retries;
use crate::credential::refresh::{RefreshCoordinator, DEFAULT_REFRESH_GRACE};
use crate::credential::store::CredentialStore;
use crate::credential::{Credential, CredentialEvent};
use crate::dedup::{RequestDeduplicator, DEFAULT_DEDUP_TTL};
use crate::error::ClientError;
use crate::request::{normalize_path, ApiRequest, ApiResponse};
use crate::retry::{RetryDecision, RetryPolicy};

/// Default path of the token refresh endpoint.
pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh/";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// API base URL, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    pub refresh_path: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub refresh_grace: Duration,
    pub dedup_ttl: Duration,
}

impl ClientSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: DEFAULT_REFRESH_PATH.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            refresh_grace: DEFAULT_REFRESH_GRACE,
            dedup_ttl: DEFAULT_DEDUP_TTL,
        }
    }
}

struct Inner {
    base_url: String,
    refresh_url: Url,
    refresh_path: String,
    http: reqwest::Client,
    store: Arc<CredentialStore>,
    refresh: Arc<RefreshCoordinator>,
    dedup: RequestDeduplicator,
    retry: RetryPolicy,
}

/// The client every collaborator sends requests through. Cheap to clone.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<Inner>,
}

impl HttpClient {
    pub fn new(settings: ClientSettings, store: Arc<CredentialStore>) -> anyhow::Result<Self> {
        crate::ensure_crypto();

        let base_url = settings.base_url.trim_end_matches('/').to_owned();
        let refresh_path = normalize_path(&settings.refresh_path);
        let refresh_url = Url::parse(&format!("{base_url}{refresh_path}"))?;
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;
        let refresh = RefreshCoordinator::new(Arc::clone(&store), settings.refresh_grace);

        Ok(Self {
            inner: Arc::new(Inner {
                base_url,
                refresh_url,
                refresh_path,
                http,
                store,
                refresh,
                dedup: RequestDeduplicator::new(settings.dedup_ttl),
                retry: settings.retry,
            }),
        })
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.inner.store
    }

    /// Subscribe to credential events (local changes, remote changes, refreshes).
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.inner.store.subscribe()
    }

    /// Send a request and decode a successful JSON body.
    pub async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        req: ApiRequest,
    ) -> Result<T, ClientError> {
        self.send(req).await?.json()
    }

    /// Send a logical request.
    ///
    /// Cancellation via the request's token stops waiting immediately, at any
    /// stage (network, backoff, or waiting for a refresh), and yields
    /// [`ClientError::Cancelled`] without retry or refresh.
    pub async fn send(&self, req: ApiRequest) -> Result<ApiResponse, ClientError> {
        let cancel = req.cancel.clone().unwrap_or_default();
        if cancel.is_cancelled() {
            debug!(method = %req.method, path = %req.path, "request cancelled before send");
            return Err(ClientError::Cancelled);
        }

        let method = req.method;
        let path = req.path.clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            r = self.dispatch(req) => r,
        };
        if let Err(ClientError::Cancelled) = result {
            debug!(%method, %path, "request cancelled");
        }
        result
    }

    async fn dispatch(&self, req: ApiRequest) -> Result<ApiResponse, ClientError> {
        if !req.is_dedup_eligible() {
            return self.execute(&req).await;
        }

        let signature = req.signature();
        let this = self.clone();
        // The shared request outlives any single caller's cancellation.
        let shared_req = ApiRequest { cancel: None, ..req };
        self.inner
            .dedup
            .fetch(signature, move || async move { this.execute(&shared_req).await })
            .await
    }

    /// Run one logical request: send, refresh-and-replay on 401, retry on
    /// transient failure.
    async fn execute(&self, req: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut attempt = 0u32;
        let mut replay_with: Option<Credential> = None;

        loop {
            let replayed = replay_with.is_some();
            let credential = match (&replay_with, req.anonymous) {
                (_, true) => None,
                (Some(fresh), false) => Some(fresh.clone()),
                (None, false) => self.inner.store.get(),
            };

            let err = match self.send_once(req, credential.as_ref()).await {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };

            if err.is_unauthorized() && !req.anonymous && !replayed && !self.is_refresh_path(req)
            {
                debug!(method = %req.method, path = %req.path, "authentication expired");
                match self.refresh_after_unauthorized(credential.as_ref()).await {
                    Some(fresh) => {
                        replay_with = Some(fresh);
                        continue;
                    }
                    None => return Err(err),
                }
            }

            match self.inner.retry.decide(req, &err, attempt, replayed) {
                RetryDecision::Retry { delay } => {
                    attempt += 1;
                    warn!(
                        method = %req.method,
                        path = %req.path,
                        attempt,
                        max = self.inner.retry.max_retries,
                        err = %err,
                        "request failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    debug!(method = %req.method, path = %req.path, err = %err, "request failed");
                    return Err(err);
                }
            }
        }
    }

    async fn refresh_after_unauthorized(&self, stale: Option<&Credential>) -> Option<Credential> {
        let http = self.inner.http.clone();
        let url = self.inner.refresh_url.clone();
        let retry = self.inner.retry.clone();
        self.inner
            .refresh
            .await_refresh(stale, move |current| async move {
                refresh_with_retries(&http, url, current, &retry).await
            })
            .await
    }

    fn is_refresh_path(&self, req: &ApiRequest) -> bool {
        normalize_path(&req.path) == self.inner.refresh_path
    }

    fn url_for(&self, req: &ApiRequest) -> Result<Url, ClientError> {
        let raw = format!("{}{}", self.inner.base_url, normalize_path(&req.path));
        let mut url = Url::parse(&raw).map_err(|e| ClientError::InvalidRequest(format!("{raw}: {e}")))?;
        if !req.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &req.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// One network round trip. Non-2xx statuses become typed errors.
    async fn send_once(
        &self,
        req: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ClientError> {
        let url = self.url_for(req)?;
        let mut builder = self.inner.http.request(req.method.to_reqwest(), url);
        if let Some(credential) = credential {
            builder = builder.header(reqwest::header::AUTHORIZATION, credential.bearer());
        }
        if let Some(ref body) = req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        debug!(method = %req.method, path = %req.path, status, "response");

        if (200..300).contains(&status) {
            Ok(ApiResponse { status, body })
        } else {
            Err(ClientError::from_status(status, String::from_utf8_lossy(&body).into_owned()))
        }
    }
}
