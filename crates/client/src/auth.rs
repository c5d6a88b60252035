// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth and sharing endpoints, plus the raw token refresh call.

use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::client::HttpClient;
use crate::credential::Credential;
use crate::error::ClientError;
use crate::request::ApiRequest;
use crate::retry::RetryPolicy;

pub const LOGIN_PATH: &str = "/api/auth/login/";
pub const LOGOUT_PATH: &str = "/api/auth/logout/";
pub const ME_PATH: &str = "/api/auth/me/";
pub const CREATE_CLIENT_LINK_PATH: &str = "/api/sharing/client/create/";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default)]
    user: Value,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(alias = "access_token")]
    access: String,
    #[serde(default, alias = "refresh_token")]
    refresh: Option<String>,
}

#[derive(Debug)]
enum RefreshError {
    /// The server refused the refresh token. Login is required.
    Rejected(String),
    /// Network failure or 5xx. Retried with backoff.
    Transient(String),
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(msg) => write!(f, "refresh rejected: {msg}"),
            Self::Transient(msg) => write!(f, "refresh failed: {msg}"),
        }
    }
}

/// Exchange the current credential for a new one, retrying transient
/// failures under `retry`.
///
/// Runs outside the request pipeline: a 401 here never triggers another
/// refresh.
pub(crate) async fn refresh_with_retries(
    http: &reqwest::Client,
    url: Url,
    current: Option<Credential>,
    retry: &RetryPolicy,
) -> anyhow::Result<Credential> {
    let Some(current) = current else {
        anyhow::bail!("no stored credential to refresh");
    };

    let mut attempt = 0u32;
    loop {
        match do_refresh(http, url.clone(), &current).await {
            Ok(credential) => return Ok(credential),
            Err(RefreshError::Rejected(msg)) => {
                anyhow::bail!("refresh rejected: {msg}");
            }
            Err(RefreshError::Transient(msg)) => {
                if attempt >= retry.max_retries {
                    error!(attempts = attempt + 1, err = %msg, "refresh failed, giving up");
                    anyhow::bail!("refresh failed after {} attempts: {msg}", attempt + 1);
                }
                let delay = retry.delay_for(attempt);
                attempt += 1;
                warn!(attempt, max = retry.max_retries, err = %msg, "refresh failed, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn do_refresh(
    http: &reqwest::Client,
    url: Url,
    current: &Credential,
) -> Result<Credential, RefreshError> {
    let body = match current.refresh_token {
        Some(ref refresh) => json!({ "refresh": refresh }),
        None => json!({}),
    };

    let resp = http
        .post(url)
        .header(reqwest::header::AUTHORIZATION, current.bearer())
        .json(&body)
        .send()
        .await
        .map_err(|e| RefreshError::Transient(format!("HTTP error: {e}")))?;

    let status = resp.status();
    let text = resp.text().await.map_err(|e| RefreshError::Transient(format!("read body: {e}")))?;

    if status.is_server_error() {
        return Err(RefreshError::Transient(format!("HTTP {status}: {text}")));
    }
    if !status.is_success() {
        return Err(RefreshError::Rejected(format!("HTTP {status}: {text}")));
    }

    let token: RefreshResponse = serde_json::from_str(&text)
        .map_err(|e| RefreshError::Transient(format!("parse response: {e}")))?;
    if token.access.is_empty() {
        return Err(RefreshError::Rejected("empty access token".into()));
    }

    // The refresh token is only rotated when the server returns a new one.
    Ok(Credential::new(token.access, token.refresh.or_else(|| current.refresh_token.clone())))
}

/// Log in with email and password, storing the issued credential.
///
/// Returns the user record from the login response.
pub async fn login(client: &HttpClient, email: &str, password: &str) -> Result<Value, ClientError> {
    let req = ApiRequest::post(LOGIN_PATH, json!({ "email": email, "password": password })).anonymous();
    let resp: LoginResponse = client.send_json(req).await?;

    let credential = Credential::new(resp.access_token, resp.refresh_token);
    client.store().set(Some(&credential)).map_err(|e| ClientError::Storage(format!("{e:#}")))?;
    info!("logged in");
    Ok(resp.user)
}

/// Log out: revoke the refresh token server-side, then clear the stored
/// credential. The credential is cleared even if the server call fails.
pub async fn logout(client: &HttpClient) -> Result<(), ClientError> {
    let refresh_token = client.store().get().and_then(|c| c.refresh_token);
    let server = match refresh_token {
        Some(token) => {
            let req = ApiRequest::post(LOGOUT_PATH, json!({ "refresh_token": token }));
            client.send(req).await.map(|_| ())
        }
        None => Ok(()),
    };
    if let Err(ref e) = server {
        warn!(err = %e, "server logout failed, clearing local credential anyway");
    }

    client.store().clear().map_err(|e| ClientError::Storage(format!("{e:#}")))?;
    info!("logged out");
    Ok(())
}

/// The current user, as returned by the API.
pub async fn me(client: &HttpClient) -> Result<Value, ClientError> {
    client.send_json(ApiRequest::get(ME_PATH)).await
}

/// Public album share. Anonymous, deduplicated.
pub async fn fetch_public_share(client: &HttpClient, token: &str) -> Result<Value, ClientError> {
    client.send_json(ApiRequest::get(format!("/api/sharing/view/{token}/")).cacheable()).await
}

/// Metadata of a client delivery link. Anonymous, deduplicated.
pub async fn client_link_meta(client: &HttpClient, token: &str) -> Result<Value, ClientError> {
    client
        .send_json(ApiRequest::get(format!("/api/sharing/client/{token}/meta/")).cacheable())
        .await
}

/// Create a client delivery link. Server errors are not retried by default.
pub async fn create_client_link(client: &HttpClient, body: Value) -> Result<Value, ClientError> {
    client.send_json(ApiRequest::post(CREATE_CLIENT_LINK_PATH, body)).await
}
