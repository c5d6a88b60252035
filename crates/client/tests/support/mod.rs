// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::MethodRouter;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use pvclient::client::ClientSettings;
use pvclient::retry::RetryPolicy;

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(format!("http://{addr}"))
}

/// A local address with nothing listening on it.
pub async fn dead_addr() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Settings with short delays so retry and TTL paths run quickly.
pub fn fast_settings(base_url: &str) -> ClientSettings {
    let mut settings = ClientSettings::new(base_url);
    settings.retry = RetryPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..RetryPolicy::default()
    };
    settings.refresh_grace = Duration::from_millis(200);
    settings.dedup_ttl = Duration::from_millis(300);
    settings.timeout = Duration::from_secs(5);
    settings
}

pub fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Replies from `responses` in order, repeating the last one, and counts calls.
pub fn scripted(responses: Vec<(u16, Value)>) -> (MethodRouter, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let responses = Arc::new(responses);
    let route = axum::routing::any(move || {
        let counter = Arc::clone(&counter);
        let responses = Arc::clone(&responses);
        async move {
            let idx = counter.fetch_add(1, Ordering::SeqCst) as usize;
            let (code, body) = responses
                .get(idx)
                .or_else(|| responses.last())
                .cloned()
                .unwrap_or((500, json!({})));
            (status(code), Json(body))
        }
    });
    (route, calls)
}

/// The bearer token of a request, if any.
pub fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}
