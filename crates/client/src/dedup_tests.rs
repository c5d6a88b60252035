// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::AtomicU32;

use bytes::Bytes;

use super::*;
use crate::request::ApiRequest;

fn share_signature(token: &str) -> RequestSignature {
    ApiRequest::get(format!("/api/sharing/view/{token}/")).cacheable().signature()
}

fn perform(
    calls: &Arc<AtomicU32>,
    delay: Duration,
) -> impl FnOnce() -> BoxFuture<'static, Result<ApiResponse, ClientError>> {
    let calls = Arc::clone(calls);
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(ApiResponse { status: 200, body: Bytes::from(format!("{{\"call\":{n}}}")) })
        })
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_requests_share_one_call() -> anyhow::Result<()> {
    let dedup = Arc::new(RequestDeduplicator::new(Duration::from_secs(2)));
    let calls = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let dedup = Arc::clone(&dedup);
        let op = perform(&calls, Duration::from_millis(100));
        handles.push(tokio::spawn(async move { dedup.fetch(share_signature("abc"), op).await }));
    }
    for handle in handles {
        let resp = handle.await??;
        assert_eq!(resp.text(), r#"{"call":1}"#);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn result_is_reused_within_ttl_and_refetched_after() -> anyhow::Result<()> {
    let dedup = RequestDeduplicator::new(Duration::from_secs(2));
    let calls = Arc::new(AtomicU32::new(0));

    dedup.fetch(share_signature("abc"), perform(&calls, Duration::ZERO)).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let second = dedup.fetch(share_signature("abc"), perform(&calls, Duration::ZERO)).await?;
    assert_eq!(second.text(), r#"{"call":1}"#);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(dedup.is_empty());

    let third = dedup.fetch(share_signature("abc"), perform(&calls, Duration::ZERO)).await?;
    assert_eq!(third.text(), r#"{"call":2}"#);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn different_signatures_do_not_share() -> anyhow::Result<()> {
    let dedup = RequestDeduplicator::new(Duration::from_secs(2));
    let calls = Arc::new(AtomicU32::new(0));

    dedup.fetch(share_signature("abc"), perform(&calls, Duration::ZERO)).await?;
    dedup.fetch(share_signature("xyz"), perform(&calls, Duration::ZERO)).await?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(dedup.len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelled_caller_does_not_cancel_shared_request() -> anyhow::Result<()> {
    let dedup = Arc::new(RequestDeduplicator::new(Duration::from_secs(2)));
    let calls = Arc::new(AtomicU32::new(0));

    let first = {
        let dedup = Arc::clone(&dedup);
        let op = perform(&calls, Duration::from_millis(300));
        tokio::spawn(async move { dedup.fetch(share_signature("abc"), op).await })
    };
    let second = {
        let dedup = Arc::clone(&dedup);
        let op = perform(&calls, Duration::from_millis(300));
        tokio::spawn(async move { dedup.fetch(share_signature("abc"), op).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    first.abort();

    let resp = second.await??;
    assert_eq!(resp.text(), r#"{"call":1}"#);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}
