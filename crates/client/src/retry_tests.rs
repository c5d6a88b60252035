// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        no_retry_on_server_error: vec![EndpointRule {
            method: Method::Post,
            path: "/api/sharing/client/create/".into(),
        }],
    }
}

#[test]
fn delay_doubles_until_capped() {
    let p = policy();
    assert_eq!(p.delay_for(0), Duration::from_millis(100));
    assert_eq!(p.delay_for(1), Duration::from_millis(200));
    assert_eq!(p.delay_for(2), Duration::from_millis(400));
    assert_eq!(p.delay_for(3), Duration::from_millis(800));
    assert_eq!(p.delay_for(4), Duration::from_secs(1));
    assert_eq!(p.delay_for(40), Duration::from_secs(1));
}

#[test]
fn network_errors_retry_with_increasing_delay_then_give_up() {
    let p = policy();
    let req = ApiRequest::get("/api/albums/");
    let err = ClientError::Network("connection reset".into());

    let mut delays = Vec::new();
    let mut attempt = 0;
    while let RetryDecision::Retry { delay } = p.decide(&req, &err, attempt, false) {
        delays.push(delay);
        attempt += 1;
    }
    assert_eq!(attempt, 3);
    assert!(delays.windows(2).all(|w| w[0] < w[1]), "delays not increasing: {delays:?}");
}

#[yare::parameterized(
    bad_request = { 400 },
    unauthorized = { 401 },
    forbidden = { 403 },
    not_found = { 404 },
    conflict = { 409 },
)]
fn client_errors_never_retry(status: u16) {
    let err = ClientError::from_status(status, String::new());
    assert_eq!(p_decide(&ApiRequest::get("/api/albums/"), &err), RetryDecision::GiveUp);
}

fn p_decide(req: &ApiRequest, err: &ClientError) -> RetryDecision {
    policy().decide(req, err, 0, false)
}

#[test]
fn server_errors_retry_on_regular_endpoints() {
    let err = ClientError::from_status(503, "unavailable".into());
    let req = ApiRequest::post("/api/albums/", json!({"title": "x"}));
    assert!(matches!(p_decide(&req, &err), RetryDecision::Retry { .. }));
}

#[test]
fn exempt_endpoint_skips_server_error_retry() {
    let req = ApiRequest::post("/api/sharing/client/create/", json!({"album_id": 1}));
    let err = ClientError::from_status(500, "boom".into());
    assert_eq!(p_decide(&req, &err), RetryDecision::GiveUp);

    // Network errors on the same endpoint are still transient.
    let err = ClientError::Network("timed out".into());
    assert!(matches!(p_decide(&req, &err), RetryDecision::Retry { .. }));
}

#[test]
fn replayed_requests_never_retry() {
    let err = ClientError::Network("reset".into());
    let req = ApiRequest::get("/api/albums/");
    assert_eq!(policy().decide(&req, &err, 0, true), RetryDecision::GiveUp);
}

#[test]
fn cancellation_never_retries() {
    let req = ApiRequest::get("/api/albums/");
    assert_eq!(p_decide(&req, &ClientError::Cancelled), RetryDecision::GiveUp);
}

#[test]
fn endpoint_rule_parses_and_normalizes() -> anyhow::Result<()> {
    let rule: EndpointRule = "post  api//sharing/client/create/".parse()?;
    assert_eq!(rule.method, Method::Post);
    assert_eq!(rule.path, "/api/sharing/client/create/");
    assert_eq!(rule.to_string(), "POST /api/sharing/client/create/");
    assert!("POST".parse::<EndpointRule>().is_err());
    assert!("FETCH /x/".parse::<EndpointRule>().is_err());
    Ok(())
}

#[test]
fn default_policy_exempts_client_link_creation() {
    let p = RetryPolicy::default();
    assert!(p.is_exempt(&ApiRequest::post("/api/sharing/client/create/", json!({}))));
    assert!(!p.is_exempt(&ApiRequest::post("/api/sharing/create/", json!({}))));
    assert_eq!(RetryPolicy::disabled().max_retries, 0);
}
