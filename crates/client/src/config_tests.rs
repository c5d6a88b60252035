// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use super::ClientConfig;
use crate::request::Method;

#[derive(Debug, Parser)]
struct TestCli {
    #[command(flatten)]
    config: ClientConfig,
}

fn parse(args: &[&str]) -> ClientConfig {
    TestCli::parse_from(args).config
}

#[test]
fn defaults_match_client_defaults() -> anyhow::Result<()> {
    let config = parse(&["pvclient"]);
    let settings = config.settings()?;
    assert_eq!(settings.base_url, "http://127.0.0.1:8000");
    assert_eq!(settings.refresh_path, "/api/auth/refresh/");
    assert_eq!(settings.retry.max_retries, 3);
    assert_eq!(settings.retry.base_delay, Duration::from_secs(1));
    assert_eq!(settings.retry.max_delay, Duration::from_secs(30));
    assert_eq!(settings.refresh_grace, Duration::from_secs(2));
    assert_eq!(settings.dedup_ttl, Duration::from_secs(2));
    assert_eq!(settings.timeout, Duration::from_secs(30));
    assert_eq!(settings.retry.no_retry_on_server_error.len(), 1);
    assert_eq!(
        settings.retry.no_retry_on_server_error[0].to_string(),
        "POST /api/sharing/client/create/"
    );
    Ok(())
}

#[test]
fn flags_override_defaults() -> anyhow::Result<()> {
    let config = parse(&[
        "pvclient",
        "--api-url",
        "https://photos.example.com/",
        "--max-retries",
        "5",
        "--retry-base-ms",
        "50",
        "--state-dir",
        "/tmp/pv",
        "--no-retry-endpoint",
        "POST /api/albums/",
        "--no-retry-endpoint",
        "delete /api/images/1/",
    ]);
    let settings = config.settings()?;
    assert_eq!(settings.base_url, "https://photos.example.com/");
    assert_eq!(settings.retry.max_retries, 5);
    assert_eq!(settings.retry.base_delay, Duration::from_millis(50));
    assert_eq!(config.state_dir(), PathBuf::from("/tmp/pv"));

    let rules = &settings.retry.no_retry_on_server_error;
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[1].method, Method::Delete);
    assert_eq!(rules[1].path, "/api/images/1/");
    Ok(())
}

#[yare::parameterized(
    not_http          = { &["pvclient", "--api-url", "ftp://host"], "http(s) URL" },
    base_exceeds_max  = { &["pvclient", "--retry-base-ms", "5000", "--retry-max-ms", "100"], "must not exceed" },
    bad_endpoint_rule = { &["pvclient", "--no-retry-endpoint", "POST"], "METHOD /path" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.settings(), expected_substr);
}
