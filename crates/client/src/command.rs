// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pvclient` subcommands.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth;
use crate::client::HttpClient;
use crate::config::ClientConfig;
use crate::credential::persist::FileStorage;
use crate::credential::store::CredentialStore;
use crate::request::{ApiRequest, Method};
use crate::session::SessionMonitor;

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Log in and store the issued credential.
    Login {
        #[arg(long, env = "PV_EMAIL")]
        email: String,
        #[arg(long, env = "PV_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Revoke the refresh token and clear the stored credential.
    Logout,
    /// Print the current user.
    Whoami,
    /// Send a request and print the response body.
    Request {
        /// HTTP method.
        #[arg(long, short = 'X', default_value = "GET")]
        method: Method,
        path: String,
        /// Query parameter as key=value. Repeatable.
        #[arg(long = "query", short = 'q', value_parser = parse_pair)]
        query: Vec<(String, String)>,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
        /// Send without credentials.
        #[arg(long)]
        anonymous: bool,
    },
    /// Fetch a public album share.
    Share { token: String },
    /// Print session state changes, including logins and logouts made by
    /// other instances, until interrupted.
    Watch,
}

fn parse_pair(s: &str) -> anyhow::Result<(String, String)> {
    let (k, v) = s.split_once('=').ok_or_else(|| anyhow::anyhow!("expected key=value, got {s:?}"))?;
    Ok((k.to_owned(), v.to_owned()))
}

/// Build the client over the on-disk credential store.
pub fn build_client(config: &ClientConfig) -> anyhow::Result<HttpClient> {
    let storage = FileStorage::open(config.state_dir())?;
    info!(state_dir = %storage.dir().display(), "credential store opened");
    let store = CredentialStore::new(Arc::new(storage));
    HttpClient::new(config.settings()?, store)
}

pub async fn run(config: ClientConfig, command: Command) -> anyhow::Result<()> {
    let client = build_client(&config)?;

    match command {
        Command::Login { email, password } => {
            let user = auth::login(&client, &email, &password).await?;
            print_json(&user)?;
        }
        Command::Logout => {
            auth::logout(&client).await?;
        }
        Command::Whoami => {
            print_json(&auth::me(&client).await?)?;
        }
        Command::Request { method, path, query, body, anonymous } => {
            let mut req = ApiRequest::new(method, path).with_cancel(interrupt_token());
            req.query = query;
            if let Some(body) = body {
                req = req.json(serde_json::from_str(&body)?);
            }
            if anonymous {
                req = req.anonymous();
            }
            let resp = client.send(req).await?;
            println!("{}", resp.text());
        }
        Command::Share { token } => {
            print_json(&auth::fetch_public_share(&client, &token).await?)?;
        }
        Command::Watch => watch(client).await?,
    }
    Ok(())
}

async fn watch(client: HttpClient) -> anyhow::Result<()> {
    let shutdown = interrupt_token();
    let listener = client.store().spawn_remote_listener();
    let monitor = SessionMonitor::new(client);
    let mut states = monitor.watch();
    let task = monitor.spawn(shutdown.clone());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&state)?);
            }
        }
    }

    listener.abort();
    let _ = task.await;
    Ok(())
}

/// A token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
