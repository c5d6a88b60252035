// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::credential::storage::MemoryStorage;

fn cred(token: &str) -> Credential {
    Credential::new(token, Some(format!("{token}-refresh")))
}

#[test]
fn get_rereads_storage_every_time() -> anyhow::Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let store = CredentialStore::new(Arc::clone(&storage) as Arc<dyn Storage>);
    assert_eq!(store.get(), None);

    // Written behind the store's back, as another instance would.
    storage.set(CREDENTIAL_KEY, r#"{"access_token":"external"}"#)?;
    assert_eq!(store.get(), Some(Credential::new("external", None)));
    Ok(())
}

#[test]
fn set_emits_local_change_and_clears_marker() -> anyhow::Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let store = CredentialStore::new(Arc::clone(&storage) as Arc<dyn Storage>);
    let mut rx = store.subscribe();

    store.set(Some(&cred("a")))?;

    assert_eq!(store.get(), Some(cred("a")));
    assert_eq!(storage.get(UPDATED_MARKER_KEY)?, None);
    assert!(matches!(rx.try_recv()?, CredentialEvent::Changed { origin: ChangeOrigin::Local }));
    Ok(())
}

#[test]
fn clear_removes_credential() -> anyhow::Result<()> {
    let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
    store.set(Some(&cred("a")))?;
    let mut rx = store.subscribe();
    store.clear()?;
    assert_eq!(store.get(), None);
    assert!(matches!(rx.try_recv()?, CredentialEvent::Changed { origin: ChangeOrigin::Local }));
    Ok(())
}

#[yare::parameterized(
    corrupt_json = { "{not json" },
    empty_token = { r#"{"access_token":""}"# },
    blank = { "   " },
)]
fn unusable_values_read_as_absent(raw: &str) -> anyhow::Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(CREDENTIAL_KEY, raw)?;
    let store = CredentialStore::new(storage);
    assert_eq!(store.get(), None);
    Ok(())
}

#[test]
fn bare_token_is_accepted() -> anyhow::Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(CREDENTIAL_KEY, "eyJ.bare.token\n")?;
    let store = CredentialStore::new(storage);
    assert_eq!(store.get(), Some(Credential::new("eyJ.bare.token", None)));
    Ok(())
}

#[tokio::test]
async fn other_tab_sees_remote_change_even_for_same_value() -> anyhow::Result<()> {
    let tab_a = MemoryStorage::new();
    let tab_b = tab_a.open_tab();
    let store_a = CredentialStore::new(Arc::new(tab_a));
    let store_b = CredentialStore::new(Arc::new(tab_b));
    store_a.set(Some(&cred("same")))?;

    let _listener = store_b.spawn_remote_listener();
    let mut rx_b = store_b.subscribe();

    // Same value again: only the marker changes.
    store_a.set(Some(&cred("same")))?;

    let event = tokio::time::timeout(Duration::from_secs(2), rx_b.recv()).await??;
    assert!(matches!(event, CredentialEvent::Changed { origin: ChangeOrigin::Remote }));
    assert_eq!(store_b.get(), Some(cred("same")));
    Ok(())
}

#[test]
fn debug_redacts_tokens() {
    let rendered = format!("{:?}", cred("secret-value"));
    assert!(!rendered.contains("secret-value"));
    assert!(rendered.contains("<redacted>"));
}
