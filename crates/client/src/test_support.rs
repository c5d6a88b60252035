// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use crate::credential::storage::MemoryStorage;
use crate::credential::store::CredentialStore;
use crate::credential::Credential;

/// A credential store over fresh in-memory storage, optionally seeded.
pub fn memory_store(initial: Option<Credential>) -> anyhow::Result<Arc<CredentialStore>> {
    let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
    if let Some(credential) = initial {
        store.set(Some(&credential))?;
    }
    Ok(store)
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
