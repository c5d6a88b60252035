// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent key/value storage shared between client instances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// A change to a storage key made by another instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// New value, or `None` if the key was removed.
    pub value: Option<String>,
}

/// Key/value storage visible to every instance of a profile.
///
/// Subscribers only see changes made through *other* handles, mirroring how
/// browser storage events never fire in the tab that made the change.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

struct SharedValues {
    values: Mutex<HashMap<String, String>>,
    tabs: Mutex<Vec<(u64, broadcast::Sender<StorageEvent>)>>,
    next_id: AtomicU64,
}

/// In-memory storage with one handle per simulated instance.
///
/// Handles opened from the same root share values; a write through one
/// handle is delivered as a [`StorageEvent`] to every other handle.
pub struct MemoryStorage {
    shared: Arc<SharedValues>,
    id: u64,
    event_tx: broadcast::Sender<StorageEvent>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let shared = Arc::new(SharedValues {
            values: Mutex::new(HashMap::new()),
            tabs: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        });
        Self::attach(shared)
    }

    /// Open another handle onto the same values.
    pub fn open_tab(&self) -> Self {
        Self::attach(Arc::clone(&self.shared))
    }

    fn attach(shared: Arc<SharedValues>) -> Self {
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (event_tx, _) = broadcast::channel(64);
        shared.tabs.lock().push((id, event_tx.clone()));
        Self { shared, id, event_tx }
    }

    fn notify_others(&self, key: &str, value: Option<&str>) {
        let event = StorageEvent { key: key.to_owned(), value: value.map(str::to_owned) };
        for (id, tx) in self.shared.tabs.lock().iter() {
            if *id != self.id {
                let _ = tx.send(event.clone());
            }
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStorage {
    fn drop(&mut self) {
        self.shared.tabs.lock().retain(|(id, _)| *id != self.id);
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.shared.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.shared.values.lock().insert(key.to_owned(), value.to_owned());
        self.notify_others(key, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let existed = self.shared.values.lock().remove(key).is_some();
        if existed {
            self.notify_others(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
