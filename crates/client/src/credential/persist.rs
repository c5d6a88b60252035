// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed storage in the profile state directory.
//!
//! Each key is one file, written atomically (tmp + rename). Writes from other
//! processes are picked up through a `notify` watcher on the directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::credential::storage::{Storage, StorageEvent};
use crate::credential::UPDATED_MARKER_KEY;

/// Last value written or observed per key. Watcher events whose current value
/// matches are our own writes or duplicates and are not re-published, except
/// for the removed update marker.
type KnownValues = Arc<Mutex<HashMap<String, Option<String>>>>;

/// Storage backed by one file per key in a directory.
pub struct FileStorage {
    dir: PathBuf,
    known: KnownValues,
    event_tx: broadcast::Sender<StorageEvent>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory and start watching it.
    ///
    /// A watcher failure is logged and leaves the storage usable without
    /// cross-process notifications.
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let known: KnownValues = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, _) = broadcast::channel(64);

        let watcher = match setup_watcher(&dir, Arc::clone(&known), event_tx.clone()) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(dir = %dir.display(), err = %e, "storage watcher unavailable");
                None
            }
        };

        Ok(Self { dir, known, event_tx, _watcher: watcher })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.ends_with(".tmp") {
            anyhow::bail!("invalid storage key: {key:?}");
        }
        Ok(self.dir.join(key))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        read_value(&self.path_for(key)?)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        self.known.lock().insert(key.to_owned(), Some(value.to_owned()));
        write_atomic(&path, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        self.known.lock().insert(key.to_owned(), None);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.event_tx.subscribe()
    }
}

fn read_value(path: &Path) -> anyhow::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a file atomically (write tmp + rename).
///
/// The temp name carries PID and a counter so concurrent writers never share
/// a temp file.
fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn setup_watcher(
    dir: &Path,
    known: KnownValues,
    event_tx: broadcast::Sender<StorageEvent>,
) -> anyhow::Result<notify::RecommendedWatcher> {
    use notify::{RecursiveMode, Watcher};

    let watch_dir = dir.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(e) => e,
            Err(e) => {
                debug!(err = %e, "storage watch error");
                return;
            }
        };
        for path in &event.paths {
            let Some(key) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if key.ends_with(".tmp") {
                continue;
            }
            // A value written and removed before we read it is missed; the
            // channel is advisory.
            let value = match read_value(&watch_dir.join(&key)) {
                Ok(v) => v,
                Err(e) => {
                    debug!(key, err = %e, "storage read after change failed");
                    continue;
                }
            };
            {
                let mut known = known.lock();
                // The marker is written then removed on every credential write,
                // so it usually reads back absent. Absent markers are always
                // published; only a marker still holding a seen stamp is skipped.
                let marker_removed = key == UPDATED_MARKER_KEY && value.is_none();
                if known.get(&key) == Some(&value) && !marker_removed {
                    continue;
                }
                known.insert(key.clone(), value.clone());
            }
            let _ = event_tx.send(StorageEvent { key, value });
        }
    })?;

    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
