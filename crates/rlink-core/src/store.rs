//! In-memory blob store backing the endpoint's fetch verb.
//!
//! Blobs stay until removed; there is no eviction.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Keyed byte payloads awaiting a fetch from the interpreter.
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a blob, replacing any previous blob under the same key.
    pub fn put(&self, key: impl Into<String>, bytes: impl Into<Bytes>) {
        let key = key.into();
        let bytes = bytes.into();
        debug!("Storing blob {} ({} bytes)", key, bytes.len());
        self.lock().insert(key, bytes);
    }

    /// Look up a blob without removing it.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.lock().get(key).cloned()
    }

    /// Remove a blob. Removing a missing key is a no-op.
    pub fn remove(&self, key: &str) {
        if self.lock().remove(key).is_some() {
            debug!("Removed blob {}", key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bytes>> {
        // The map holds no invariants a panicking writer could break.
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
