//! Rendezvous registry backing the endpoint's deliver verb.
//!
//! A waiter registers a key and gets a [`RendezvousSlot`]. A deliverer hands
//! the inbound request body to that slot and then blocks until the waiter has
//! finished with it, so the HTTP layer never reclaims a body that is still
//! being read.
//!
//! ```text
//!  waiter                      registry                    deliverer (PUT)
//!  register(key) ──────────▶ slots[key] = tx
//!  slot.wait() ...                            ◀──────────  deliver(key, body)
//!              ◀── Delivery { body, done } ── slots.remove(key)
//!  read body, complete() ─────────────────────────────────▶ done fires, 200
//! ```

use crate::error::{Result, RlinkError};
use axum::body::Body;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// An inbound body handed to a registered waiter.
///
/// The deliverer stays blocked until [`Delivery::complete`] is called or the
/// delivery is dropped.
#[derive(Debug)]
pub struct Delivery {
    key: String,
    body: Body,
    done: Option<oneshot::Sender<()>>,
}

impl Delivery {
    /// Key the body was delivered to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the whole body, then signal completion to the deliverer.
    pub async fn read_to_end(mut self, limit: usize) -> Result<Bytes> {
        let body = std::mem::replace(&mut self.body, Body::empty());
        let bytes = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| RlinkError::Transport {
                message: format!("Failed to read delivery for {}: {}", self.key, e),
            });
        self.complete();
        bytes
    }

    /// Release the deliverer. Idempotent.
    pub fn complete(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        self.complete();
    }
}

/// Registered waiters keyed by transfer key.
#[derive(Debug, Default)]
pub struct RendezvousRegistry {
    slots: Mutex<HashMap<String, (u64, oneshot::Sender<Delivery>)>>,
    next_id: AtomicU64,
}

impl RendezvousRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `key`.
    ///
    /// The returned slot unregisters itself when dropped. Registering a key
    /// that already has a waiter replaces it; the old waiter sees a closed slot.
    pub fn register(self: &Arc<Self>, key: impl Into<String>) -> RendezvousSlot {
        let key = key.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        if self.lock().insert(key.clone(), (id, tx)).is_some() {
            warn!("Rendezvous key {} registered twice; replacing earlier waiter", key);
        }
        debug!("Registered rendezvous slot {}", key);
        RendezvousSlot {
            key,
            id,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Remove the waiter for `key`, if any.
    pub fn unregister(&self, key: &str) {
        if self.lock().remove(key).is_some() {
            debug!("Unregistered rendezvous slot {}", key);
        }
    }

    fn unregister_slot(&self, key: &str, id: u64) {
        let mut slots = self.lock();
        if matches!(slots.get(key), Some((current, _)) if *current == id) {
            slots.remove(key);
            debug!("Released rendezvous slot {}", key);
        }
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Hand `body` to the waiter registered under `key`.
    ///
    /// Returns `false` immediately when nobody is waiting; the caller owns
    /// `body` disposal in that case (it is dropped here). Otherwise waits until
    /// the waiter is finished with the body and returns `true`.
    pub async fn deliver(&self, key: &str, body: Body) -> bool {
        let Some((_, sender)) = self.lock().remove(key) else {
            debug!("No rendezvous waiter for {}", key);
            return false;
        };

        let (done_tx, done_rx) = oneshot::channel();
        let delivery = Delivery {
            key: key.to_string(),
            body,
            done: Some(done_tx),
        };
        if sender.send(delivery).is_err() {
            warn!("Rendezvous waiter for {} went away before delivery", key);
            return false;
        }

        // Err means the waiter dropped the delivery, which also ends the exchange.
        let _ = done_rx.await;
        debug!("Rendezvous {} completed", key);
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (u64, oneshot::Sender<Delivery>)>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A registered waiter. Dropping it unregisters the key.
#[derive(Debug)]
pub struct RendezvousSlot {
    key: String,
    id: u64,
    rx: oneshot::Receiver<Delivery>,
    registry: Arc<RendezvousRegistry>,
}

impl RendezvousSlot {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for a deliverer. There is no timeout.
    pub async fn wait(&mut self) -> Result<Delivery> {
        (&mut self.rx).await.map_err(|_| RlinkError::Transport {
            message: format!("Rendezvous slot {} closed before delivery", self.key),
        })
    }
}

impl Drop for RendezvousSlot {
    fn drop(&mut self) {
        self.registry.unregister_slot(&self.key, self.id);
    }
}
