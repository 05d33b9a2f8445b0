//! Keyed cancellation of in-flight requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::CancelReason;

struct Entry {
    id: u64,
    token: CancellationToken,
    reason: Arc<Mutex<CancelReason>>,
}

/// Tracks at most one in-flight request per caller-supplied key.
///
/// Registering under a key that is already tracked cancels the previous
/// request first.
#[derive(Default)]
pub struct AbortRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    next_id: AtomicU64,
}

/// Cancellation handle for one registered request.
#[derive(Debug)]
pub struct AbortHandle {
    key: String,
    id: u64,
    token: CancellationToken,
    reason: Arc<Mutex<CancelReason>>,
}

impl AbortHandle {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the request has been superseded or aborted.
    pub async fn cancelled(&self) -> CancelReason {
        self.token.cancelled().await;
        *self.reason.lock()
    }
}

/// An [`AbortHandle`] that releases its registry entry when dropped, including
/// when the request future owning it is dropped before it resolves.
pub struct AbortGuard<'a> {
    registry: &'a AbortRegistry,
    handle: AbortHandle,
}

impl AbortGuard<'_> {
    #[must_use]
    pub fn handle(&self) -> &AbortHandle {
        &self.handle
    }
}

impl Drop for AbortGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.handle);
    }
}

impl AbortRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// [`register`](Self::register) with release on drop.
    pub fn track(&self, key: &str) -> AbortGuard<'_> {
        AbortGuard {
            registry: self,
            handle: self.register(key),
        }
    }

    /// Track a new request under `key`, superseding any older one.
    pub fn register(&self, key: &str) -> AbortHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let reason = Arc::new(Mutex::new(CancelReason::Superseded));

        let previous = self.entries.lock().insert(
            key.to_owned(),
            Entry {
                id,
                token: token.clone(),
                reason: reason.clone(),
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(key, "Superseding in-flight request");
            *previous.reason.lock() = CancelReason::Superseded;
            previous.token.cancel();
        }

        AbortHandle {
            key: key.to_owned(),
            id,
            token,
            reason,
        }
    }

    /// Cancel whatever is tracked under `key`. Returns whether anything was.
    pub fn abort(&self, key: &str) -> bool {
        let removed = self.entries.lock().remove(key);
        match removed {
            Some(entry) => {
                *entry.reason.lock() = CancelReason::Aborted;
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop tracking a finished request.
    ///
    /// Only removes the entry if it still belongs to `handle`; a newer request
    /// registered under the same key stays tracked.
    pub fn release(&self, handle: &AbortHandle) {
        let mut entries = self.entries.lock();
        if entries.get(&handle.key).is_some_and(|e| e.id == handle.id) {
            entries.remove(&handle.key);
        }
    }

    /// Number of keys with an in-flight request.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
