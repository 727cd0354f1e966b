//! Fan-out broker implementation

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Per-subscriber queue depth. A subscriber whose queue is full at
    /// publish time is disconnected.
    pub queue_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

/// Live subscriber counts reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BrokerStatus {
    pub active_connections: usize,
}

/// A registered subscriber's receiving half. Dropping the subscription
/// ends delivery; the sender side is pruned on the next publish.
pub struct Subscription<T> {
    pub id: u64,
    pub receiver: mpsc::Receiver<T>,
}

struct Inner<T> {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<T>>>,
    next_id: AtomicU64,
    config: BrokerConfig,
}

/// Multi-producer fan-out hub. Cheap to clone; clones share the
/// subscriber set.
pub struct Broadcaster<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// A poisoned lock only means a panic elsewhere while holding it;
    /// the subscriber map itself stays usable.
    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::Sender<T>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Register a subscriber. It receives every message published after
    /// this call; there is no backfill of earlier messages.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.inner.config.queue_capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_subscribers().insert(id, tx);
        info!(subscriber_id = id, "subscriber connected");
        Subscription { id, receiver: rx }
    }

    /// Remove a subscriber and release its queue.
    pub fn unsubscribe(&self, id: u64) {
        let removed = self.lock_subscribers().remove(&id).is_some();
        if removed {
            info!(subscriber_id = id, "subscriber disconnected");
        }
    }

    /// Deliver a message to every live subscriber without blocking.
    ///
    /// Subscribers whose queue is full or whose receiving half is gone are
    /// dropped here; everyone else gets the message. Returns the number of
    /// subscribers delivered to.
    pub fn publish(&self, message: T) -> usize {
        let mut subscribers = self.lock_subscribers();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in subscribers.iter() {
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber_id = id, "subscriber queue full, disconnecting");
                    dead.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(subscriber_id = id, "subscriber gone, pruning");
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            subscribers.remove(&id);
        }
        delivered
    }

    /// Current subscriber count for observability.
    pub fn status(&self) -> BrokerStatus {
        BrokerStatus {
            active_connections: self.lock_subscribers().len(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}
