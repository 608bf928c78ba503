//! Per-session Watcher Token
//!
//! A session holds at most one [`Watcher`]. WATCH binds keys to it, and
//! EXEC reads its flag to decide whether the transaction may commit.
//!
//! ## Lifecycle
//!
//! ```text
//!   new ──> Bound ──(UNWATCH | EXEC | DISCARD | touch | drop)──> Unbound
//! ```
//!
//! `Unbound` is terminal: binding more keys is a silent no-op.

use crate::watch::registry::{WatchKey, WatchRegistry, WatcherId};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identity token bound to zero or more watched keys.
#[derive(Debug)]
pub struct Watcher {
    id: WatcherId,
    bound: Arc<AtomicBool>,
    registry: Arc<WatchRegistry>,
}

impl Watcher {
    pub fn new(registry: Arc<WatchRegistry>) -> Self {
        Self {
            id: registry.allocate_id(),
            bound: Arc::new(AtomicBool::new(true)),
            registry,
        }
    }

    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Binds `keys` of `keyspace` to this token.
    ///
    /// Keys already bound are skipped. Returns how many keys were newly bound.
    pub fn bind(&self, keyspace: usize, keys: &[Bytes]) -> usize {
        keys.iter()
            .filter(|key| {
                self.registry
                    .register_interest(self.id, &self.bound, WatchKey::new(keyspace, (*key).clone()))
            })
            .count()
    }

    /// Whether none of the bound keys has been modified yet.
    ///
    /// Always reads the live flag, so an invalidation delivered from another
    /// connection is observed as soon as it lands.
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    /// Detaches from every key and becomes permanently inert. Idempotent.
    pub fn unbind(&self) {
        self.registry.release(self.id);
        self.bound.store(false, Ordering::Release);
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.unbind();
    }
}
