//! Sharded In-Memory Keyspace
//!
//! A thread-safe string keyspace that reports every write to the
//! [`WatchRegistry`], which is what makes WATCH observe modifications made
//! by other connections.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Keyspace                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │ touch(keyspace, key) on each write
//!                                ▼
//!                         WatchRegistry
//! ```
//!
//! The registry is notified while the shard write lock is still held, so no
//! reader can see a new value before the watchers of its key are
//! invalidated. The lock order is shard first, registry second; the registry
//! never takes a shard lock.

use crate::watch::WatchRegistry;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Number of shards. More shards means less lock contention.
const NUM_SHARDS: usize = 64;

/// Errors from value-interpreting operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("increment or decrement would overflow")]
    Overflow,
}

type Shard = RwLock<HashMap<Bytes, Bytes>>;

/// One numbered keyspace of string values.
///
/// # Example
///
/// ```
/// use respline::storage::Keyspace;
/// use respline::watch::{WatchRegistry, Watcher};
/// use bytes::Bytes;
/// use std::sync::Arc;
///
/// let registry = Arc::new(WatchRegistry::new());
/// let keyspace = Keyspace::new(0, Arc::clone(&registry));
///
/// let watcher = Watcher::new(Arc::clone(&registry));
/// watcher.bind(0, &[Bytes::from("name")]);
///
/// keyspace.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(keyspace.get(b"name"), Some(Bytes::from("Ariz")));
/// assert!(!watcher.is_bound());
/// ```
pub struct Keyspace {
    index: usize,
    shards: Vec<Shard>,
    watches: Arc<WatchRegistry>,
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("index", &self.index)
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .finish()
    }
}

impl Keyspace {
    pub fn new(index: usize, watches: Arc<WatchRegistry>) -> Self {
        Self {
            index,
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
            watches,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    fn read(&self, key: &[u8]) -> RwLockReadGuard<'_, HashMap<Bytes, Bytes>> {
        self.shard(key).read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, key: &[u8]) -> RwLockWriteGuard<'_, HashMap<Bytes, Bytes>> {
        self.shard(key).write().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self, key: &[u8]) {
        self.watches.touch(self.index, key);
    }

    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.read(key).get(key).cloned()
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.read(key).contains_key(key)
    }

    /// Sets a value. Returns `true` if the key was newly created.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        let mut data = self.write(&key);
        let is_new = data.insert(key.clone(), value).is_none();
        self.touch(&key);
        is_new
    }

    /// Deletes a key. Returns `true` if it existed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut data = self.write(key);
        let removed = data.remove(key).is_some();
        if removed {
            self.touch(key);
        }
        removed
    }

    /// Adds `delta` to the integer stored at `key` (missing keys count as 0).
    pub fn incr_by(&self, key: &Bytes, delta: i64) -> Result<i64, StorageError> {
        let mut data = self.write(key);
        let current = match data.get(key.as_ref()) {
            Some(value) => std::str::from_utf8(value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(StorageError::NotAnInteger)?,
            None => 0,
        };
        let updated = current.checked_add(delta).ok_or(StorageError::Overflow)?;
        data.insert(key.clone(), Bytes::from(updated.to_string()));
        self.touch(key);
        Ok(updated)
    }

    /// Appends to the value at `key`. Returns the new length.
    pub fn append(&self, key: &Bytes, suffix: &[u8]) -> usize {
        let mut data = self.write(key);
        let mut value = data
            .get(key.as_ref())
            .map(|v| BytesMut::from(v.as_ref()))
            .unwrap_or_default();
        value.extend_from_slice(suffix);
        let len = value.len();
        data.insert(key.clone(), value.freeze());
        self.touch(key);
        len
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key, invalidating every watch on this keyspace.
    ///
    /// All shard locks are held, taken in index order, until the watches
    /// are invalidated.
    pub fn flush(&self) {
        let mut guards: Vec<_> = self
            .shards
            .iter()
            .map(|s| s.write().unwrap_or_else(PoisonError::into_inner))
            .collect();
        for data in guards.iter_mut() {
            data.clear();
        }
        self.watches.touch_keyspace(self.index);
    }
}
