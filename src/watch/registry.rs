//! Shared Watcher Registry
//!
//! The one piece of state shared by every session: for each watched
//! `(keyspace, key)` pair, the list of watcher tokens interested in it.
//!
//! ## Concurrency Model
//!
//! Sessions run on many tokio worker threads at once, so every mutation
//! happens under a single mutex: inserting interest, removing it, and the
//! `Bound -> Unbound` transition of a token. A token's flag is only ever
//! cleared while the lock is held, and interest is only ever added after
//! checking the flag under that same lock, so an invalidated token can never
//! be re-added to a key's list.
//!
//! ```text
//!   Session A (WATCH k)            Keyspace (SET k)
//!        │                               │
//!        ▼                               ▼
//!  register_interest(0, k) ──┐   ┌── touch(0, k)
//!                            ▼   ▼
//!                  ┌────────────────────────┐
//!                  │ Mutex<RegistryState>   │
//!                  │  interest: key -> [id] │
//!                  │  watchers: id -> keys  │
//!                  └────────────────────────┘
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Stable identity of a watcher token.
pub type WatcherId = u64;

/// A watched key, qualified by the keyspace it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub keyspace: usize,
    pub key: Bytes,
}

impl WatchKey {
    pub fn new(keyspace: usize, key: impl Into<Bytes>) -> Self {
        Self {
            keyspace,
            key: key.into(),
        }
    }
}

/// Everything the registry knows about one bound token.
#[derive(Debug)]
struct Binding {
    flag: Arc<AtomicBool>,
    keys: Vec<WatchKey>,
}

#[derive(Debug, Default)]
struct RegistryState {
    interest: HashMap<WatchKey, Vec<WatcherId>>,
    watchers: HashMap<WatcherId, Binding>,
}

/// Keyed registry of interested watchers plus the invalidation hook.
///
/// Storage engines call [`touch`](WatchRegistry::touch) after every write;
/// sessions go through [`Watcher`](crate::watch::Watcher) rather than
/// calling the interest methods directly.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn allocate_id(&self) -> WatcherId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds `id` to the interest list of `key`.
    ///
    /// Returns `false` without touching anything when the token is already
    /// unbound or already bound to this key.
    pub fn register_interest(&self, id: WatcherId, flag: &Arc<AtomicBool>, key: WatchKey) -> bool {
        let mut state = self.lock();
        if !flag.load(Ordering::Acquire) {
            return false;
        }

        let binding = state.watchers.entry(id).or_insert_with(|| Binding {
            flag: Arc::clone(flag),
            keys: Vec::new(),
        });
        if binding.keys.contains(&key) {
            return false;
        }
        binding.keys.push(key.clone());
        state.interest.entry(key).or_default().push(id);
        true
    }

    /// Removes `id` from the interest list of a single key.
    pub fn unregister_interest(&self, id: WatcherId, key: &WatchKey) -> bool {
        let mut state = self.lock();
        let Some(binding) = state.watchers.get_mut(&id) else {
            return false;
        };
        let before = binding.keys.len();
        binding.keys.retain(|k| k != key);
        if binding.keys.len() == before {
            return false;
        }
        if binding.keys.is_empty() {
            state.watchers.remove(&id);
        }
        remove_from_list(&mut state, key, id);
        true
    }

    /// Detaches `id` from every key and marks it unbound. Idempotent.
    pub fn release(&self, id: WatcherId) {
        let mut state = self.lock();
        detach(&mut state, id);
    }

    /// Invalidation hook: `key` in `keyspace` was modified.
    ///
    /// Every token interested in the key transitions to unbound and is
    /// removed from all of its other lists. Returns how many tokens were
    /// invalidated.
    pub fn touch(&self, keyspace: usize, key: &[u8]) -> usize {
        let mut state = self.lock();
        if state.interest.is_empty() {
            return 0;
        }
        let watch_key = WatchKey::new(keyspace, Bytes::copy_from_slice(key));
        let Some(ids) = state.interest.remove(&watch_key) else {
            return 0;
        };
        for id in &ids {
            detach(&mut state, *id);
        }
        trace!(keyspace, invalidated = ids.len(), "Watched key touched");
        ids.len()
    }

    /// Invalidates every token watching any key of `keyspace`, as a
    /// keyspace-wide flush must.
    pub fn touch_keyspace(&self, keyspace: usize) -> usize {
        let mut state = self.lock();
        let ids: Vec<WatcherId> = state
            .watchers
            .iter()
            .filter(|(_, b)| b.keys.iter().any(|k| k.keyspace == keyspace))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            detach(&mut state, *id);
        }
        ids.len()
    }

    /// Number of tokens currently interested in `key`.
    pub fn interested(&self, keyspace: usize, key: &[u8]) -> usize {
        let watch_key = WatchKey::new(keyspace, Bytes::copy_from_slice(key));
        self.lock().interest.get(&watch_key).map_or(0, Vec::len)
    }

    /// Number of distinct keys with at least one interested token.
    pub fn watched_keys(&self) -> usize {
        self.lock().interest.len()
    }

    /// Number of tokens bound to at least one key.
    pub fn watchers(&self) -> usize {
        self.lock().watchers.len()
    }
}

fn detach(state: &mut RegistryState, id: WatcherId) {
    let Some(binding) = state.watchers.remove(&id) else {
        return;
    };
    binding.flag.store(false, Ordering::Release);
    for key in &binding.keys {
        remove_from_list(state, key, id);
    }
}

fn remove_from_list(state: &mut RegistryState, key: &WatchKey, id: WatcherId) {
    if let Some(list) = state.interest.get_mut(key) {
        list.retain(|w| *w != id);
        if list.is_empty() {
            state.interest.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(registry: &WatchRegistry) -> (WatcherId, Arc<AtomicBool>) {
        (registry.allocate_id(), Arc::new(AtomicBool::new(true)))
    }

    #[test]
    fn test_register_and_duplicate() {
        let registry = WatchRegistry::new();
        let (id, flag) = token(&registry);

        assert!(registry.register_interest(id, &flag, WatchKey::new(0, "k")));
        assert!(!registry.register_interest(id, &flag, WatchKey::new(0, "k")));
        assert_eq!(registry.interested(0, b"k"), 1);
        assert_eq!(registry.interested(1, b"k"), 0);
    }

    #[test]
    fn test_touch_detaches_from_every_key() {
        let registry = WatchRegistry::new();
        let (a, flag_a) = token(&registry);
        let (b, flag_b) = token(&registry);

        registry.register_interest(a, &flag_a, WatchKey::new(0, "x"));
        registry.register_interest(a, &flag_a, WatchKey::new(0, "y"));
        registry.register_interest(b, &flag_b, WatchKey::new(0, "y"));

        assert_eq!(registry.touch(0, b"x"), 1);
        assert!(!flag_a.load(Ordering::Acquire));
        assert!(flag_b.load(Ordering::Acquire));
        assert_eq!(registry.interested(0, b"y"), 1);
        assert_eq!(registry.watchers(), 1);
    }

    #[test]
    fn test_unbound_token_is_never_re_added() {
        let registry = WatchRegistry::new();
        let (id, flag) = token(&registry);

        registry.register_interest(id, &flag, WatchKey::new(0, "k"));
        registry.touch(0, b"k");
        assert!(!registry.register_interest(id, &flag, WatchKey::new(0, "other")));
        assert_eq!(registry.watched_keys(), 0);
    }

    #[test]
    fn test_touch_unwatched_key() {
        let registry = WatchRegistry::new();
        assert_eq!(registry.touch(0, b"nobody"), 0);
    }

    #[test]
    fn test_unregister_single_key() {
        let registry = WatchRegistry::new();
        let (id, flag) = token(&registry);

        registry.register_interest(id, &flag, WatchKey::new(0, "a"));
        registry.register_interest(id, &flag, WatchKey::new(0, "b"));

        assert!(registry.unregister_interest(id, &WatchKey::new(0, "a")));
        assert!(!registry.unregister_interest(id, &WatchKey::new(0, "a")));
        assert_eq!(registry.interested(0, b"a"), 0);
        assert_eq!(registry.interested(0, b"b"), 1);
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = WatchRegistry::new();
        let (id, flag) = token(&registry);

        registry.register_interest(id, &flag, WatchKey::new(0, "k"));
        registry.release(id);
        registry.release(id);

        assert!(!flag.load(Ordering::Acquire));
        assert_eq!(registry.watched_keys(), 0);
        assert_eq!(registry.watchers(), 0);
    }

    #[test]
    fn test_touch_keyspace() {
        let registry = WatchRegistry::new();
        let (a, flag_a) = token(&registry);
        let (b, flag_b) = token(&registry);

        registry.register_interest(a, &flag_a, WatchKey::new(0, "k"));
        registry.register_interest(b, &flag_b, WatchKey::new(1, "k"));

        assert_eq!(registry.touch_keyspace(0), 1);
        assert!(!flag_a.load(Ordering::Acquire));
        assert!(flag_b.load(Ordering::Acquire));
    }
}
