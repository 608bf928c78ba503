//! Optimistic Locking (WATCH)
//!
//! This module tracks which sessions are interested in which keys, so that
//! a transaction can be aborted when any of its watched keys changed before
//! EXEC, without holding a lock across the whole interval.
//!
//! ## Modules
//!
//! - `registry`: The shared `(keyspace, key) -> [watcher]` map and the
//!   invalidation hook storage calls after every write
//! - `watcher`: The per-session token WATCH binds keys to
//!
//! ## Example
//!
//! ```
//! use respline::watch::{WatchRegistry, Watcher};
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(WatchRegistry::new());
//! let watcher = Watcher::new(Arc::clone(&registry));
//! watcher.bind(0, &[Bytes::from("balance")]);
//!
//! // Another connection writes the key...
//! registry.touch(0, b"balance");
//!
//! assert!(!watcher.is_bound());
//! ```

pub mod registry;
pub mod watcher;

pub use registry::{WatchKey, WatchRegistry, WatcherId};
pub use watcher::Watcher;
