//! Storage Module
//!
//! A sharded in-memory string keyspace backing the sample string commands.
//! It exists so that WATCH has real writes to observe: each mutation is
//! reported to the shared [`WatchRegistry`](crate::watch::WatchRegistry).
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **Watch Notification**: Every write touches the key in the registry;
//!   FLUSHDB touches the whole keyspace
//!
//! ## Example
//!
//! ```
//! use respline::storage::Keyspace;
//! use respline::watch::WatchRegistry;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let keyspace = Keyspace::new(0, Arc::new(WatchRegistry::new()));
//!
//! keyspace.set(Bytes::from("visits"), Bytes::from("41"));
//! assert_eq!(keyspace.incr_by(&Bytes::from("visits"), 1), Ok(42));
//! ```

pub mod keyspace;

pub use keyspace::{Keyspace, StorageError};
