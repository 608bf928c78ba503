//! # Respline - A Redis-Protocol Session Engine
//!
//! Respline is the connection-level core of a Redis-compatible server: it
//! decodes request frames, dispatches them to registered handlers and
//! encodes replies, with the per-connection state machine that makes
//! transactions, optimistic locking and asynchronous replies behave
//! correctly over a byte stream.
//!
//! ## Features
//!
//! - **Transactions**: MULTI / EXEC / DISCARD with per-session queuing
//! - **Optimistic Locking**: WATCH / UNWATCH backed by a shared registry
//!   that storage notifies on every write
//! - **Deferred Replies**: Handlers may answer later; one outstanding
//!   deferred reply per session, cancelled on teardown
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Respline                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    ┌──────────┐  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Session    │───>│Dispatcher│  │
//! │  │ (Listener)  │    │  Handler    │    │             │    │          │  │
//! │  └─────────────┘    └──────┬──────┘    │ Transaction │    └────┬─────┘  │
//! │                            │           │ Watcher     │         │        │
//! │                     ┌──────┴──────┐    │ Deferred    │         ▼        │
//! │                     │ FrameDecoder│    └─────────────┘    ┌──────────┐  │
//! │                     │ Response    │                       │ Keyspace │  │
//! │                     └─────────────┘                       └────┬─────┘  │
//! │                                                                │ touch  │
//! │                                                                ▼        │
//! │                                        ┌─────────────────────────────┐  │
//! │                                        │ WatchRegistry (shared)      │  │
//! │                                        └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use respline::commands::{strings, Dispatcher};
//! use respline::connection::{handle_connection, ConnectionStats};
//! use respline::session::Session;
//! use respline::storage::Keyspace;
//! use respline::watch::WatchRegistry;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(WatchRegistry::new());
//!     let keyspace = Arc::new(Keyspace::new(0, Arc::clone(&registry)));
//!
//!     let mut dispatcher = Dispatcher::new();
//!     strings::register(&mut dispatcher, keyspace);
//!     let dispatcher = Arc::new(dispatcher);
//!
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let session = Session::new(Arc::clone(&dispatcher), Arc::clone(&registry));
//!         tokio::spawn(handle_connection(stream, addr, session, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! ### Session Commands (always registered)
//! - `PING [message]` / `ECHO message` / `QUIT`
//! - `DEBUG SLEEP seconds`
//! - `MULTI` / `EXEC` / `DISCARD`
//! - `WATCH key [key ...]` / `UNWATCH`
//!
//! ### String Commands (`commands::strings::register`)
//! - `GET key` / `SET key value [NX|XX]`
//! - `DEL key [key ...]` / `EXISTS key [key ...]`
//! - `INCR` / `INCRBY` / `DECR` / `DECRBY`
//! - `APPEND key value`
//! - `DBSIZE` / `FLUSHDB`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Reply model, request frames and the frame decoder
//! - [`commands`]: Dispatcher, error conversion and command handlers
//! - [`session`]: Per-connection state: transaction queue, deferred tracker
//! - [`watch`]: Shared watch registry and per-session watcher tokens
//! - [`storage`]: Sharded string keyspace that notifies the watch registry
//! - [`connection`]: Client connection management
//!
//! ## Design Highlights
//!
//! ### Invalidation Without Polling
//!
//! A write touches the registry, which flips the flag of every watcher
//! interested in the key and detaches it from all its keys at once. EXEC
//! only reads that flag, so the check costs the same however many keys
//! were watched.
//!
//! ### Zero-Copy Parsing
//!
//! The decoder slices argument bytes out of the received frame with
//! `bytes::Bytes` instead of copying them.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod watch;

// Re-export commonly used types for convenience
pub use commands::{CloseConnection, CommandError, Dispatcher};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{FrameDecoder, Invocation, ParseError, Response};
pub use session::{Deferred, Reply, Session};
pub use storage::Keyspace;
pub use watch::WatchRegistry;

/// The default port the server listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host the server binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
