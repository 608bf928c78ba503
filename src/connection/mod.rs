//! Connection Handler Module
//!
//! This module manages individual client connections. Each client
//! connection is handled by its own async task that owns one
//! [`Session`](crate::session::Session).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (main.rs)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task with Session::new(..)
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Decode      │───>│ Session     │     │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘     │
//! │         ▲                                     │             │
//! │         │ select!                             ▼             │
//! │  ┌──────┴──────┐                      ┌─────────────┐       │
//! │  │ Deferred    │─────────────────────>│ Send reply  │       │
//! │  │ completion  │                      └─────────────┘       │
//! │  └─────────────┘                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Pipelining**: Every frame in a read is handled before one flush
//! - **Deferred Replies**: Written as soon as they complete, without
//!   blocking synchronous replies
//! - **Graceful Close**: A close request flushes pending output first
//! - **Statistics**: Tracks connection and command metrics
//!
//! ## Example
//!
//! ```ignore
//! use respline::commands::Dispatcher;
//! use respline::connection::{handle_connection, ConnectionStats};
//! use respline::session::Session;
//! use respline::watch::WatchRegistry;
//! use std::sync::Arc;
//!
//! let dispatcher = Arc::new(Dispatcher::new());
//! let registry = Arc::new(WatchRegistry::new());
//! let stats = Arc::new(ConnectionStats::new());
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! let session = Session::new(Arc::clone(&dispatcher), Arc::clone(&registry));
//! tokio::spawn(handle_connection(stream, addr, session, stats));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
