//! Command Handling Module
//!
//! This module maps command names to handlers and provides the commands
//! the session engine itself understands.
//!
//! ## Architecture
//!
//! ```text
//! Session::handle
//!       │
//!       ▼
//! ┌─────────────────┐
//! │   Dispatcher    │  (this module)
//! │                 │
//! │  - Lookup       │
//! │  - Invoke       │
//! │  - Convert err  │
//! └────────┬────────┘
//!          │
//!          ├──> builtin   (PING, ECHO, QUIT, DEBUG, MULTI, EXEC, ...)
//!          └──> strings   (GET, SET, INCR, ... over a Keyspace)
//! ```
//!
//! Hosting applications add their own commands with
//! [`Dispatcher::register`] before sharing the dispatcher.

pub mod builtin;
pub mod dispatcher;
pub mod error;
pub mod strings;

pub use dispatcher::{Dispatcher, Handler};
pub use error::{CloseConnection, CommandError, CommandResult, ErrorKind};
