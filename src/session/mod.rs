//! Session State Machine
//!
//! Everything a single connection remembers between frames, and the logic
//! that sequences one frame through it.
//!
//! ## Modules
//!
//! - `state`: The `Session` itself and its per-frame `handle` entry point
//! - `transaction`: MULTI queue and the set of commands exempt from it
//! - `deferred`: Deferred reply handles and the one-outstanding tracker
//!
//! ## Example
//!
//! ```
//! use respline::commands::Dispatcher;
//! use respline::protocol::{Invocation, Response};
//! use respline::session::{Reply, Session};
//! use respline::watch::WatchRegistry;
//! use std::sync::Arc;
//!
//! let mut session = Session::new(Arc::new(Dispatcher::new()), Arc::new(WatchRegistry::new()));
//!
//! session.handle(Invocation::from_strs(&["MULTI"]));
//! let queued = session.handle(Invocation::from_strs(&["PING"]));
//! assert_eq!(queued, Reply::Immediate(Response::QUEUED));
//!
//! let reply = session.handle(Invocation::from_strs(&["EXEC"]));
//! assert_eq!(reply, Reply::Immediate(Response::array(vec![Response::PONG])));
//! ```

pub mod deferred;
pub mod state;
pub mod transaction;

pub use deferred::{Completion, Deferred, DeferredTracker};
pub use state::{Reply, Session};
pub use transaction::{is_exempt, TransactionQueue, EXEMPT_WHILE_QUEUING};
