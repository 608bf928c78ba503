//! Command Dispatcher
//!
//! Maps an upper-case command name to its handler, invokes it, and turns
//! handler failures into `Error` replies.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │   lookup    │───>│   invoke    │───>│   convert   │     │
//! │  │ (HashMap)   │    │  handler    │    │  errors     │     │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘     │
//! │                                               │             │
//! │                         Ok(Response) <────────┤             │
//! │                  Err(CloseConnection) <───────┘             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The table is filled once, before the dispatcher is shared between
//! connections behind an `Arc`. A missing entry is the only way to get an
//! unknown-command reply.

use crate::commands::builtin;
use crate::commands::error::{CloseConnection, CommandError, CommandResult};
use crate::protocol::{Invocation, Response};
use crate::session::Session;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// A command handler: receives the calling session and the arguments that
/// follow the command name.
pub type Handler = Arc<dyn Fn(&mut Session, &[Bytes]) -> CommandResult + Send + Sync>;

/// Registered command table.
pub struct Dispatcher {
    handlers: HashMap<String, Handler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with the built-in session commands registered:
    /// PING, ECHO, QUIT, DEBUG, MULTI, EXEC, DISCARD, WATCH and UNWATCH.
    pub fn new() -> Self {
        let mut dispatcher = Self::empty();
        builtin::register(&mut dispatcher);
        dispatcher
    }

    /// Creates a dispatcher with no commands at all.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` under `name` (case-insensitive), replacing any
    /// previous handler with that name.
    ///
    /// # Example
    ///
    /// ```
    /// use respline::commands::{CommandError, Dispatcher};
    /// use respline::protocol::Response;
    ///
    /// let mut dispatcher = Dispatcher::new();
    /// dispatcher.register("hello", |_session, args| match args {
    ///     [name] => Ok(Response::bulk(name.clone())),
    ///     _ => Err(CommandError::arity("hello")),
    /// });
    /// assert!(dispatcher.contains("HELLO"));
    /// ```
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&mut Session, &[Bytes]) -> CommandResult + Send + Sync + 'static,
    {
        self.handlers
            .insert(name.to_ascii_uppercase(), Arc::new(handler));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&name.to_ascii_uppercase())
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs one invocation against `session`.
    ///
    /// Every failure becomes an `Error` reply and the connection stays
    /// usable. Only a close request escapes, as `Err`.
    pub fn dispatch(
        &self,
        session: &mut Session,
        invocation: &Invocation,
    ) -> Result<Response, CloseConnection> {
        let name = invocation.command_name();
        let Some(handler) = self.handlers.get(&name) else {
            debug!(command = %name, "Unknown command");
            return Ok(CommandError::UnknownCommand(name).to_response());
        };

        match (**handler)(session, invocation.args()) {
            Ok(response) => Ok(response),
            Err(CommandError::Close(close)) => {
                debug!(command = %name, "Handler requested connection close");
                Err(close)
            }
            Err(e) => {
                debug!(command = %name, error = %e, "Command failed");
                Ok(e.to_response())
            }
        }
    }

    /// Runs one invocation drained from a transaction buffer.
    ///
    /// Same semantics as [`dispatch`](Self::dispatch); EXEC calls it once
    /// per buffered command, in order.
    pub fn execute_queued(
        &self,
        session: &mut Session,
        invocation: &Invocation,
    ) -> Result<Response, CloseConnection> {
        trace!(command = %invocation, "Executing queued command");
        self.dispatch(session, invocation)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.commands())
            .finish()
    }
}
