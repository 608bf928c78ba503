//! Command Errors
//!
//! Everything a handler can fail with. The dispatcher turns every variant
//! into an `Error` reply, except [`CommandError::Close`], which carries the
//! request to terminate the connection past the dispatcher.

use crate::protocol::Response;
use thiserror::Error;

/// Broad classification of a [`CommandError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownCommand,
    NestedTransaction,
    HandlerFailure,
    Close,
}

/// Distinguished signal asking the connection to flush and close.
///
/// `reply`, when present, is written before closing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseConnection {
    pub reply: Option<Response>,
}

impl CloseConnection {
    pub fn new() -> Self {
        Self { reply: None }
    }

    pub fn with_reply(reply: Response) -> Self {
        Self { reply: Some(reply) }
    }
}

impl Default for CloseConnection {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised by command handlers.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("MULTI nesting not allowed")]
    NestedTransaction,

    #[error("EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("DISCARD without MULTI")]
    DiscardWithoutMulti,

    #[error("WATCH inside MULTI is not allowed")]
    WatchInsideMulti,

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("{0}")]
    Failed(String),

    #[error("connection close requested")]
    Close(CloseConnection),
}

impl CommandError {
    /// Shorthand for an arity error; the command name is shown lower-case.
    pub fn arity(command: &str) -> Self {
        CommandError::WrongArity(command.to_ascii_lowercase())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        CommandError::Failed(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            CommandError::NestedTransaction => ErrorKind::NestedTransaction,
            CommandError::Close(_) => ErrorKind::Close,
            _ => ErrorKind::HandlerFailure,
        }
    }

    /// The `Error` reply a client sees for this failure.
    pub fn to_response(&self) -> Response {
        Response::error(format!("ERR {}", self))
    }
}

impl From<CloseConnection> for CommandError {
    fn from(close: CloseConnection) -> Self {
        CommandError::Close(close)
    }
}

/// Result type returned by every handler.
pub type CommandResult = Result<Response, CommandError>;
