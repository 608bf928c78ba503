//! Built-in Session Commands
//!
//! The commands every session understands regardless of what the hosting
//! application registers on top.
//!
//! ### Connection Commands
//! - `PING [message]` - Test connection
//! - `ECHO message` - Echo message
//! - `QUIT` - Reply OK, then close once output is flushed
//! - `DEBUG SLEEP seconds` - Reply OK after a delay, asynchronously
//!
//! ### Transaction Commands
//! - `MULTI` - Start queuing
//! - `EXEC` - Run the queue, or abort with a null array if a watched key changed
//! - `DISCARD` - Drop the queue and release watches
//! - `WATCH key [key ...]` - Abort the next EXEC if any of these keys change
//! - `UNWATCH` - Release all watches

use crate::commands::dispatcher::Dispatcher;
use crate::commands::error::{CloseConnection, CommandError, CommandResult};
use crate::protocol::Response;
use crate::session::{Deferred, Session};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, trace};

/// Registers every built-in handler.
pub fn register(dispatcher: &mut Dispatcher) {
    dispatcher.register("PING", cmd_ping);
    dispatcher.register("ECHO", cmd_echo);
    dispatcher.register("QUIT", cmd_quit);
    dispatcher.register("DEBUG", cmd_debug);
    dispatcher.register("MULTI", cmd_multi);
    dispatcher.register("EXEC", cmd_exec);
    dispatcher.register("DISCARD", cmd_discard);
    dispatcher.register("WATCH", cmd_watch);
    dispatcher.register("UNWATCH", cmd_unwatch);
}

// ========================================================================
// Connection Commands
// ========================================================================

/// PING [message]
fn cmd_ping(_session: &mut Session, args: &[Bytes]) -> CommandResult {
    match args {
        [] => Ok(Response::PONG),
        [message] => Ok(Response::bulk(message.clone())),
        _ => Err(CommandError::arity("PING")),
    }
}

/// ECHO message
fn cmd_echo(_session: &mut Session, args: &[Bytes]) -> CommandResult {
    match args {
        [message] => Ok(Response::bulk(message.clone())),
        _ => Err(CommandError::arity("ECHO")),
    }
}

/// QUIT
fn cmd_quit(_session: &mut Session, _args: &[Bytes]) -> CommandResult {
    Err(CommandError::Close(CloseConnection::with_reply(Response::OK)))
}

/// DEBUG subcommand [args]
fn cmd_debug(_session: &mut Session, args: &[Bytes]) -> CommandResult {
    let Some((subcommand, rest)) = args.split_first() else {
        return Err(CommandError::arity("DEBUG"));
    };

    let subcommand = String::from_utf8_lossy(subcommand).to_ascii_uppercase();
    match subcommand.as_str() {
        "SLEEP" => match rest {
            [seconds] => debug_sleep(seconds),
            _ => Err(CommandError::arity("DEBUG SLEEP")),
        },
        _ => Err(CommandError::failed(format!(
            "unknown DEBUG subcommand '{}'",
            subcommand
        ))),
    }
}

/// Replies OK after `seconds`, without blocking the connection.
fn debug_sleep(seconds: &Bytes) -> CommandResult {
    let seconds: f64 = std::str::from_utf8(seconds)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|s: &f64| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| CommandError::failed("value is not a valid float"))?;

    if seconds == 0.0 {
        return Ok(Response::OK);
    }

    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| CommandError::failed("DEBUG SLEEP requires a running runtime"))?;

    let delay = Duration::from_secs_f64(seconds);
    let (mut completion, deferred) = Deferred::channel();
    runtime.spawn(async move {
        let elapsed = tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = completion.cancelled() => false,
        };
        if elapsed {
            completion.complete(Response::OK);
        } else {
            trace!("DEBUG SLEEP cancelled");
        }
    });

    Ok(Response::Deferred(deferred))
}

// ========================================================================
// Transaction Commands
// ========================================================================

/// MULTI
fn cmd_multi(session: &mut Session, args: &[Bytes]) -> CommandResult {
    if !args.is_empty() {
        return Err(CommandError::arity("MULTI"));
    }
    session.transaction_mut().begin()?;
    Ok(Response::OK)
}

/// EXEC
///
/// Watches are always released, whether the transaction commits or not.
/// A deferred result from a queued command cannot reach the client, so it
/// is cancelled and contributes a null bulk value to the array.
fn cmd_exec(session: &mut Session, args: &[Bytes]) -> CommandResult {
    if !args.is_empty() {
        return Err(CommandError::arity("EXEC"));
    }

    let queued = session.transaction_mut().take()?;
    let intact = session.watch_intact();
    session.unwatch();

    if !intact {
        debug!(
            session = session.id(),
            discarded = queued.len(),
            "EXEC aborted, watched key was modified"
        );
        return Ok(Response::NIL_ARRAY);
    }

    let dispatcher = session.dispatcher();
    let mut replies = Vec::with_capacity(queued.len());
    for invocation in &queued {
        match dispatcher.execute_queued(session, invocation)? {
            Response::Deferred(deferred) => {
                deferred.cancel();
                replies.push(Response::NIL);
            }
            response => replies.push(response),
        }
    }

    Ok(Response::Array(replies))
}

/// DISCARD
fn cmd_discard(session: &mut Session, args: &[Bytes]) -> CommandResult {
    if !args.is_empty() {
        return Err(CommandError::arity("DISCARD"));
    }
    if !session.is_queuing() {
        return Err(CommandError::DiscardWithoutMulti);
    }
    session.unwatch();
    session.transaction_mut().discard()?;
    Ok(Response::OK)
}

/// WATCH key [key ...]
fn cmd_watch(session: &mut Session, args: &[Bytes]) -> CommandResult {
    if session.is_queuing() {
        return Err(CommandError::WatchInsideMulti);
    }
    if args.is_empty() {
        return Err(CommandError::arity("WATCH"));
    }
    session.watch(args);
    Ok(Response::OK)
}

/// UNWATCH
fn cmd_unwatch(session: &mut Session, _args: &[Bytes]) -> CommandResult {
    session.unwatch();
    Ok(Response::OK)
}
