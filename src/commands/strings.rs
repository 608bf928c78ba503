//! String Commands
//!
//! A small keyspace-backed command set that hosting applications can
//! register next to the built-ins. Every write goes through [`Keyspace`],
//! so it invalidates the watchers of the keys it touches.
//!
//! - `GET key`
//! - `SET key value [NX|XX]`
//! - `DEL key [key ...]`
//! - `EXISTS key [key ...]`
//! - `INCR key` / `INCRBY key increment`
//! - `DECR key` / `DECRBY key decrement`
//! - `APPEND key value`
//! - `DBSIZE`
//! - `FLUSHDB`

use crate::commands::dispatcher::Dispatcher;
use crate::commands::error::{CommandError, CommandResult};
use crate::protocol::Response;
use crate::storage::{Keyspace, StorageError};
use bytes::Bytes;
use std::sync::Arc;

type StringHandler = fn(&Keyspace, &[Bytes]) -> CommandResult;

/// Registers the string commands against `keyspace`.
pub fn register(dispatcher: &mut Dispatcher, keyspace: Arc<Keyspace>) {
    let table: [(&str, StringHandler); 11] = [
        ("GET", cmd_get),
        ("SET", cmd_set),
        ("DEL", cmd_del),
        ("EXISTS", cmd_exists),
        ("INCR", cmd_incr),
        ("INCRBY", cmd_incrby),
        ("DECR", cmd_decr),
        ("DECRBY", cmd_decrby),
        ("APPEND", cmd_append),
        ("DBSIZE", cmd_dbsize),
        ("FLUSHDB", cmd_flushdb),
    ];

    for (name, handler) in table {
        let keyspace = Arc::clone(&keyspace);
        dispatcher.register(name, move |_session, args| handler(&keyspace, args));
    }
}

fn parse_integer(arg: &Bytes) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)
}

impl From<StorageError> for CommandError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotAnInteger => CommandError::NotAnInteger,
            other => CommandError::failed(other.to_string()),
        }
    }
}

/// GET key
fn cmd_get(keyspace: &Keyspace, args: &[Bytes]) -> CommandResult {
    match args {
        [key] => Ok(Response::optional_bulk(keyspace.get(key))),
        _ => Err(CommandError::arity("GET")),
    }
}

/// SET key value [NX|XX]
fn cmd_set(keyspace: &Keyspace, args: &[Bytes]) -> CommandResult {
    let [key, value, options @ ..] = args else {
        return Err(CommandError::arity("SET"));
    };

    let mut nx = false;
    let mut xx = false;
    for option in options {
        match option.to_ascii_uppercase().as_slice() {
            b"NX" => nx = true,
            b"XX" => xx = true,
            _ => return Err(CommandError::failed("syntax error")),
        }
    }
    if nx && xx {
        return Err(CommandError::failed("syntax error"));
    }

    let exists = keyspace.exists(key);
    if (nx && exists) || (xx && !exists) {
        return Ok(Response::NIL);
    }

    keyspace.set(key.clone(), value.clone());
    Ok(Response::OK)
}

/// DEL key [key ...]
fn cmd_del(keyspace: &Keyspace, args: &[Bytes]) -> CommandResult {
    if args.is_empty() {
        return Err(CommandError::arity("DEL"));
    }
    let removed = args.iter().filter(|key| keyspace.delete(key)).count();
    Ok(Response::integer(removed as i64))
}

/// EXISTS key [key ...]
fn cmd_exists(keyspace: &Keyspace, args: &[Bytes]) -> CommandResult {
    if args.is_empty() {
        return Err(CommandError::arity("EXISTS"));
    }
    let found = args.iter().filter(|key| keyspace.exists(key)).count();
    Ok(Response::integer(found as i64))
}

/// INCR key
fn cmd_incr(keyspace: &Keyspace, args: &[Bytes]) -> CommandResult {
    match args {
        [key] => Ok(Response::integer(keyspace.incr_by(key, 1)?)),
        _ => Err(CommandError::arity("INCR")),
    }
}

/// INCRBY key increment
fn cmd_incrby(keyspace: &Keyspace, args: &[Bytes]) -> CommandResult {
    match args {
        [key, delta] => {
            let delta = parse_integer(delta)?;
            Ok(Response::integer(keyspace.incr_by(key, delta)?))
        }
        _ => Err(CommandError::arity("INCRBY")),
    }
}

/// DECR key
fn cmd_decr(keyspace: &Keyspace, args: &[Bytes]) -> CommandResult {
    match args {
        [key] => Ok(Response::integer(keyspace.incr_by(key, -1)?)),
        _ => Err(CommandError::arity("DECR")),
    }
}

/// DECRBY key decrement
fn cmd_decrby(keyspace: &Keyspace, args: &[Bytes]) -> CommandResult {
    match args {
        [key, delta] => {
            let delta = parse_integer(delta)?
                .checked_neg()
                .ok_or(CommandError::NotAnInteger)?;
            Ok(Response::integer(keyspace.incr_by(key, delta)?))
        }
        _ => Err(CommandError::arity("DECRBY")),
    }
}

/// APPEND key value
fn cmd_append(keyspace: &Keyspace, args: &[Bytes]) -> CommandResult {
    match args {
        [key, value] => Ok(Response::integer(keyspace.append(key, value) as i64)),
        _ => Err(CommandError::arity("APPEND")),
    }
}

/// DBSIZE
fn cmd_dbsize(keyspace: &Keyspace, args: &[Bytes]) -> CommandResult {
    if !args.is_empty() {
        return Err(CommandError::arity("DBSIZE"));
    }
    Ok(Response::integer(keyspace.len() as i64))
}

/// FLUSHDB
fn cmd_flushdb(keyspace: &Keyspace, args: &[Bytes]) -> CommandResult {
    if !args.is_empty() {
        return Err(CommandError::arity("FLUSHDB"));
    }
    keyspace.flush();
    Ok(Response::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Invocation;
    use crate::session::{Reply, Session};
    use crate::watch::WatchRegistry;

    struct Fixture {
        dispatcher: Arc<Dispatcher>,
        registry: Arc<WatchRegistry>,
        keyspace: Arc<Keyspace>,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(WatchRegistry::new());
            let keyspace = Arc::new(Keyspace::new(0, Arc::clone(&registry)));
            let mut dispatcher = Dispatcher::new();
            register(&mut dispatcher, Arc::clone(&keyspace));
            Self {
                dispatcher: Arc::new(dispatcher),
                registry,
                keyspace,
            }
        }

        fn session(&self) -> Session {
            Session::new(Arc::clone(&self.dispatcher), Arc::clone(&self.registry))
        }
    }

    fn run(session: &mut Session, parts: &[&str]) -> Response {
        match session.handle(Invocation::from_strs(parts)) {
            Reply::Immediate(response) => response,
            other => panic!("expected an immediate reply, got {:?}", other),
        }
    }

    #[test]
    fn test_set_and_get() {
        let f = Fixture::new();
        let mut s = f.session();

        assert_eq!(run(&mut s, &["GET", "name"]), Response::NIL);
        assert_eq!(run(&mut s, &["SET", "name", "Ariz"]), Response::OK);
        assert_eq!(run(&mut s, &["GET", "name"]), Response::bulk("Ariz"));
        assert_eq!(
            run(&mut s, &["GET"]),
            Response::error("ERR wrong number of arguments for 'get' command")
        );
    }

    #[test]
    fn test_set_nx_xx() {
        let f = Fixture::new();
        let mut s = f.session();

        assert_eq!(run(&mut s, &["SET", "k", "1", "XX"]), Response::NIL);
        assert_eq!(run(&mut s, &["SET", "k", "1", "nx"]), Response::OK);
        assert_eq!(run(&mut s, &["SET", "k", "2", "NX"]), Response::NIL);
        assert_eq!(run(&mut s, &["SET", "k", "3", "XX"]), Response::OK);
        assert_eq!(run(&mut s, &["GET", "k"]), Response::bulk("3"));
        assert_eq!(
            run(&mut s, &["SET", "k", "4", "NX", "XX"]),
            Response::error("ERR syntax error")
        );
    }

    #[test]
    fn test_del_and_exists() {
        let f = Fixture::new();
        let mut s = f.session();

        run(&mut s, &["SET", "a", "1"]);
        run(&mut s, &["SET", "b", "2"]);
        assert_eq!(run(&mut s, &["EXISTS", "a", "b", "c"]), Response::integer(2));
        assert_eq!(run(&mut s, &["DEL", "a", "c"]), Response::ONE);
        assert_eq!(run(&mut s, &["DBSIZE"]), Response::ONE);
    }

    #[test]
    fn test_counters() {
        let f = Fixture::new();
        let mut s = f.session();

        assert_eq!(run(&mut s, &["INCR", "n"]), Response::ONE);
        assert_eq!(run(&mut s, &["INCRBY", "n", "10"]), Response::integer(11));
        assert_eq!(run(&mut s, &["DECR", "n"]), Response::integer(10));
        assert_eq!(run(&mut s, &["DECRBY", "n", "4"]), Response::integer(6));
        assert_eq!(
            run(&mut s, &["INCRBY", "n", "lots"]),
            Response::error("ERR value is not an integer or out of range")
        );

        run(&mut s, &["SET", "word", "hello"]);
        assert_eq!(
            run(&mut s, &["INCR", "word"]),
            Response::error("ERR value is not an integer or out of range")
        );
    }

    #[test]
    fn test_append_and_flushdb() {
        let f = Fixture::new();
        let mut s = f.session();

        assert_eq!(run(&mut s, &["APPEND", "s", "ab"]), Response::integer(2));
        assert_eq!(run(&mut s, &["APPEND", "s", "cd"]), Response::integer(4));
        assert_eq!(run(&mut s, &["FLUSHDB"]), Response::OK);
        assert!(f.keyspace.is_empty());
    }

    #[test]
    fn test_transaction_applies_writes() {
        let f = Fixture::new();
        let mut s = f.session();

        run(&mut s, &["MULTI"]);
        assert_eq!(run(&mut s, &["SET", "k", "v"]), Response::QUEUED);
        assert_eq!(run(&mut s, &["INCR", "n"]), Response::QUEUED);
        assert_eq!(run(&mut s, &["GET", "k"]), Response::QUEUED);
        assert_eq!(f.keyspace.get(b"k"), None);

        assert_eq!(
            run(&mut s, &["EXEC"]),
            Response::array(vec![Response::OK, Response::ONE, Response::bulk("v")])
        );
    }

    #[test]
    fn test_write_from_other_session_aborts_exec() {
        let f = Fixture::new();
        let mut watching = f.session();
        let mut other = f.session();

        run(&mut watching, &["SET", "balance", "100"]);
        assert_eq!(run(&mut watching, &["WATCH", "balance"]), Response::OK);
        run(&mut watching, &["MULTI"]);
        run(&mut watching, &["INCRBY", "balance", "-30"]);

        assert_eq!(run(&mut other, &["SET", "balance", "0"]), Response::OK);

        assert_eq!(run(&mut watching, &["EXEC"]), Response::NIL_ARRAY);
        assert_eq!(f.keyspace.get(b"balance"), Some(Bytes::from("0")));
        assert_eq!(f.registry.watched_keys(), 0);
    }

    #[test]
    fn test_own_write_before_multi_aborts_exec() {
        let f = Fixture::new();
        let mut s = f.session();

        run(&mut s, &["WATCH", "k"]);
        run(&mut s, &["SET", "k", "mine"]);
        run(&mut s, &["MULTI"]);
        run(&mut s, &["GET", "k"]);
        assert_eq!(run(&mut s, &["EXEC"]), Response::NIL_ARRAY);
    }

    #[test]
    fn test_untouched_watch_commits() {
        let f = Fixture::new();
        let mut watching = f.session();
        let mut other = f.session();

        run(&mut watching, &["WATCH", "a"]);
        run(&mut other, &["SET", "b", "1"]);
        run(&mut other, &["GET", "a"]);
        run(&mut watching, &["MULTI"]);
        run(&mut watching, &["SET", "a", "2"]);

        assert_eq!(
            run(&mut watching, &["EXEC"]),
            Response::array(vec![Response::OK])
        );
    }

    #[test]
    fn test_flushdb_aborts_every_watch() {
        let f = Fixture::new();
        let mut watching = f.session();
        let mut other = f.session();

        run(&mut watching, &["WATCH", "never-set"]);
        run(&mut other, &["FLUSHDB"]);
        run(&mut watching, &["MULTI"]);
        run(&mut watching, &["PING"]);
        assert_eq!(run(&mut watching, &["EXEC"]), Response::NIL_ARRAY);
    }
}
