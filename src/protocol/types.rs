//! Reply Model and Wire Encoding
//!
//! This module defines [`Response`], the closed set of replies a session can
//! send back to a client, and the exact RESP bytes each one encodes to.
//!
//! ## Protocol Format
//!
//! Each reply starts with a type prefix byte and is terminated with CRLF:
//!
//! | Reply            | Encoding                     |
//! |------------------|------------------------------|
//! | `Status(s)`      | `+s\r\n`                     |
//! | `Error(s)`       | `-s\r\n`                     |
//! | `Integer(n)`     | `:n\r\n`                     |
//! | `Nil`            | `$-1\r\n`                    |
//! | `Bulk(b)`        | `$len\r\n` + `b` + `\r\n`    |
//! | `NilArray`       | `*-1\r\n`                    |
//! | `Array(items)`   | `*count\r\n` + each item     |
//! | `Raw(bytes)`     | `bytes` verbatim             |
//!
//! `Deferred` has no encoding of its own: the connection waits for the
//! handle to complete and encodes whatever it completes with.

use crate::session::Deferred;
use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply produced by a command handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Single-line status, e.g. `+OK`. Must not contain CRLF.
    Status(Cow<'static, str>),

    /// Single-line error, e.g. `-ERR unknown command 'FOO'`.
    Error(Cow<'static, str>),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe, length-prefixed value.
    Bulk(Bytes),

    /// The null bulk value, `$-1`.
    Nil,

    /// Count-prefixed sequence of replies, possibly nested.
    Array(Vec<Response>),

    /// The null array, `*-1`. EXEC replies with this when a watched key changed.
    NilArray,

    /// Pre-encoded bytes spliced into the output without re-encoding.
    Raw(Bytes),

    /// A reply that is not available yet.
    Deferred(Deferred),
}

impl Response {
    pub const OK: Response = Response::Status(Cow::Borrowed("OK"));
    pub const PONG: Response = Response::Status(Cow::Borrowed("PONG"));
    pub const QUEUED: Response = Response::Status(Cow::Borrowed("QUEUED"));
    pub const NIL: Response = Response::Nil;
    pub const NIL_ARRAY: Response = Response::NilArray;
    pub const ZERO: Response = Response::Integer(0);
    pub const ONE: Response = Response::Integer(1);

    /// Creates a new status reply.
    ///
    /// # Example
    /// ```
    /// use respline::protocol::Response;
    /// assert_eq!(Response::status("OK"), Response::OK);
    /// ```
    pub fn status(s: impl Into<Cow<'static, str>>) -> Self {
        Response::Status(s.into())
    }

    /// Creates a new error reply. The text is sent as-is, so it should
    /// already carry its `ERR` prefix.
    pub fn error(s: impl Into<Cow<'static, str>>) -> Self {
        Response::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Response::Integer(n)
    }

    /// Integer reply for a boolean outcome, using the shared `0`/`1` instances.
    pub fn boolean(b: bool) -> Self {
        if b {
            Response::ONE
        } else {
            Response::ZERO
        }
    }

    /// Creates a new bulk reply.
    ///
    /// # Example
    /// ```
    /// use respline::protocol::Response;
    /// assert_eq!(Response::bulk("hi").serialize(), b"$2\r\nhi\r\n");
    /// ```
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Response::Bulk(data.into())
    }

    /// Bulk reply for `Some`, null bulk for `None`.
    pub fn optional_bulk(data: Option<Bytes>) -> Self {
        data.map_or(Response::NIL, Response::Bulk)
    }

    pub fn array(values: Vec<Response>) -> Self {
        Response::Array(values)
    }

    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        Response::Raw(bytes.into())
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    ///
    /// A `Deferred` encodes as the null bulk value. The connection never
    /// hands one to the encoder directly; it can only show up nested inside
    /// an array built by a handler, where it has no value to contribute.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Response::Status(s) => line(buf, prefix::STATUS, s.as_bytes()),
            Response::Error(s) => line(buf, prefix::ERROR, s.as_bytes()),
            Response::Integer(n) => line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            Response::Bulk(data) => {
                line(buf, prefix::BULK, data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Response::Nil | Response::Deferred(_) => line(buf, prefix::BULK, b"-1"),
            Response::Array(values) => {
                line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
                for value in values {
                    value.serialize_into(buf);
                }
            }
            Response::NilArray => line(buf, prefix::ARRAY, b"-1"),
            Response::Raw(bytes) => buf.extend_from_slice(bytes),
        }
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// Returns true if this reply is still pending.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Response::Deferred(_))
    }

    /// Attempts to extract the inner array.
    pub fn as_array(&self) -> Option<&[Response]> {
        match self {
            Response::Array(values) => Some(values),
            _ => None,
        }
    }
}

#[inline]
fn line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Status(s) => write!(f, "{}", s),
            Response::Error(s) => write!(f, "(error) {}", s),
            Response::Integer(n) => write!(f, "(integer) {}", n),
            Response::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Response::Nil => write!(f, "(nil)"),
            Response::NilArray => write!(f, "(nil array)"),
            Response::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            Response::Array(values) => {
                writeln!(f)?;
                for (i, v) in values.iter().enumerate() {
                    writeln!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
            Response::Raw(bytes) => write!(f, "(raw, {} bytes)", bytes.len()),
            Response::Deferred(d) => write!(f, "(deferred #{})", d.id()),
        }
    }
}
