//! Incremental Request Frame Decoder
//!
//! Turns the raw byte stream of a connection into [`Invocation`]s.
//!
//! ## How the Decoder Works
//!
//! Bytes are appended with [`FrameDecoder::feed`] (or read straight into
//! [`FrameDecoder::buffer_mut`]) and frames are pulled with
//! [`FrameDecoder::next_frame`], which returns:
//! - `Ok(Some(invocation))` - a complete frame was consumed from the buffer
//! - `Ok(None)` - the buffered bytes do not hold a complete frame yet
//! - `Err(ParseError)` - the stream is malformed and cannot be resynchronized
//!
//! Partial frames stay in the buffer across calls, so a frame split over
//! several TCP reads decodes once its last byte arrives.
//!
//! Two request shapes are accepted: multibulk (`*N\r\n` followed by `N`
//! bulk strings) and inline commands (a whitespace-separated line).
//! Argument bytes are sliced out of the frozen frame without copying.

use crate::protocol::invocation::Invocation;
use crate::protocol::types::{prefix, CRLF};
use bytes::{Bytes, BytesMut};
use std::ops::Range;
use thiserror::Error;

/// Errors that can occur while decoding request frames.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Invalid length or count line
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Bulk string length is negative
    #[error("invalid bulk length: {0}")]
    InvalidBulkLength(i64),

    /// Multibulk count is out of range
    #[error("invalid multibulk length: {0}")]
    InvalidMultibulkLength(i64),

    /// Something other than a bulk string inside a multibulk request
    #[error("expected '$', got '{}'", as_char(.0))]
    UnexpectedByte(u8),

    /// Protocol violation (missing CRLF, etc.)
    #[error("{0}")]
    ProtocolError(String),

    /// The frame exceeds the maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

fn as_char(byte: &u8) -> char {
    char::from(*byte)
}

/// Result type for decoding operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk argument (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of arguments in one multibulk request
pub const MAX_MULTIBULK_LEN: i64 = 1024 * 1024;

/// Maximum length of an inline command line
pub const MAX_INLINE_SIZE: usize = 64 * 1024;

/// Default limit on the buffered bytes of one incomplete frame: a
/// full-size bulk argument plus room for the rest of the command.
pub const MAX_FRAME_SIZE: usize = MAX_BULK_SIZE + MAX_INLINE_SIZE;

/// Outcome of scanning the buffered bytes for one frame.
enum Scan {
    /// Not enough bytes yet.
    Incomplete,
    /// `consumed` bytes form one frame; `parts` index into them.
    /// An empty `parts` is a frame with nothing to run (blank line, `*0`).
    Frame {
        consumed: usize,
        parts: Vec<Range<usize>>,
    },
}

/// Buffers connection input and yields one invocation per complete frame.
///
/// # Example
///
/// ```
/// use respline::protocol::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new();
/// decoder.feed(b"*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n*1\r\n$4\r\nPI");
///
/// let first = decoder.next_frame().unwrap().unwrap();
/// assert_eq!(first.command_name(), "ECHO");
/// assert!(decoder.next_frame().unwrap().is_none());
///
/// decoder.feed(b"NG\r\n");
/// assert_eq!(decoder.next_frame().unwrap().unwrap().command_name(), "PING");
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder whose buffer starts with `capacity` bytes reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            max_frame: MAX_FRAME_SIZE,
        }
    }

    /// Sets how many bytes one incomplete frame may occupy before
    /// [`next_frame`](Self::next_frame) gives up on it.
    pub fn with_frame_limit(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Appends raw bytes received from the client.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Direct access to the input buffer, for reading from a socket into it.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Decodes the next complete frame, if any.
    ///
    /// Blank inline lines and empty multibulks are consumed silently. An
    /// incomplete frame larger than the frame limit is an error.
    pub fn next_frame(&mut self) -> ParseResult<Option<Invocation>> {
        loop {
            if self.buffer.is_empty() {
                return Ok(None);
            }

            let (consumed, parts) = match scan(&self.buffer)? {
                Scan::Incomplete if self.buffer.len() > self.max_frame => {
                    return Err(ParseError::MessageTooLarge {
                        size: self.buffer.len(),
                        max: self.max_frame,
                    });
                }
                Scan::Incomplete => return Ok(None),
                Scan::Frame { consumed, parts } => (consumed, parts),
            };

            let frame: Bytes = self.buffer.split_to(consumed).freeze();
            let parts = parts.into_iter().map(|r| frame.slice(r)).collect();
            if let Some(invocation) = Invocation::new(parts) {
                return Ok(Some(invocation));
            }
        }
    }
}

fn scan(buf: &[u8]) -> ParseResult<Scan> {
    if buf[0] == prefix::ARRAY {
        scan_multibulk(buf)
    } else {
        scan_inline(buf)
    }
}

/// Scans `*<count>\r\n` followed by `count` bulk strings.
fn scan_multibulk(buf: &[u8]) -> ParseResult<Scan> {
    let (count, mut pos) = match read_length(buf, 1)? {
        Some(v) => v,
        None => return Ok(Scan::Incomplete),
    };

    if count <= 0 {
        // `*0` and `*-1` carry no command; consume and move on.
        return Ok(Scan::Frame {
            consumed: pos,
            parts: Vec::new(),
        });
    }
    if count > MAX_MULTIBULK_LEN {
        return Err(ParseError::InvalidMultibulkLength(count));
    }

    // The count is client-supplied; let the vector grow past a small start.
    let mut parts = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        if pos >= buf.len() {
            return Ok(Scan::Incomplete);
        }
        if buf[pos] != prefix::BULK {
            return Err(ParseError::UnexpectedByte(buf[pos]));
        }

        let (len, data_start) = match read_length(buf, pos + 1)? {
            Some(v) => v,
            None => return Ok(Scan::Incomplete),
        };
        if len < 0 {
            return Err(ParseError::InvalidBulkLength(len));
        }
        let len = len as usize;
        if len > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: len,
                max: MAX_BULK_SIZE,
            });
        }

        let data_end = data_start + len;
        if buf.len() < data_end + 2 {
            return Ok(Scan::Incomplete);
        }
        if &buf[data_end..data_end + 2] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        parts.push(data_start..data_end);
        pos = data_end + 2;
    }

    Ok(Scan::Frame {
        consumed: pos,
        parts,
    })
}

/// Scans a whitespace-separated command line.
fn scan_inline(buf: &[u8]) -> ParseResult<Scan> {
    let end = match find_crlf(buf) {
        Some(end) => end,
        None if buf.len() > MAX_INLINE_SIZE => {
            return Err(ParseError::MessageTooLarge {
                size: buf.len(),
                max: MAX_INLINE_SIZE,
            })
        }
        None => return Ok(Scan::Incomplete),
    };

    let mut parts = Vec::new();
    let mut start = None;
    for (i, b) in buf[..end].iter().enumerate() {
        match (b.is_ascii_whitespace(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                parts.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        parts.push(s..end);
    }

    Ok(Scan::Frame {
        consumed: end + 2,
        parts,
    })
}

/// Reads a decimal line starting at `start`; returns the value and the
/// offset just past its CRLF.
fn read_length(buf: &[u8], start: usize) -> ParseResult<Option<(i64, usize)>> {
    let end = match find_crlf(&buf[start..]) {
        Some(pos) => start + pos,
        None => return Ok(None),
    };

    let text = std::str::from_utf8(&buf[start..end])
        .map_err(|e| ParseError::InvalidInteger(e.to_string()))?;
    let value = text
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidInteger(text.to_string()))?;

    Ok(Some((value, end + 2)))
}

/// Finds the position of the `\r` of the first CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
