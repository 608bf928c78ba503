//! RESP Protocol Implementation
//!
//! This module provides the wire-level pieces of the session engine.
//!
//! ## Modules
//!
//! - `types`: Defines the `Response` enum and its exact wire encoding
//! - `invocation`: One decoded request, command name plus arguments
//! - `decoder`: Incremental decoder turning raw bytes into invocations
//!
//! ## Example
//!
//! ```
//! use respline::protocol::{FrameDecoder, Response};
//!
//! // Decoding incoming data
//! let mut decoder = FrameDecoder::new();
//! decoder.feed(b"*2\r\n$4\r\nECHO\r\n$4\r\nAriz\r\n");
//! let invocation = decoder.next_frame().unwrap().unwrap();
//! assert_eq!(invocation.command_name(), "ECHO");
//!
//! // Encoding replies
//! let reply = Response::bulk("Ariz");
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod decoder;
pub mod invocation;
pub mod types;

// Re-export commonly used types for convenience
pub use decoder::{FrameDecoder, ParseError, ParseResult};
pub use invocation::Invocation;
pub use types::Response;
