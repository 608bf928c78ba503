//! Command Invocations
//!
//! One decoded request frame: the command name followed by its positional
//! arguments, all binary-safe.

use bytes::Bytes;
use std::fmt;

/// An ordered, non-empty sequence of byte strings.
///
/// Element 0 is the command name, matched case-insensitively by the
/// dispatcher; the rest are arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    parts: Vec<Bytes>,
}

impl Invocation {
    /// Builds an invocation, or `None` if `parts` is empty.
    pub fn new(parts: Vec<Bytes>) -> Option<Self> {
        if parts.is_empty() {
            None
        } else {
            Some(Self { parts })
        }
    }

    /// Convenience constructor for tests and embedders.
    ///
    /// # Panics
    ///
    /// Panics if `parts` is empty.
    pub fn from_strs(parts: &[&str]) -> Self {
        Self::new(
            parts
                .iter()
                .map(|s| Bytes::copy_from_slice(s.as_bytes()))
                .collect(),
        )
        .expect("invocation needs a command name")
    }

    /// The raw command name as sent by the client.
    pub fn name(&self) -> &Bytes {
        &self.parts[0]
    }

    /// The command name upper-cased, which is how handlers are keyed.
    pub fn command_name(&self) -> String {
        String::from_utf8_lossy(&self.parts[0]).to_ascii_uppercase()
    }

    pub fn args(&self) -> &[Bytes] {
        &self.parts[1..]
    }

    pub fn into_parts(self) -> Vec<Bytes> {
        self.parts
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", String::from_utf8_lossy(part))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_rejected() {
        assert!(Invocation::new(vec![]).is_none());
    }

    #[test]
    fn test_name_and_args() {
        let inv = Invocation::from_strs(&["echo", "hi", "there"]);
        assert_eq!(inv.name(), &Bytes::from("echo"));
        assert_eq!(inv.command_name(), "ECHO");
        assert_eq!(inv.args(), &[Bytes::from("hi"), Bytes::from("there")]);
        assert_eq!(inv.to_string(), "echo hi there");
    }
}
