//! Transaction Queue
//!
//! Connection-scoped MULTI state. While queuing, ordinary commands are
//! buffered instead of executed; EXEC drains the buffer in insertion order
//! and DISCARD drops it.
//!
//! ```text
//!             MULTI                       EXEC / DISCARD
//!   Normal ───────────> Queuing ─────────────────────────> Normal
//!                        │   ▲
//!                        └───┘ MULTI (error, buffer untouched)
//! ```

use crate::commands::CommandError;
use crate::protocol::Invocation;

/// Commands executed immediately even while queuing. WATCH is here so it
/// can be refused instead of running after EXEC has already unwatched.
pub const EXEMPT_WHILE_QUEUING: &[&str] = &["MULTI", "EXEC", "DISCARD", "DEBUG", "QUIT", "WATCH"];

/// Returns true if `command` (upper-case) bypasses the queue.
pub fn is_exempt(command: &str) -> bool {
    EXEMPT_WHILE_QUEUING.contains(&command)
}

/// Per-session transaction state.
///
/// `None` is the `Normal` state; `Some(buffer)` is `Queuing`.
#[derive(Debug, Default)]
pub struct TransactionQueue {
    buffer: Option<Vec<Invocation>>,
}

impl TransactionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters queuing mode with an empty buffer.
    ///
    /// Nesting is rejected and leaves the existing buffer as it is.
    pub fn begin(&mut self) -> Result<(), CommandError> {
        if self.buffer.is_some() {
            return Err(CommandError::NestedTransaction);
        }
        self.buffer = Some(Vec::new());
        Ok(())
    }

    /// Whether the session is in queuing mode.
    pub fn is_queuing(&self) -> bool {
        self.buffer.is_some()
    }

    /// Number of buffered invocations (zero when not queuing).
    pub fn len(&self) -> usize {
        self.buffer.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends to the buffer. Returns the invocation back when not queuing.
    pub fn push(&mut self, invocation: Invocation) -> Result<(), Invocation> {
        match self.buffer.as_mut() {
            Some(buffer) => {
                buffer.push(invocation);
                Ok(())
            }
            None => Err(invocation),
        }
    }

    /// Leaves queuing mode and hands back the buffer, in insertion order.
    pub fn take(&mut self) -> Result<Vec<Invocation>, CommandError> {
        self.buffer.take().ok_or(CommandError::ExecWithoutMulti)
    }

    /// Leaves queuing mode, dropping the buffer.
    pub fn discard(&mut self) -> Result<(), CommandError> {
        self.buffer
            .take()
            .map(drop)
            .ok_or(CommandError::DiscardWithoutMulti)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_rejects_nesting() {
        let mut queue = TransactionQueue::new();
        queue.begin().unwrap();
        queue.push(Invocation::from_strs(&["INCR", "x"])).unwrap();

        assert!(matches!(queue.begin(), Err(CommandError::NestedTransaction)));
        assert!(queue.is_queuing());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_take_preserves_order_and_resets() {
        let mut queue = TransactionQueue::new();
        queue.begin().unwrap();
        queue.push(Invocation::from_strs(&["SET", "a", "1"])).unwrap();
        queue.push(Invocation::from_strs(&["GET", "a"])).unwrap();

        let drained = queue.take().unwrap();
        let names: Vec<String> = drained.iter().map(|i| i.command_name()).collect();
        assert_eq!(names, vec!["SET", "GET"]);
        assert!(!queue.is_queuing());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_outside_multi_is_refused() {
        let mut queue = TransactionQueue::new();
        let inv = Invocation::from_strs(&["PING"]);
        assert_eq!(queue.push(inv.clone()), Err(inv));
    }

    #[test]
    fn test_take_and_discard_without_multi() {
        let mut queue = TransactionQueue::new();
        assert!(matches!(queue.take(), Err(CommandError::ExecWithoutMulti)));
        assert!(matches!(
            queue.discard(),
            Err(CommandError::DiscardWithoutMulti)
        ));
    }

    #[test]
    fn test_discard_clears() {
        let mut queue = TransactionQueue::new();
        queue.begin().unwrap();
        queue.push(Invocation::from_strs(&["PING"])).unwrap();
        queue.discard().unwrap();
        assert!(!queue.is_queuing());
        assert!(queue.begin().is_ok());
    }

    #[test]
    fn test_exempt_set() {
        for name in ["MULTI", "EXEC", "DISCARD", "DEBUG", "QUIT", "WATCH"] {
            assert!(is_exempt(name));
        }
        for name in ["UNWATCH", "SET", "PING"] {
            assert!(!is_exempt(name));
        }
    }
}
