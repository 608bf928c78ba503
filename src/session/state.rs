//! Per-connection Session
//!
//! The entry point invoked once per decoded frame. It decides between
//! queuing and executing, runs the dispatcher, and registers deferred
//! replies, leaving all I/O to the connection handler.
//!
//! ## Frame Lifecycle
//!
//! ```text
//!   Invocation
//!       │
//!       ▼
//!   queuing && not exempt? ──yes──> buffer it ──> Immediate(QUEUED)
//!       │ no
//!       ▼
//!   Dispatcher::dispatch
//!       │
//!       ├── Ok(Deferred)  ──> track it ──> Pending
//!       ├── Ok(response)  ──────────────> Immediate(response)
//!       └── Err(close)    ──> closed ───> Close(reply)
//! ```

use crate::commands::Dispatcher;
use crate::protocol::{Invocation, Response};
use crate::session::deferred::DeferredTracker;
use crate::session::transaction::{is_exempt, TransactionQueue};
use crate::watch::{WatchRegistry, Watcher};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// What the connection should do after one frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// Write this reply now.
    Immediate(Response),
    /// Nothing to write yet; the reply arrives through
    /// [`Session::next_deferred`].
    Pending,
    /// Write the optional reply, flush, and close. No further frames are
    /// dispatched.
    Close(Option<Response>),
}

/// Per-connection state: transaction buffer, watch token and the single
/// outstanding deferred reply.
#[derive(Debug)]
pub struct Session {
    id: u64,
    keyspace: usize,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<WatchRegistry>,
    transaction: TransactionQueue,
    watcher: Option<Watcher>,
    deferred: DeferredTracker,
    closed: bool,
}

impl Session {
    /// Creates a session working against keyspace 0.
    pub fn new(dispatcher: Arc<Dispatcher>, registry: Arc<WatchRegistry>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            keyspace: 0,
            dispatcher,
            registry,
            transaction: TransactionQueue::new(),
            watcher: None,
            deferred: DeferredTracker::new(),
            closed: false,
        }
    }

    /// Selects the keyspace WATCH binds keys in.
    pub fn with_keyspace(mut self, keyspace: usize) -> Self {
        self.keyspace = keyspace;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn keyspace(&self) -> usize {
        self.keyspace
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Processes one frame.
    pub fn handle(&mut self, mut invocation: Invocation) -> Reply {
        if self.closed {
            return Reply::Close(None);
        }

        let name = invocation.command_name();
        if !is_exempt(&name) {
            match self.transaction.push(invocation) {
                Ok(()) => {
                    trace!(session = self.id, command = %name, "Command queued");
                    return Reply::Immediate(Response::QUEUED);
                }
                Err(not_queuing) => invocation = not_queuing,
            }
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        match dispatcher.dispatch(self, &invocation) {
            Ok(Response::Deferred(deferred)) => {
                trace!(session = self.id, deferred = deferred.id(), "Reply deferred");
                self.deferred.set(deferred);
                Reply::Pending
            }
            Ok(response) => Reply::Immediate(response),
            Err(close) => {
                self.closed = true;
                Reply::Close(close.reply)
            }
        }
    }

    // ------------------------------------------------------------------
    // Transaction state
    // ------------------------------------------------------------------

    pub fn is_queuing(&self) -> bool {
        self.transaction.is_queuing()
    }

    /// Number of commands waiting for EXEC.
    pub fn queued(&self) -> usize {
        self.transaction.len()
    }

    pub(crate) fn transaction_mut(&mut self) -> &mut TransactionQueue {
        &mut self.transaction
    }

    // ------------------------------------------------------------------
    // Watches
    // ------------------------------------------------------------------

    /// Binds `keys` to this session's watcher, creating it on first use.
    pub(crate) fn watch(&mut self, keys: &[Bytes]) {
        let registry = &self.registry;
        let watcher = self
            .watcher
            .get_or_insert_with(|| Watcher::new(Arc::clone(registry)));
        watcher.bind(self.keyspace, keys);
    }

    /// Releases every watch. Idempotent.
    pub(crate) fn unwatch(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.unbind();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// False once any watched key was modified since WATCH.
    pub fn watch_intact(&self) -> bool {
        self.watcher.as_ref().map_or(true, Watcher::is_bound)
    }

    // ------------------------------------------------------------------
    // Deferred replies
    // ------------------------------------------------------------------

    pub fn has_pending_reply(&self) -> bool {
        self.deferred.is_pending()
    }

    /// Resolves with the outstanding deferred reply once it completes.
    /// Pends forever while there is none.
    pub async fn next_deferred(&mut self) -> Response {
        self.deferred.completion().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases everything the session holds outside itself: the deferred
    /// reply is cancelled and the watcher detached from the registry.
    /// Idempotent; also runs on drop.
    pub fn teardown(&mut self) {
        self.closed = true;
        self.deferred.cancel();
        self.unwatch();
        self.transaction = TransactionQueue::new();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
