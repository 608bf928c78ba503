//! Deferred Replies
//!
//! A handler that cannot answer synchronously returns
//! `Response::Deferred(handle)` and keeps the paired [`Completion`]. The
//! connection keeps serving other frames and writes the reply once the
//! producer completes it.
//!
//! ## Design
//!
//! The pair wraps a tokio oneshot channel. The receiving half lives in a
//! shared slot inside the [`Deferred`] handle so that:
//! - the handle can be cloned into a `Response` and compared by id
//! - polling borrows the receiver instead of taking it, so a `select!` that
//!   drops the wait future loses nothing
//! - cancelling drops the receiver, which the producer observes through
//!   [`Completion::is_cancelled`] / [`Completion::cancelled`]
//!
//! A session holds at most one outstanding handle; [`DeferredTracker`]
//! enforces that.

use crate::protocol::Response;
use std::fmt;
use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::trace;

static NEXT_DEFERRED_ID: AtomicU64 = AtomicU64::new(1);

type Slot = Arc<Mutex<Option<oneshot::Receiver<Response>>>>;

/// Handle to a reply that is not available yet.
#[derive(Clone)]
pub struct Deferred {
    id: u64,
    slot: Slot,
}

/// The producing half of a deferred reply.
#[derive(Debug)]
pub struct Completion {
    id: u64,
    tx: oneshot::Sender<Response>,
}

impl Deferred {
    /// Creates a linked producer/handle pair.
    pub fn channel() -> (Completion, Deferred) {
        let id = NEXT_DEFERRED_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        (
            Completion { id, tx },
            Deferred {
                id,
                slot: Arc::new(Mutex::new(Some(rx))),
            },
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn slot(&self) -> MutexGuard<'_, Option<oneshot::Receiver<Response>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancels the reply. Safe to call any number of times.
    pub fn cancel(&self) {
        if self.slot().take().is_some() {
            trace!(deferred = self.id, "Deferred reply cancelled");
        }
    }

    /// True once cancelled or already delivered.
    pub fn is_done(&self) -> bool {
        self.slot().is_none()
    }

    /// Polls for the reply.
    ///
    /// Resolves to `None` when the handle was cancelled or the producer
    /// went away without completing it.
    pub fn poll_complete(&self, cx: &mut Context<'_>) -> Poll<Option<Response>> {
        let mut slot = self.slot();
        let Some(rx) = slot.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                *slot = None;
                Poll::Ready(result.ok())
            }
        }
    }

    /// Waits for the reply. Cancel-safe.
    pub async fn wait(&self) -> Option<Response> {
        poll_fn(|cx| self.poll_complete(cx)).await
    }
}

impl PartialEq for Deferred {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Deferred {}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("id", &self.id)
            .field("done", &self.is_done())
            .finish()
    }
}

impl Completion {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Delivers the reply. Returns `false` if the handle was cancelled.
    ///
    /// Completing with another `Deferred` is not supported; it would be
    /// written as a null bulk value.
    pub fn complete(self, response: Response) -> bool {
        self.tx.send(response).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves when the handle is cancelled or dropped.
    pub async fn cancelled(&mut self) {
        self.tx.closed().await
    }
}

/// Holds the single outstanding deferred reply of a session.
#[derive(Debug, Default)]
pub struct DeferredTracker {
    active: Option<Deferred>,
}

impl DeferredTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `deferred` the outstanding reply.
    ///
    /// A different handle already outstanding is cancelled first; setting
    /// the same handle again is a no-op.
    pub fn set(&mut self, deferred: Deferred) {
        if let Some(current) = &self.active {
            if *current == deferred {
                return;
            }
            current.cancel();
        }
        self.active = Some(deferred);
    }

    pub fn is_pending(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&Deferred> {
        self.active.as_ref()
    }

    /// Waits for the outstanding reply and clears it.
    ///
    /// Never resolves while nothing is outstanding, which makes it usable as
    /// an always-present `select!` branch. A producer that disappears
    /// without completing yields an error reply, so the client still gets
    /// an answer for its request.
    pub async fn completion(&mut self) -> Response {
        let Some(deferred) = self.active.as_ref() else {
            return std::future::pending().await;
        };
        let outcome = deferred.wait().await;
        self.active = None;
        outcome.unwrap_or_else(|| Response::error("ERR deferred reply abandoned"))
    }

    /// Cancels the outstanding reply, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(deferred) = self.active.take() {
            deferred.cancel();
        }
    }
}
