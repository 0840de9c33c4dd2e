//! Reply correlator
//!
//! The transport carries no request ids, so a request is identified by the
//! path it was issued on. A peer that issued a request on `P` waits for the
//! first of `P_result_success` / `P_result_failed`; anything after that for
//! the same path is accepted and ignored. At most one request per path is in
//! flight: issuing a second supersedes the first.
//!
//! Waiting is bounded. A waiter that times out gives up its slot, so a reply
//! that turns up later has no effect.

use crate::protocol::{Outcome, RequestPath};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Default bounded wait for a reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("no reply within {0:?}")]
    TimedOut(Duration),
    #[error("superseded by a newer request on the same path")]
    Superseded,
}

/// What happened to an inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// First reply for a pending request; show it.
    Delivered { elapsed: Duration },
    /// Nothing is waiting: a duplicate, a late reply, or a dismissed request.
    Unmatched,
}

struct Pending {
    generation: u64,
    issued_at: Instant,
    tx: oneshot::Sender<Outcome>,
}

#[derive(Default)]
struct Table {
    next_generation: u64,
    pending: HashMap<RequestPath, Pending>,
}

#[derive(Default)]
pub struct ReplyCorrelator {
    table: Mutex<Table>,
}

/// Handle held by the initiator of one request.
#[derive(Debug)]
pub struct ReplyWaiter {
    path: RequestPath,
    generation: u64,
    rx: oneshot::Receiver<Outcome>,
}

impl ReplyWaiter {
    pub fn path(&self) -> RequestPath {
        self.path
    }
}

impl ReplyCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request issued on `path`.
    pub fn begin(&self, path: RequestPath) -> ReplyWaiter {
        let (tx, rx) = oneshot::channel();
        let mut table = self.table.lock();
        table.next_generation += 1;
        let generation = table.next_generation;
        let previous = table.pending.insert(
            path,
            Pending {
                generation,
                issued_at: Instant::now(),
                tx,
            },
        );
        if previous.is_some() {
            debug!("{} reissued, previous waiter superseded", path);
        }
        ReplyWaiter {
            path,
            generation,
            rx,
        }
    }

    /// Feed an inbound reply. Only the first reply per pending request is delivered.
    pub fn complete(&self, path: RequestPath, outcome: Outcome) -> Correlation {
        let pending = self.table.lock().pending.remove(&path);
        match pending {
            Some(pending) => {
                let elapsed = pending.issued_at.elapsed();
                // The waiter may already have stopped listening; the reply still counts.
                let _ = pending.tx.send(outcome);
                debug!("{} {} after {:?}", path, outcome, elapsed);
                Correlation::Delivered { elapsed }
            }
            None => {
                debug!("{} {} with nothing pending, ignored", path, outcome);
                Correlation::Unmatched
            }
        }
    }

    /// Stop waiting on `path` without a reply. Returns whether anything was pending.
    pub fn dismiss(&self, path: RequestPath) -> bool {
        self.table.lock().pending.remove(&path).is_some()
    }

    pub fn is_pending(&self, path: RequestPath) -> bool {
        self.table.lock().pending.contains_key(&path)
    }

    pub fn pending_count(&self) -> usize {
        self.table.lock().pending.len()
    }

    /// Wait for the reply to `waiter`'s request, giving up after `timeout`.
    pub async fn wait(&self, waiter: ReplyWaiter, timeout: Duration) -> Result<Outcome, CorrelationError> {
        let ReplyWaiter {
            path,
            generation,
            rx,
        } = waiter;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            // Sender dropped without a value: a newer request took the slot, or it was dismissed.
            Ok(Err(_)) => Err(CorrelationError::Superseded),
            Err(_) => {
                let mut table = self.table.lock();
                if table
                    .pending
                    .get(&path)
                    .is_some_and(|p| p.generation == generation)
                {
                    table.pending.remove(&path);
                }
                warn!("{} got no reply within {:?}", path, timeout);
                Err(CorrelationError::TimedOut(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_reply_wins() {
        let correlator = ReplyCorrelator::new();
        let waiter = correlator.begin(RequestPath::Vote);

        assert!(matches!(
            correlator.complete(RequestPath::Vote, Outcome::Success),
            Correlation::Delivered { .. }
        ));
        assert_eq!(
            correlator.complete(RequestPath::Vote, Outcome::Failed),
            Correlation::Unmatched
        );
        assert_eq!(
            correlator.wait(waiter, Duration::from_secs(1)).await,
            Ok(Outcome::Success)
        );
    }

    #[test]
    fn test_reply_without_request_is_unmatched() {
        let correlator = ReplyCorrelator::new();
        assert_eq!(
            correlator.complete(RequestPath::Reply, Outcome::Success),
            Correlation::Unmatched
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_slot() {
        let correlator = ReplyCorrelator::new();
        let waiter = correlator.begin(RequestPath::Comments);

        let result = correlator.wait(waiter, Duration::from_secs(30)).await;
        assert_eq!(result, Err(CorrelationError::TimedOut(Duration::from_secs(30))));
        assert!(!correlator.is_pending(RequestPath::Comments));
        assert_eq!(
            correlator.complete(RequestPath::Comments, Outcome::Success),
            Correlation::Unmatched
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reissue_supersedes() {
        let correlator = ReplyCorrelator::new();
        let first = correlator.begin(RequestPath::Vote);
        let second = correlator.begin(RequestPath::Vote);

        assert_eq!(
            correlator.wait(first, Duration::from_secs(5)).await,
            Err(CorrelationError::Superseded)
        );

        correlator.complete(RequestPath::Vote, Outcome::Failed);
        assert_eq!(
            correlator.wait(second, Duration::from_secs(5)).await,
            Ok(Outcome::Failed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timeout_does_not_evict_newer_request() {
        let correlator = ReplyCorrelator::new();
        let first = correlator.begin(RequestPath::Reply);
        let first_generation = first.generation;
        drop(first);
        let _second = correlator.begin(RequestPath::Reply);

        let stale = ReplyWaiter {
            path: RequestPath::Reply,
            generation: first_generation,
            rx: oneshot::channel().1,
        };
        let _ = correlator.wait(stale, Duration::from_millis(10)).await;
        assert!(correlator.is_pending(RequestPath::Reply));
    }

    #[test]
    fn test_dismiss_suppresses_reply() {
        let correlator = ReplyCorrelator::new();
        let _waiter = correlator.begin(RequestPath::OpenOnPhone);
        assert!(correlator.dismiss(RequestPath::OpenOnPhone));
        assert_eq!(
            correlator.complete(RequestPath::OpenOnPhone, Outcome::Success),
            Correlation::Unmatched
        );
        assert_eq!(correlator.pending_count(), 0);
    }
}
