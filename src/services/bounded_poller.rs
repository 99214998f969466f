//! Bounded poll sessions: fetch on a fixed interval until a predicate holds
//! or a hard timeout elapses.
//!
//! Each session is an owned resource. Dropping or cancelling its
//! [`PollHandle`] stops the timer, and once cancelled neither the done nor
//! the timeout callback runs, even if a fetch was already in flight.
//!
//! Fetches are awaited inside the tick loop, so a session never has more than
//! one fetch outstanding. Ticks that come due while a fetch is running are
//! skipped rather than queued. A failed fetch is an inconclusive tick: it is
//! logged and the next tick tries again. There is no backoff.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument};
use uuid::Uuid;

const ACTIVE: u8 = 0;
const DONE: u8 = 1;
const TIMED_OUT: u8 = 2;
const CANCELLED: u8 = 3;

/// How a poll session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The predicate held; the done callback ran.
    Done,
    /// The timeout elapsed; the timeout callback ran.
    TimedOut,
    /// The session was cancelled before either outcome.
    Cancelled,
}

/// Settlement shared between a session's task and its handle.
///
/// Exactly one of done, timed out or cancelled wins the transition out of
/// `ACTIVE`; callbacks only run for the winner.
struct SessionState {
    state: AtomicU8,
    token: CancellationToken,
}

impl SessionState {
    fn settle(&self, to: u8) -> bool {
        self.state
            .compare_exchange(ACTIVE, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn outcome(&self) -> Option<PollOutcome> {
        match self.state.load(Ordering::Acquire) {
            DONE => Some(PollOutcome::Done),
            TIMED_OUT => Some(PollOutcome::TimedOut),
            CANCELLED => Some(PollOutcome::Cancelled),
            _ => None,
        }
    }
}

/// Factory for poll sessions sharing one interval and timeout.
#[derive(Debug, Clone)]
pub struct BoundedPoller {
    interval: Duration,
    timeout: Duration,
    label: &'static str,
}

impl BoundedPoller {
    /// Create a poller ticking every `interval` and giving up after `timeout`.
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            label: "poll",
        }
    }

    /// Name used in log output for sessions started by this poller.
    #[must_use]
    pub const fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Tick interval.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Session timeout.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start a session.
    ///
    /// The first fetch happens one interval after the call. `on_done` receives
    /// the first fetched value for which `is_done` holds. If the timeout
    /// elapses first, `on_timeout` runs instead, abandoning any fetch still in
    /// flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T, E, F, Fut, D, OnDone, OnTimeout>(
        &self,
        mut fetch_one: F,
        is_done: D,
        on_done: OnDone,
        on_timeout: OnTimeout,
    ) -> PollHandle
    where
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        D: Fn(&T) -> bool + Send + 'static,
        OnDone: FnOnce(T) + Send + 'static,
        OnTimeout: FnOnce() + Send + 'static,
    {
        let id = Uuid::new_v4();
        let started_at = Instant::now();
        let shared = Arc::new(SessionState {
            state: AtomicU8::new(ACTIVE),
            token: CancellationToken::new(),
        });

        let interval = self.interval;
        let deadline = started_at + self.timeout;
        let task_state = Arc::clone(&shared);
        let span = tracing::debug_span!("poll_session", label = self.label, session_id = %id);

        debug!(
            label = self.label,
            session_id = %id,
            interval_ms = interval.as_millis(),
            timeout_ms = self.timeout.as_millis(),
            "poll session started"
        );

        let task = tokio::spawn(
            async move {
                let token = task_state.token.clone();
                let mut ticker = time::interval_at(started_at + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                let mut tick: u64 = 0;

                let settled = loop {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return,
                        () = time::sleep_until(deadline) => break None,
                        _ = ticker.tick() => {}
                    }
                    tick += 1;

                    let fetched = tokio::select! {
                        biased;
                        () = token.cancelled() => return,
                        () = time::sleep_until(deadline) => break None,
                        fetched = fetch_one() => fetched,
                    };

                    match fetched {
                        Ok(value) if is_done(&value) => break Some(value),
                        Ok(_) => trace!(tick, "poll tick inconclusive"),
                        Err(e) => debug!(tick, error = %e, "poll fetch failed, retrying on next tick"),
                    }
                };

                match settled {
                    Some(value) => {
                        if task_state.settle(DONE) {
                            info!(tick, elapsed_ms = started_at.elapsed().as_millis(), "poll session done");
                            on_done(value);
                        }
                    }
                    None => {
                        if task_state.settle(TIMED_OUT) {
                            warn!(tick, "poll session timed out");
                            on_timeout();
                        }
                    }
                }
            }
            .instrument(span),
        );

        PollHandle {
            id,
            started_at,
            shared,
            task,
        }
    }
}

/// Owned handle of one poll session. Dropping it cancels the session.
pub struct PollHandle {
    id: Uuid,
    started_at: Instant,
    shared: Arc<SessionState>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Session identifier used in logs.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// When the session started.
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Stop the session. Idempotent.
    ///
    /// If the session had not settled yet, neither callback will run.
    pub fn cancel(&self) {
        if self.shared.settle(CANCELLED) {
            debug!(session_id = %self.id, "poll session cancelled");
        }
        self.shared.token.cancel();
    }

    /// Whether the session is still polling.
    pub fn is_active(&self) -> bool {
        self.shared.outcome().is_none()
    }

    /// How the session ended, if it has.
    pub fn outcome(&self) -> Option<PollOutcome> {
        self.shared.outcome()
    }

    /// Wait for the session task to exit.
    pub async fn join(mut self) {
        // A panicking callback is the only failure here; it already logged.
        let _ = (&mut self.task).await;
    }
}

impl fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollHandle")
            .field("id", &self.id)
            .field("outcome", &self.outcome())
            .finish_non_exhaustive()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
