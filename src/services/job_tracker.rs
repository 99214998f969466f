//! Lifecycle of one triggered unit of server-side work.
//!
//! ```text
//! idle -> triggered -> polling -> succeeded | timed_out | failed
//!            \-> failed (trigger rejected, no poll session)
//! ```
//!
//! Starting again while a run is in flight cancels the running poll session
//! first, so a tracker never has more than one session. Every publish carries
//! the epoch of the run that produced it and is dropped if a newer run (or a
//! cancel) has started since.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::ports::TriggerAck;
use crate::services::bounded_poller::{BoundedPoller, PollHandle};
use crate::services::lock;

/// Phase of a tracked run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Nothing started, or the last run was cancelled.
    #[default]
    Idle,
    /// The triggering request is in flight.
    Triggered,
    /// The work was accepted and its outcome is being polled.
    Polling,
    /// The outcome appeared.
    Succeeded,
    /// The poll session ran out of time.
    TimedOut,
    /// The trigger was rejected or the work reported failure.
    Failed,
}

impl JobPhase {
    /// Whether the run is over.
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Succeeded | Self::TimedOut | Self::Failed)
    }
}

/// `{data, loading, error}` state of a tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerView<T> {
    /// Current phase.
    pub phase: JobPhase,
    /// Latest known outcome. Kept on timeout.
    pub data: Option<T>,
    /// User-visible error of the current run.
    pub error: Option<String>,
    /// Job id acknowledged by the server.
    pub job_id: Option<String>,
}

impl<T> TrackerView<T> {
    /// True while a run is in flight.
    pub const fn loading(&self) -> bool {
        matches!(self.phase, JobPhase::Triggered | JobPhase::Polling)
    }
}

impl<T> Default for TrackerView<T> {
    fn default() -> Self {
        Self {
            phase: JobPhase::Idle,
            data: None,
            error: None,
            job_id: None,
        }
    }
}

/// Terminal verdict on a fetched outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The work completed.
    Succeeded,
    /// The work reported failure with this user-visible message.
    Failed(String),
}

/// One kind of work a [`JobLifecycleTracker`] can drive.
#[async_trait]
pub trait TrackedWork: Send + Sync + 'static {
    /// What polling yields.
    type Output: Clone + Send + Sync + 'static;

    /// Short name used in logs.
    const KIND: &'static str;

    /// Message shown when the trigger fails without server text.
    fn failure_message(&self) -> &'static str;

    /// Message shown when the poll session times out.
    fn timeout_message(&self) -> &'static str;

    /// Issue the triggering request.
    async fn trigger(&self) -> SyncResult<TriggerAck>;

    /// Fetch the current outcome, `None` if nothing is there yet.
    async fn fetch(&self, ack: &TriggerAck) -> SyncResult<Option<Self::Output>>;

    /// Decide whether `output` ends the run.
    fn settle(&self, output: &Self::Output) -> Option<Settlement>;

    /// Whether inconclusive outcomes are published as progress.
    fn reports_progress(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct Session {
    trigger: Option<JoinHandle<()>>,
    poll: Option<PollHandle>,
}

impl Session {
    fn stop(&mut self) {
        if let Some(trigger) = self.trigger.take() {
            trigger.abort();
        }
        if let Some(poll) = self.poll.take() {
            poll.cancel();
        }
    }
}

struct TrackerInner<T> {
    entity_id: String,
    poller: BoundedPoller,
    view: watch::Sender<TrackerView<T>>,
    epoch: AtomicU64,
    session: Mutex<Session>,
}

impl<T: Clone + Send + Sync + 'static> TrackerInner<T> {
    /// Stop the running session and open a new epoch.
    fn begin(&self) -> u64 {
        let mut session = lock(&self.session);
        session.stop();
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn publish(&self, epoch: u64, update: impl FnOnce(&mut TrackerView<T>)) -> bool {
        self.view.send_if_modified(|view| {
            if !self.is_current(epoch) {
                return false;
            }
            update(view);
            true
        })
    }

    fn begin_polling<W>(self: &Arc<Self>, epoch: u64, work: Arc<W>, ack: TriggerAck)
    where
        W: TrackedWork<Output = T>,
    {
        let job_id = ack.job_id.clone();
        if !self.publish(epoch, |view| {
            view.phase = JobPhase::Polling;
            view.job_id = Some(job_id.clone());
        }) {
            return;
        }
        info!(kind = W::KIND, entity_id = %self.entity_id, job_id = %job_id, "tracking job");

        let fetch_one = {
            let record = Arc::downgrade(self);
            let work = Arc::clone(&work);
            move || {
                let record = Weak::clone(&record);
                let work = Arc::clone(&work);
                let ack = ack.clone();
                async move {
                    let fetched = work.fetch(&ack).await?;
                    if work.reports_progress() {
                        if let (Some(output), Some(inner)) = (&fetched, record.upgrade()) {
                            inner.publish(epoch, |view| view.data = Some(output.clone()));
                        }
                    }
                    Ok::<_, SyncError>(fetched)
                }
            }
        };

        let is_done = {
            let work = Arc::clone(&work);
            move |fetched: &Option<T>| {
                fetched
                    .as_ref()
                    .is_some_and(|output| work.settle(output).is_some())
            }
        };

        let on_done = {
            let record = Arc::downgrade(self);
            let work = Arc::clone(&work);
            move |fetched: Option<T>| {
                let (Some(inner), Some(output)) = (record.upgrade(), fetched) else {
                    return;
                };
                let settlement = work.settle(&output);
                inner.finish(epoch, W::KIND, output, settlement);
            }
        };

        let on_timeout = {
            let record = Arc::downgrade(self);
            let message = work.timeout_message();
            move || {
                if let Some(inner) = record.upgrade() {
                    warn!(kind = W::KIND, entity_id = %inner.entity_id, "job timed out");
                    inner.publish(epoch, |view| {
                        view.phase = JobPhase::TimedOut;
                        view.error = Some(message.to_string());
                    });
                }
            }
        };

        let handle = self.poller.start(fetch_one, is_done, on_done, on_timeout);

        let mut session = lock(&self.session);
        if self.is_current(epoch) {
            session.poll = Some(handle);
        } else {
            handle.cancel();
        }
    }

    fn finish(&self, epoch: u64, kind: &'static str, output: T, settlement: Option<Settlement>) {
        match settlement {
            Some(Settlement::Failed(message)) => {
                warn!(kind, entity_id = %self.entity_id, error = %message, "job failed");
                self.publish(epoch, |view| {
                    view.phase = JobPhase::Failed;
                    view.data = Some(output);
                    view.error = Some(message);
                });
            }
            Some(Settlement::Succeeded) | None => {
                info!(kind, entity_id = %self.entity_id, "job succeeded");
                self.publish(epoch, |view| {
                    view.phase = JobPhase::Succeeded;
                    view.data = Some(output);
                    view.error = None;
                });
            }
        }
    }
}

/// Tracks at most one run of work for one entity.
pub struct JobLifecycleTracker<T> {
    inner: Arc<TrackerInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> JobLifecycleTracker<T> {
    /// Idle tracker; `initial` is the data shown before any run, e.g. a
    /// previously loaded assessment.
    pub fn new(entity_id: impl Into<String>, poller: BoundedPoller, initial: Option<T>) -> Self {
        let (view, _) = watch::channel(TrackerView {
            data: initial,
            ..TrackerView::default()
        });
        Self {
            inner: Arc::new(TrackerInner {
                entity_id: entity_id.into(),
                poller,
                view,
                epoch: AtomicU64::new(0),
                session: Mutex::new(Session::default()),
            }),
        }
    }

    /// Trigger `work` and track its outcome, cancelling any run in flight.
    ///
    /// A rejected trigger moves straight to [`JobPhase::Failed`] with the
    /// server's message and never polls. Must be called from within a tokio
    /// runtime.
    pub fn start<W>(&self, work: W)
    where
        W: TrackedWork<Output = T>,
    {
        let epoch = self.inner.begin();
        self.inner.publish(epoch, |view| {
            view.phase = JobPhase::Triggered;
            view.error = None;
            view.job_id = None;
        });
        debug!(kind = W::KIND, entity_id = %self.inner.entity_id, "triggering job");

        let inner = Arc::clone(&self.inner);
        let work = Arc::new(work);
        let task = tokio::spawn(async move {
            match work.trigger().await {
                Ok(ack) if ack.is_accepted() => inner.begin_polling(epoch, work, ack),
                Ok(ack) => {
                    warn!(kind = W::KIND, entity_id = %inner.entity_id, status = %ack.status, "trigger not accepted");
                    let message = work.failure_message();
                    inner.publish(epoch, |view| {
                        view.phase = JobPhase::Failed;
                        view.error = Some(message.to_string());
                    });
                }
                Err(e) => {
                    warn!(kind = W::KIND, entity_id = %inner.entity_id, error = %e, "trigger rejected");
                    let message = e.user_message(work.failure_message());
                    inner.publish(epoch, |view| {
                        view.phase = JobPhase::Failed;
                        view.error = Some(message);
                    });
                }
            }
        });

        let mut session = lock(&self.inner.session);
        if self.inner.is_current(epoch) {
            session.trigger = Some(task);
        } else {
            task.abort();
        }
    }

    /// Track work that is already running on the server, skipping the trigger.
    pub fn watch<W>(&self, work: W, ack: TriggerAck)
    where
        W: TrackedWork<Output = T>,
    {
        let epoch = self.inner.begin();
        self.inner.publish(epoch, |view| {
            view.phase = JobPhase::Triggered;
            view.error = None;
            view.job_id = None;
        });
        self.inner.begin_polling(epoch, Arc::new(work), ack);
    }

    /// Abandon the current run. No callback of it will publish afterwards.
    pub fn cancel(&self) {
        self.inner.begin();
        self.inner.view.send_modify(|view| {
            if view.loading() {
                view.phase = JobPhase::Idle;
            }
        });
    }

    /// Entity being tracked.
    pub fn entity_id(&self) -> &str {
        &self.inner.entity_id
    }

    /// Receiver of every view change.
    pub fn subscribe(&self) -> watch::Receiver<TrackerView<T>> {
        self.inner.view.subscribe()
    }

    /// Current view.
    pub fn snapshot(&self) -> TrackerView<T> {
        self.inner.view.borrow().clone()
    }
}

impl<T> Drop for JobLifecycleTracker<T> {
    fn drop(&mut self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.session).stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::settle;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time;

    /// Work whose outcome settles on a given fetch.
    struct Countdown {
        reject: Option<&'static str>,
        settle_on: usize,
        fail_with: Option<&'static str>,
        fetches: Arc<AtomicUsize>,
        progress: bool,
    }

    impl Countdown {
        fn new(settle_on: usize, fetches: &Arc<AtomicUsize>) -> Self {
            Self {
                reject: None,
                settle_on,
                fail_with: None,
                fetches: Arc::clone(fetches),
                progress: false,
            }
        }
    }

    #[async_trait]
    impl TrackedWork for Countdown {
        type Output = usize;
        const KIND: &'static str = "countdown";

        fn failure_message(&self) -> &'static str {
            "Countdown failed"
        }

        fn timeout_message(&self) -> &'static str {
            "Countdown is taking too long"
        }

        async fn trigger(&self) -> SyncResult<TriggerAck> {
            match self.reject {
                Some(message) => Err(SyncError::TriggerRejected {
                    status: 400,
                    message: message.to_string(),
                }),
                None => Ok(TriggerAck::processing("job-7")),
            }
        }

        async fn fetch(&self, ack: &TriggerAck) -> SyncResult<Option<usize>> {
            assert_eq!(ack.job_id, "job-7");
            Ok(Some(self.fetches.fetch_add(1, Ordering::SeqCst) + 1))
        }

        fn settle(&self, output: &usize) -> Option<Settlement> {
            if *output < self.settle_on {
                return None;
            }
            Some(match self.fail_with {
                Some(message) => Settlement::Failed(message.to_string()),
                None => Settlement::Succeeded,
            })
        }

        fn reports_progress(&self) -> bool {
            self.progress
        }
    }

    fn tracker() -> JobLifecycleTracker<usize> {
        JobLifecycleTracker::new(
            "q1",
            BoundedPoller::new(Duration::from_millis(3_000), Duration::from_millis(60_000)),
            None,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_trigger_fails_without_polling() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let tracker = tracker();
        tracker.start(Countdown {
            reject: Some("Vraag niet gevonden"),
            ..Countdown::new(1, &fetches)
        });

        time::sleep(Duration::from_secs(90)).await;
        let view = tracker.snapshot();
        assert_eq!(view.phase, JobPhase::Failed);
        assert_eq!(view.error.as_deref(), Some("Vraag niet gevonden"));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_tick_and_stops() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let tracker = tracker();
        tracker.start(Countdown::new(3, &fetches));

        settle().await;
        assert_eq!(tracker.snapshot().phase, JobPhase::Polling);
        assert!(tracker.snapshot().loading());
        assert_eq!(tracker.snapshot().job_id.as_deref(), Some("job-7"));

        time::sleep(Duration::from_millis(9_000)).await;
        let view = tracker.snapshot();
        assert_eq!(view.phase, JobPhase::Succeeded);
        assert_eq!(view.data, Some(3));
        assert_eq!(view.error, None);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_prior_data() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let tracker = JobLifecycleTracker::new(
            "q1",
            BoundedPoller::new(Duration::from_millis(3_000), Duration::from_millis(60_000)),
            Some(42),
        );
        tracker.start(Countdown::new(usize::MAX, &fetches));

        time::sleep(Duration::from_millis(60_500)).await;
        let view = tracker.snapshot();
        assert_eq!(view.phase, JobPhase::TimedOut);
        assert_eq!(view.data, Some(42));
        assert_eq!(view.error.as_deref(), Some("Countdown is taking too long"));

        let after_timeout = fetches.load(Ordering::SeqCst);
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), after_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_is_distinct_from_timeout() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let tracker = tracker();
        tracker.start(Countdown {
            fail_with: Some("Materiaal bevat geen tekst"),
            ..Countdown::new(2, &fetches)
        });

        time::sleep(Duration::from_millis(6_100)).await;
        let view = tracker.snapshot();
        assert_eq!(view.phase, JobPhase::Failed);
        assert_eq!(view.data, Some(2));
        assert_eq!(view.error.as_deref(), Some("Materiaal bevat geen tekst"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_published_while_polling() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let tracker = tracker();
        tracker.start(Countdown {
            progress: true,
            ..Countdown::new(5, &fetches)
        });

        time::sleep(Duration::from_millis(6_100)).await;
        let view = tracker.snapshot();
        assert_eq!(view.phase, JobPhase::Polling);
        assert_eq!(view.data, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cancels_previous_session() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let tracker = tracker();

        tracker.start(Countdown::new(3, &first));
        time::sleep(Duration::from_millis(3_100)).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);

        tracker.start(Countdown::new(1, &second));
        time::sleep(Duration::from_millis(3_100)).await;
        let view = tracker.snapshot();
        assert_eq!(view.phase, JobPhase::Succeeded);
        assert_eq!(view.data, Some(1));

        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.snapshot().data, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_goes_idle_and_silences_run() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let tracker = tracker();
        tracker.start(Countdown::new(2, &fetches));
        time::sleep(Duration::from_millis(3_100)).await;

        tracker.cancel();
        assert_eq!(tracker.snapshot().phase, JobPhase::Idle);

        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.snapshot().phase, JobPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_skips_trigger() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let tracker = tracker();
        tracker.watch(
            Countdown {
                reject: Some("never called"),
                ..Countdown::new(1, &fetches)
            },
            TriggerAck::processing("job-7"),
        );
        assert_eq!(tracker.snapshot().phase, JobPhase::Polling);

        time::sleep(Duration::from_millis(3_100)).await;
        assert_eq!(tracker.snapshot().phase, JobPhase::Succeeded);
    }
}
