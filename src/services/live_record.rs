//! Live view of one entity.
//!
//! A [`LiveRecord`] reads the entity once, then applies deltas pushed on the
//! entity's channel. When the channel degrades past the failure threshold it
//! closes the channel and keeps the view fresh with an unbounded poll loop
//! for the rest of its life. Push and polling never run at the same time.
//!
//! Dropping the record tears down the channel, the poll loop and any
//! outstanding initial read.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::ports::{Backend, LiveEntity};
use crate::services::fallback_coordinator::{DeliveryMode, FallbackCoordinator, FallbackPolicy};
use crate::services::lock;
use crate::services::push_subscription::{PushSubscriptionManager, StatusReport, SubscriptionHandle};

/// `{data, loading, error}` state of a live record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordView<T> {
    /// Latest known record.
    pub data: Option<T>,
    /// True until the initial read finished.
    pub loading: bool,
    /// Error of the initial read.
    pub error: Option<String>,
    /// How updates are currently delivered.
    pub mode: DeliveryMode,
}

impl<T> Default for RecordView<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: true,
            error: None,
            mode: DeliveryMode::Live,
        }
    }
}

/// Shallow-merge the top-level fields of `delta` over `current`.
pub fn merge_delta<T>(current: &T, delta: &Value) -> SyncResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(changes) = delta else {
        return Err(SyncError::Decode("push delta is not an object".to_string()));
    };
    let mut merged = serde_json::to_value(current)?;
    if let Value::Object(fields) = &mut merged {
        for (key, value) in changes {
            fields.insert(key.clone(), value.clone());
        }
    }
    Ok(serde_json::from_value(merged)?)
}

struct LiveInner<E: LiveEntity> {
    entity_id: String,
    backend: Arc<dyn Backend>,
    view: watch::Sender<RecordView<E>>,
    coordinator: Mutex<FallbackCoordinator>,
    subscription: Mutex<Option<SubscriptionHandle>>,
    fallback: Mutex<Option<FallbackLoop>>,
    token: CancellationToken,
}

impl<E: LiveEntity> LiveInner<E> {
    fn spawn_initial_read(self: &Arc<Self>) {
        let record = Arc::downgrade(self);
        let token = self.token.clone();
        let backend = Arc::clone(&self.backend);
        let entity_id = self.entity_id.clone();

        tokio::spawn(async move {
            let fetched = tokio::select! {
                biased;
                () = token.cancelled() => return,
                fetched = E::fetch(&*backend, &entity_id) => fetched,
            };
            if let Some(inner) = record.upgrade() {
                inner.apply_initial(fetched);
            }
        });
    }

    fn apply_initial(&self, fetched: SyncResult<E>) {
        self.view.send_modify(|view| {
            view.loading = false;
            match fetched {
                Ok(record) => {
                    view.data = Some(record);
                    view.error = None;
                }
                Err(e) => {
                    warn!(table = E::TABLE, entity_id = %self.entity_id, error = %e, "initial read failed");
                    view.error = Some(e.to_string());
                }
            }
        });
    }

    fn apply_delta(&self, delta: &Value) {
        self.view.send_if_modified(|view| {
            let Some(current) = view.data.as_ref() else {
                return false;
            };
            match merge_delta(current, delta) {
                Ok(merged) => {
                    view.data = Some(merged);
                    true
                }
                Err(e) => {
                    warn!(table = E::TABLE, entity_id = %self.entity_id, error = %e, "ignoring malformed push delta");
                    false
                }
            }
        });
    }

    fn merge_polled(&self, fresh: E) {
        self.view.send_if_modified(|view| match view.data.as_ref() {
            Some(current) if !current.has_notable_change(&fresh) => false,
            _ => {
                view.data = Some(fresh);
                true
            }
        });
    }

    fn on_status(self: &Arc<Self>, report: StatusReport) {
        let switch = lock(&self.coordinator).observe(report);
        if switch {
            self.fall_back();
        }
    }

    fn abandon_push(self: &Arc<Self>) {
        let switch = lock(&self.coordinator).abandon_push();
        if switch {
            self.fall_back();
        }
    }

    fn fall_back(self: &Arc<Self>) {
        self.publish_mode(DeliveryMode::FallingBack);

        if let Some(subscription) = lock(&self.subscription).take() {
            subscription.close();
        }

        let policy = lock(&self.coordinator).policy();
        let fallback = FallbackLoop::spawn(Arc::downgrade(self), policy.poll_interval, &self.token);
        {
            let mut slot = lock(&self.fallback);
            if self.token.is_cancelled() {
                return;
            }
            *slot = Some(fallback);
        }

        if lock(&self.coordinator).polling_started() {
            self.publish_mode(DeliveryMode::Polling);
            info!(
                table = E::TABLE,
                entity_id = %self.entity_id,
                interval_ms = policy.poll_interval.as_millis(),
                "switched to fallback polling"
            );
        }
    }

    fn publish_mode(&self, mode: DeliveryMode) {
        self.view.send_if_modified(|view| {
            if view.mode == mode {
                return false;
            }
            view.mode = mode;
            true
        });
    }

    fn shutdown(&self) {
        self.token.cancel();
        if let Some(fallback) = lock(&self.fallback).take() {
            fallback.stop();
        }
        if let Some(subscription) = lock(&self.subscription).take() {
            subscription.close();
        }
    }
}

/// Unbounded fetch-and-merge loop standing in for a degraded push channel.
struct FallbackLoop {
    token: CancellationToken,
}

impl FallbackLoop {
    fn spawn<E: LiveEntity>(
        record: Weak<LiveInner<E>>,
        interval: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let loop_token = token.clone();
        let span = tracing::debug_span!("fallback_poll", table = E::TABLE);

        tokio::spawn(
            async move {
                let mut ticker = time::interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        biased;
                        () = loop_token.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    let Some(inner) = record.upgrade() else {
                        break;
                    };
                    let fetched = tokio::select! {
                        biased;
                        () = loop_token.cancelled() => break,
                        fetched = E::fetch(&*inner.backend, &inner.entity_id) => fetched,
                    };
                    match fetched {
                        Ok(fresh) => inner.merge_polled(fresh),
                        Err(e) => debug!(entity_id = %inner.entity_id, error = %e, "fallback poll failed"),
                    }
                }
                debug!("fallback poll loop stopped");
            }
            .instrument(span),
        );

        Self { token }
    }

    fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for FallbackLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Live, self-healing view of one entity.
pub struct LiveRecord<E: LiveEntity> {
    inner: Arc<LiveInner<E>>,
}

impl<E: LiveEntity> LiveRecord<E> {
    /// Start the initial read and open the push channel.
    ///
    /// Without a push manager, or if the channel cannot be opened, the record
    /// polls from the start. Must be called from within a tokio runtime.
    pub fn mount(
        entity_id: impl Into<String>,
        backend: Arc<dyn Backend>,
        push: Option<&PushSubscriptionManager>,
        policy: FallbackPolicy,
    ) -> Self {
        let entity_id = entity_id.into();
        let (view, _) = watch::channel(RecordView::default());
        let inner = Arc::new(LiveInner {
            entity_id: entity_id.clone(),
            backend,
            view,
            coordinator: Mutex::new(FallbackCoordinator::new(policy)),
            subscription: Mutex::new(None),
            fallback: Mutex::new(None),
            token: CancellationToken::new(),
        });

        inner.spawn_initial_read();

        let Some(push) = push else {
            debug!(table = E::TABLE, entity_id = %entity_id, "push disabled, polling from the start");
            inner.abandon_push();
            return Self { inner };
        };

        let on_update = {
            let record = Arc::downgrade(&inner);
            move |delta: Value| {
                if let Some(inner) = record.upgrade() {
                    inner.apply_delta(&delta);
                }
            }
        };
        let on_status = {
            let record = Arc::downgrade(&inner);
            move |report: StatusReport| {
                if let Some(inner) = record.upgrade() {
                    inner.on_status(report);
                }
            }
        };

        match push.open(E::TABLE, &entity_id, on_update, on_status) {
            Ok(handle) => {
                let mut slot = lock(&inner.subscription);
                // The threshold may already have been crossed on the channel task
                if lock(&inner.coordinator).mode() == DeliveryMode::Live {
                    *slot = Some(handle);
                } else {
                    handle.close();
                }
            }
            Err(e) => {
                warn!(table = E::TABLE, entity_id = %entity_id, error = %e, "could not open push channel");
                inner.abandon_push();
            }
        }

        Self { inner }
    }

    /// Entity being watched.
    pub fn entity_id(&self) -> &str {
        &self.inner.entity_id
    }

    /// Receiver of every view change.
    pub fn subscribe(&self) -> watch::Receiver<RecordView<E>> {
        self.inner.view.subscribe()
    }

    /// Current view.
    pub fn snapshot(&self) -> RecordView<E> {
        self.inner.view.borrow().clone()
    }

    /// Current delivery mode.
    pub fn mode(&self) -> DeliveryMode {
        lock(&self.inner.coordinator).mode()
    }
}

impl<E: LiveEntity> Drop for LiveRecord<E> {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}
