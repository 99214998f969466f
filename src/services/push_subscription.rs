//! Push channels scoped to one entity, with consecutive-failure accounting.
//!
//! The manager keeps at most one open channel per entity. Opening a channel
//! for an entity that already has one closes the old channel first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::domain::errors::SyncResult;
use crate::domain::ports::{ChangeFilter, ChannelEvent, ConnectionStatus, PushTransport};
use crate::services::lock;

/// Consecutive delivery failures of one channel.
///
/// Reset by a `subscribed` status, incremented by every other status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCounter {
    consecutive: u32,
}

impl FailureCounter {
    /// Account for a status and return the updated count.
    pub fn record(&mut self, status: ConnectionStatus) -> u32 {
        if status.is_failure() {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 0;
        }
        self.consecutive
    }

    /// Current count.
    pub const fn get(&self) -> u32 {
        self.consecutive
    }
}

/// A status change together with the failure count after applying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    /// Reported status.
    pub status: ConnectionStatus,
    /// Consecutive failures including this report.
    pub consecutive_failures: u32,
    /// The transport ended the channel; no further events will arrive.
    pub channel_gone: bool,
}

struct SubscriptionInner {
    channel: String,
    transport: Arc<dyn PushTransport>,
    token: CancellationToken,
    closed: AtomicBool,
}

impl SubscriptionInner {
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.token.cancel();
        self.transport.remove(&self.channel);
        info!(channel = %self.channel, "push channel closed");
    }
}

impl Drop for SubscriptionInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to an open push channel.
///
/// Clones share the channel; it is torn down by [`SubscriptionHandle::close`]
/// or when the last clone is dropped.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<SubscriptionInner>,
}

impl SubscriptionHandle {
    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Tear down the channel. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Whether the channel has been torn down.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("channel", &self.inner.channel)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens and tracks push channels for one owner.
pub struct PushSubscriptionManager {
    transport: Arc<dyn PushTransport>,
    subscriptions: Mutex<HashMap<String, SubscriptionHandle>>,
}

impl PushSubscriptionManager {
    /// Create a manager over `transport`.
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self {
            transport,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Channel name used for updates of `entity_id` in `table`.
    pub fn channel_name(table: &str, entity_id: &str) -> String {
        format!("{table}-{entity_id}")
    }

    /// Open the update channel of one row.
    ///
    /// `on_update` receives every pushed delta in delivery order. `on_status`
    /// receives every connection status with the consecutive-failure count.
    /// Both run on the channel's task and stop once the handle is closed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<U, S>(
        &self,
        table: &str,
        entity_id: &str,
        mut on_update: U,
        mut on_status: S,
    ) -> SyncResult<SubscriptionHandle>
    where
        U: FnMut(Value) + Send + 'static,
        S: FnMut(StatusReport) + Send + 'static,
    {
        let channel = Self::channel_name(table, entity_id);

        if let Some(previous) = lock(&self.subscriptions).remove(&channel) {
            debug!(channel = %channel, "closing previous channel before reopening");
            previous.close();
        }

        let filter = ChangeFilter::updates_of(table, entity_id);
        let mut events = self.transport.open(&channel, &filter)?;

        let token = CancellationToken::new();
        let handle = SubscriptionHandle {
            inner: Arc::new(SubscriptionInner {
                channel: channel.clone(),
                transport: Arc::clone(&self.transport),
                token: token.clone(),
                closed: AtomicBool::new(false),
            }),
        };

        let span = tracing::debug_span!("push_channel", channel = %channel);
        tokio::spawn(
            async move {
                let mut failures = FailureCounter::default();
                loop {
                    let event = tokio::select! {
                        biased;
                        () = token.cancelled() => break,
                        event = events.recv() => event,
                    };

                    match event {
                        Some(ChannelEvent::Change(delta)) => on_update(delta),
                        Some(ChannelEvent::Status(status)) => {
                            let consecutive_failures = failures.record(status);
                            if status.is_failure() {
                                warn!(%status, consecutive_failures, "push channel delivery failure");
                            } else {
                                debug!(%status, "push channel subscribed");
                            }
                            on_status(StatusReport {
                                status,
                                consecutive_failures,
                                channel_gone: false,
                            });
                        }
                        None => {
                            // Transport went away without being asked to
                            let consecutive_failures = failures.record(ConnectionStatus::Closed);
                            warn!(consecutive_failures, "push transport dropped channel");
                            on_status(StatusReport {
                                status: ConnectionStatus::Closed,
                                consecutive_failures,
                                channel_gone: true,
                            });
                            break;
                        }
                    }
                }
            }
            .instrument(span),
        );

        info!(channel = %channel, table, entity_id, "push channel opened");
        lock(&self.subscriptions).insert(channel, handle.clone());
        Ok(handle)
    }

    /// Close the channel of one row, if open.
    pub fn close(&self, table: &str, entity_id: &str) {
        let channel = Self::channel_name(table, entity_id);
        if let Some(handle) = lock(&self.subscriptions).remove(&channel) {
            handle.close();
        }
    }

    /// Close every channel opened through this manager.
    pub fn close_all(&self) {
        let handles: Vec<_> = lock(&self.subscriptions).drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.close();
        }
    }

    /// Names of channels that are still open.
    pub fn open_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.subscriptions)
            .values()
            .filter(|h| !h.is_closed())
            .map(|h| h.channel().to_string())
            .collect();
        names.sort();
        names
    }
}

impl Drop for PushSubscriptionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}
