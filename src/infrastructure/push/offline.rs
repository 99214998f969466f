//! Push transport for environments without a realtime endpoint.
//!
//! Every channel opened here keeps failing to connect and reports
//! `TIMED_OUT` once per retry period, the way a realtime client retrying an
//! unreachable socket does. Owners therefore degrade to polling after their
//! failure threshold instead of waiting on a channel that never delivers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::errors::SyncResult;
use crate::domain::ports::{ChangeFilter, ChannelEvent, ChannelReceiver, ConnectionStatus, PushTransport};
use crate::services::lock;

/// Transport whose channels never connect.
pub struct OfflineTransport {
    retry_after: Duration,
    channels: Mutex<HashMap<String, CancellationToken>>,
}

impl OfflineTransport {
    /// Report a timeout every `retry_after` on each open channel.
    pub fn new(retry_after: Duration) -> Self {
        Self {
            retry_after,
            channels: Mutex::new(HashMap::new()),
        }
    }
}

impl PushTransport for OfflineTransport {
    fn open(&self, channel: &str, _filter: &ChangeFilter) -> SyncResult<ChannelReceiver> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.channels).insert(channel.to_string(), token.clone()) {
            previous.cancel();
        }

        let retry_after = self.retry_after;
        let name = channel.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(retry_after) => {}
                }
                if sender
                    .send(ChannelEvent::Status(ConnectionStatus::TimedOut))
                    .is_err()
                {
                    break;
                }
                debug!(channel = %name, "offline channel reported timeout");
            }
        });

        Ok(receiver)
    }

    fn remove(&self, channel: &str) {
        if let Some(token) = lock(&self.channels).remove(channel) {
            token.cancel();
        }
    }
}
