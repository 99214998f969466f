//! In-process push transport.
//!
//! Routes row changes published inside the process to every open channel
//! whose filter matches. Used to feed the engine from an embedding
//! application and to drive channels deterministically in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::ports::{ChangeFilter, ChannelEvent, ChannelReceiver, ConnectionStatus, PushTransport};
use crate::services::lock;

struct LocalChannel {
    filter: ChangeFilter,
    sender: mpsc::UnboundedSender<ChannelEvent>,
}

/// Push transport backed by in-memory channels.
pub struct LocalPushHub {
    channels: Mutex<HashMap<String, LocalChannel>>,
    opened: Mutex<HashMap<String, usize>>,
    announce_subscribed: bool,
}

impl Default for LocalPushHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalPushHub {
    /// Hub that reports `SUBSCRIBED` as soon as a channel opens.
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            opened: Mutex::new(HashMap::new()),
            announce_subscribed: true,
        }
    }

    /// Hub that stays silent on open; statuses come only from [`Self::emit_status`].
    pub fn silent() -> Self {
        Self {
            announce_subscribed: false,
            ..Self::new()
        }
    }

    /// Deliver new column values of a row to every matching channel.
    ///
    /// Returns the number of channels the change was delivered to.
    pub fn publish_change(&self, table: &str, id: &str, new_values: Value) -> usize {
        let row_filter = format!("id=eq.{id}");
        let channels = lock(&self.channels);
        channels
            .values()
            .filter(|c| c.filter.table == table && c.filter.filter == row_filter)
            .filter(|c| c.sender.send(ChannelEvent::Change(new_values.clone())).is_ok())
            .count()
    }

    /// Report a connection status on one channel. Returns false if it is not open.
    pub fn emit_status(&self, channel: &str, status: ConnectionStatus) -> bool {
        lock(&self.channels)
            .get(channel)
            .is_some_and(|c| c.sender.send(ChannelEvent::Status(status)).is_ok())
    }

    /// Drop a channel from the transport side, as a lost connection would.
    pub fn disconnect(&self, channel: &str) -> bool {
        lock(&self.channels).remove(channel).is_some()
    }

    /// Whether the channel is currently open.
    pub fn is_open(&self, channel: &str) -> bool {
        lock(&self.channels).contains_key(channel)
    }

    /// How many times the channel has been opened.
    pub fn open_count(&self, channel: &str) -> usize {
        lock(&self.opened).get(channel).copied().unwrap_or(0)
    }
}

impl PushTransport for LocalPushHub {
    fn open(&self, channel: &str, filter: &ChangeFilter) -> SyncResult<ChannelReceiver> {
        let mut channels = lock(&self.channels);
        if channels.contains_key(channel) {
            return Err(SyncError::Channel(format!("channel {channel} is already open")));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        if self.announce_subscribed {
            let _ = sender.send(ChannelEvent::Status(ConnectionStatus::Subscribed));
        }
        channels.insert(
            channel.to_string(),
            LocalChannel {
                filter: filter.clone(),
                sender,
            },
        );
        *lock(&self.opened).entry(channel.to_string()).or_default() += 1;
        debug!(channel, table = %filter.table, "local channel opened");
        Ok(receiver)
    }

    fn remove(&self, channel: &str) {
        if lock(&self.channels).remove(channel).is_some() {
            debug!(channel, "local channel removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_twice_is_rejected() {
        let hub = LocalPushHub::new();
        let filter = ChangeFilter::updates_of("exams", "e1");
        let _rx = hub.open("exams-e1", &filter).unwrap();
        assert!(matches!(hub.open("exams-e1", &filter), Err(SyncError::Channel(_))));

        hub.remove("exams-e1");
        assert!(hub.open("exams-e1", &filter).is_ok());
        assert_eq!(hub.open_count("exams-e1"), 2);
    }

    #[tokio::test]
    async fn test_changes_routed_by_filter() {
        let hub = LocalPushHub::silent();
        let mut e1 = hub.open("exams-e1", &ChangeFilter::updates_of("exams", "e1")).unwrap();
        let mut e2 = hub.open("exams-e2", &ChangeFilter::updates_of("exams", "e2")).unwrap();

        assert_eq!(hub.publish_change("exams", "e1", serde_json::json!({"title": "x"})), 1);
        assert_eq!(hub.publish_change("materials", "e1", serde_json::json!({})), 0);

        assert_eq!(
            e1.recv().await,
            Some(ChannelEvent::Change(serde_json::json!({"title": "x"})))
        );
        assert!(e2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_ends_receiver() {
        let hub = LocalPushHub::silent();
        let mut rx = hub.open("exams-e1", &ChangeFilter::updates_of("exams", "e1")).unwrap();
        assert!(hub.disconnect("exams-e1"));
        assert_eq!(rx.recv().await, None);
        assert!(!hub.emit_status("exams-e1", ConnectionStatus::Closed));
    }
}
