use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

use crate::domain::errors::SyncResult;

/// Connection status reported by a push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// The channel is connected and delivering.
    Subscribed,
    /// The subscribe handshake timed out.
    TimedOut,
    /// The channel reported an error.
    ChannelError,
    /// The channel was closed by the server or the network.
    Closed,
}

impl ConnectionStatus {
    /// Whether this status counts as a delivery failure.
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::Subscribed)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Subscribed => "subscribed",
            Self::TimedOut => "timed_out",
            Self::ChannelError => "channel_error",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Row-change filter a channel is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    /// Change event, always `UPDATE` for live records.
    pub event: String,
    /// Database schema.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Row filter, e.g. `id=eq.<id>`.
    pub filter: String,
}

impl ChangeFilter {
    /// Updates of one row of `table`.
    pub fn updates_of(table: &str, id: &str) -> Self {
        Self {
            event: "UPDATE".to_string(),
            schema: "public".to_string(),
            table: table.to_string(),
            filter: format!("id=eq.{id}"),
        }
    }
}

/// Something delivered on an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// New column values of the watched row.
    Change(Value),
    /// Connection status change.
    Status(ConnectionStatus),
}

/// Receiving end of an open channel.
pub type ChannelReceiver = mpsc::UnboundedReceiver<ChannelEvent>;

/// Push-subscription primitive offered by the backend.
pub trait PushTransport: Send + Sync {
    /// Open the named channel bound to `filter`.
    fn open(&self, channel: &str, filter: &ChangeFilter) -> SyncResult<ChannelReceiver>;

    /// Tear down the named channel. Unknown names are ignored.
    fn remove(&self, channel: &str);
}
