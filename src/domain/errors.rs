//! Error taxonomy for the synchronization engine.

use thiserror::Error;

/// Errors raised by collaborators and surfaced by the engine as plain data.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A work trigger was refused by the server.
    #[error("{message}")]
    TriggerRejected {
        /// HTTP status of the refusal
        status: u16,
        /// Server-provided reason, shown to the user as is
        message: String,
    },

    /// The trigger needs a signed-in session and none is configured.
    #[error("Not signed in")]
    NotAuthenticated,

    /// A point read matched no row.
    #[error("{table} record not found: {id}")]
    NotFound {
        /// Table that was read
        table: &'static str,
        /// Row id that was asked for
        id: String,
    },

    /// Any other non-success response.
    #[error("Request failed with status {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, unparsed
        body: String,
    },

    /// The request never got a response.
    #[error("Network error: {0}")]
    Network(String),

    /// A response body did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The push transport could not open or keep a channel.
    #[error("Push channel error: {0}")]
    Channel(String),

    /// Backend settings could not be turned into a client.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Message suitable for showing to the user.
    ///
    /// Trigger rejections carry the server text verbatim; anything else
    /// falls back to `generic`.
    pub fn user_message(&self, generic: &str) -> String {
        match self {
            Self::TriggerRejected { message, .. } if !message.trim().is_empty() => message.clone(),
            Self::NotAuthenticated => self.to_string(),
            _ => generic.to_string(),
        }
    }

    /// Whether this error came from the transport rather than the server's answer.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http { status: 500..=599, .. })
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
