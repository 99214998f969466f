//! One-way degradation from push delivery to polling.
//!
//! A live record starts in [`DeliveryMode::Live`]. Once its push channel has
//! failed `max_consecutive_failures` times in a row the coordinator moves to
//! [`DeliveryMode::FallingBack`] while the channel is torn down, then to
//! [`DeliveryMode::Polling`] once the fallback loop runs. There is no way
//! back to `Live` for the lifetime of the owner.

use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::domain::models::SyncConfig;
use crate::services::push_subscription::StatusReport;

/// Which mechanism currently delivers updates for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Updates arrive over the push channel.
    Live,
    /// The push channel is being torn down.
    FallingBack,
    /// Updates are pulled by the fallback poll loop.
    Polling,
}

impl DeliveryMode {
    /// Whether `next` is the single allowed successor of this mode.
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Live, Self::FallingBack) | (Self::FallingBack, Self::Polling)
        )
    }
}

/// Threshold and cadence of the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Consecutive push failures that trigger the switch.
    pub max_consecutive_failures: u32,
    /// Interval of the unbounded fallback poll loop.
    pub poll_interval: Duration,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for FallbackPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_consecutive_failures: config.max_consecutive_failures,
            poll_interval: config.fallback_poll_interval(),
        }
    }
}

/// Tracks the delivery mode of one record.
#[derive(Debug, Clone)]
pub struct FallbackCoordinator {
    policy: FallbackPolicy,
    mode: DeliveryMode,
}

impl FallbackCoordinator {
    /// Start in `Live` mode.
    pub const fn new(policy: FallbackPolicy) -> Self {
        Self {
            policy,
            mode: DeliveryMode::Live,
        }
    }

    /// Current mode.
    pub const fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Policy in effect.
    pub const fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Feed a channel status report.
    ///
    /// Returns `true` exactly once: on the report that crosses the threshold
    /// while still `Live`, or on a report that the channel is gone whatever
    /// the count. The caller must then close the channel and start polling.
    pub fn observe(&mut self, report: StatusReport) -> bool {
        if self.mode != DeliveryMode::Live {
            return false;
        }
        if !report.channel_gone
            && report.consecutive_failures < self.policy.max_consecutive_failures
        {
            return false;
        }
        info!(
            status = %report.status,
            consecutive_failures = report.consecutive_failures,
            channel_gone = report.channel_gone,
            "push delivery lost, falling back to polling"
        );
        self.advance(DeliveryMode::FallingBack)
    }

    /// Skip push delivery entirely, e.g. when the channel cannot be opened.
    ///
    /// Returns `true` if the caller must start polling.
    pub fn abandon_push(&mut self) -> bool {
        self.advance(DeliveryMode::FallingBack)
    }

    /// Record that the fallback loop is running.
    pub fn polling_started(&mut self) -> bool {
        self.advance(DeliveryMode::Polling)
    }

    fn advance(&mut self, next: DeliveryMode) -> bool {
        if !self.mode.can_advance_to(next) {
            return false;
        }
        self.mode = next;
        true
    }
}
