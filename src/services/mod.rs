pub mod bounded_poller;
pub mod fallback_coordinator;
pub mod job_tracker;
pub mod live_record;
pub mod push_subscription;
pub mod staleness;
pub mod sync_surface;
pub mod tracked_work;
pub mod version_clock;

#[cfg(test)]
pub(crate) mod test_support;

pub use bounded_poller::{BoundedPoller, PollHandle, PollOutcome};
pub use fallback_coordinator::{DeliveryMode, FallbackCoordinator, FallbackPolicy};
pub use job_tracker::{JobLifecycleTracker, JobPhase, Settlement, TrackedWork, TrackerView};
pub use live_record::{LiveRecord, RecordView};
pub use push_subscription::{PushSubscriptionManager, StatusReport, SubscriptionHandle};
pub use staleness::{is_stale, Freshness};
pub use sync_surface::SyncSurface;
pub use tracked_work::{GenerationRun, MaterialEmbedding, ReassessBaseline, Reassessment};
pub use version_clock::{next_version, INITIAL_VERSION};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
