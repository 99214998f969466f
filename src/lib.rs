//! Examsync - live status synchronization for long-running backend work
//!
//! Keeps exams, generation jobs, materials and question assessments current
//! while the backend works on them. Updates arrive over a push channel scoped
//! to one row; when that channel keeps failing the record degrades to
//! periodic polling, once and for good. Work that is started on demand
//! (reassessment, generation, embedding) is tracked by a bounded poller until
//! its result appears or the session times out.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): records, errors and the collaborator ports
//! - **Service Layer** (`services`): poller, push manager, fallback,
//!   live records, job trackers and the surface that owns them
//! - **Infrastructure Layer** (`infrastructure`): REST backend, push
//!   transports, configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use examsync::{ConfigLoader, RestBackend, SyncSurface};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let backend = Arc::new(RestBackend::new(&config.backend)?);
//!     let mut surface = SyncSurface::new(backend, None, config.sync);
//!     let mut exam = surface.watch_exam("exam-id");
//!     exam.changed().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{SyncError, SyncResult};
pub use domain::models::{
    Assessment, BackendConfig, Config, Exam, GenerationJob, GenerationRequest, LoggingConfig,
    Material, Question, QuestionEdit, RealtimeConfig, SyncConfig, WorkStatus,
};
pub use domain::ports::{Backend, PushTransport, TriggerAck};
pub use infrastructure::backend::RestBackend;
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::push::{LocalPushHub, OfflineTransport};
pub use services::{
    is_stale, next_version, BoundedPoller, DeliveryMode, Freshness, JobPhase, RecordView,
    SyncSurface, TrackerView,
};
