//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the contracts of the collaborators the engine talks to:
//! - RecordSource / AssessmentSource: point reads of entities and assessments
//! - QuestionWriter: versioned question edits
//! - WorkTrigger: requests that start server-side work
//! - PushTransport: push channels scoped to one row
//!
//! These traits keep the engine independent of the managed backend.

pub mod push;
pub mod records;
pub mod trigger;

pub use push::{ChangeFilter, ChannelEvent, ChannelReceiver, ConnectionStatus, PushTransport};
pub use records::{AssessmentSource, LiveEntity, QuestionWriter, RecordSource};
pub use trigger::{TriggerAck, WorkTrigger};

/// Everything the engine needs from the backend in one object.
pub trait Backend: RecordSource + AssessmentSource + QuestionWriter + WorkTrigger {}

impl<T> Backend for T where T: RecordSource + AssessmentSource + QuestionWriter + WorkTrigger {}
