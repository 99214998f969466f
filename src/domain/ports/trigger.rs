use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::SyncResult;
use crate::domain::models::GenerationRequest;

/// Acknowledgement returned when the server accepts a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerAck {
    /// Identifier of the started work.
    #[serde(default)]
    pub job_id: String,
    /// Reported status, `processing` on acceptance.
    #[serde(default = "default_ack_status")]
    pub status: String,
}

fn default_ack_status() -> String {
    "processing".to_string()
}

impl TriggerAck {
    /// Acknowledgement of work known to be running under `job_id`.
    pub fn processing(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: default_ack_status(),
        }
    }

    /// Whether the server acknowledged the work as running.
    pub fn is_accepted(&self) -> bool {
        self.status == "processing"
    }

    /// Use `entity_id` as job id when the server did not return one.
    #[must_use]
    pub fn or_job_id(mut self, entity_id: &str) -> Self {
        if self.job_id.is_empty() {
            self.job_id = entity_id.to_string();
        }
        self
    }
}

/// Starts asynchronous server-side work.
///
/// Implementations must authenticate with the user's bearer credential and
/// return [`SyncError::TriggerRejected`](crate::domain::errors::SyncError::TriggerRejected)
/// with the server's `error` text on a non-2xx answer.
#[async_trait]
pub trait WorkTrigger: Send + Sync {
    /// Analyze every question of an exam.
    async fn analyze_exam(&self, exam_id: &str) -> SyncResult<TriggerAck>;

    /// Reassess a single question.
    async fn reassess_question(&self, exam_id: &str, question_id: &str) -> SyncResult<TriggerAck>;

    /// Start a bulk generation job.
    async fn generate_questions(&self, request: &GenerationRequest) -> SyncResult<TriggerAck>;

    /// Chunk and embed uploaded material.
    async fn embed_material(&self, material_id: &str) -> SyncResult<TriggerAck>;
}
