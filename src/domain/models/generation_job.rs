use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::question::BloomLevel;
use super::status::WorkStatus;

/// What a generation job was asked to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSpec {
    /// Number of questions to generate.
    pub count: u32,
    /// Targeted Bloom level.
    pub bloom_level: BloomLevel,
    /// Learning goal the questions must cover.
    pub learning_goal: String,
    /// Options per question.
    pub num_options: u32,
}

/// Request body for starting a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Source material the questions are drawn from.
    pub material_id: String,
    /// Exam the questions are attached to, if any.
    pub exam_id: Option<String>,
    /// Generation parameters.
    pub specification: GenerationSpec,
}

/// A bulk question generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Unique identifier.
    pub id: String,
    /// Requesting user.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Source material.
    #[serde(default)]
    pub material_id: Option<String>,
    /// Target exam.
    #[serde(default)]
    pub exam_id: Option<String>,
    /// Generation parameters.
    pub specification: GenerationSpec,
    /// Job status.
    pub status: WorkStatus,
    /// Questions produced so far.
    #[serde(default)]
    pub result_question_ids: Vec<String>,
    /// Server-provided failure text.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// Progress counter: generated vs. requested.
    pub fn progress(&self) -> (usize, u32) {
        (self.result_question_ids.len(), self.specification.count)
    }
}
