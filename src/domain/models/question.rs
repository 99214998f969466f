use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::version_clock::{next_version, INITIAL_VERSION};

/// Bloom taxonomy level a question targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloomLevel {
    /// Remember.
    Onthouden,
    /// Understand.
    Begrijpen,
    /// Apply.
    Toepassen,
    /// Analyze.
    Analyseren,
}

/// Where a question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSource {
    /// Typed in by a user.
    #[default]
    Manual,
    /// Produced by a generation job.
    Generated,
    /// Parsed from an uploaded exam.
    Imported,
}

/// One answer option of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// Option text.
    pub text: String,
    /// Zero-based display position.
    pub position: u32,
    /// Whether this is the correct answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

/// A multiple-choice question carrying a content version.
///
/// `version` starts at 1 and grows by exactly one per content edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier.
    pub id: String,
    /// Owning exam.
    pub exam_id: String,
    /// Zero-based position within the exam.
    pub position: u32,
    /// Question stem.
    pub stem: String,
    /// Answer options.
    pub options: Vec<QuestionOption>,
    /// Index of the correct option.
    pub correct_option: i32,
    /// Targeted Bloom level.
    #[serde(default)]
    pub bloom_level: Option<BloomLevel>,
    /// Learning goal covered by the question.
    #[serde(default)]
    pub learning_goal: Option<String>,
    /// Content version.
    #[serde(default = "default_version")]
    pub version: u64,
    /// Origin of the question.
    #[serde(default)]
    pub source: QuestionSource,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

const fn default_version() -> u64 {
    INITIAL_VERSION
}

/// Content change for a question, persisted as one write together with its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEdit {
    /// Question being edited.
    #[serde(skip)]
    pub question_id: String,
    /// New stem.
    pub stem: String,
    /// New options.
    pub options: Vec<QuestionOption>,
    /// Version the edited content carries.
    pub version: u64,
}

impl Question {
    /// Build the edit for new content, bumping the version.
    ///
    /// The returned edit must be persisted as a whole; see [`Question::apply`]
    /// for updating the local copy once the write succeeded.
    pub fn edit(&self, stem: impl Into<String>, options: Vec<QuestionOption>) -> QuestionEdit {
        QuestionEdit {
            question_id: self.id.clone(),
            stem: stem.into(),
            options,
            version: next_version(self.version),
        }
    }

    /// Apply a persisted edit to this local copy.
    pub fn apply(&mut self, edit: &QuestionEdit) {
        self.stem.clone_from(&edit.stem);
        self.options.clone_from(&edit.options);
        self.version = edit.version;
    }
}
