use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::WorkStatus;

/// An uploaded exam whose questions are analyzed server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    /// Unique identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Optional course name.
    #[serde(default)]
    pub course: Option<String>,
    /// Owner of the exam.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Learning goals the questions are validated against.
    #[serde(default)]
    pub learning_goals: Vec<String>,
    /// Status of the exam-wide analysis.
    #[serde(default)]
    pub analysis_status: WorkStatus,
    /// Number of questions in the exam.
    #[serde(default)]
    pub question_count: u32,
    /// Number of questions analyzed so far.
    #[serde(default)]
    pub questions_analyzed: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Exam {
    /// Fraction of questions analyzed, in `0.0..=1.0`.
    pub fn analysis_progress(&self) -> f64 {
        if self.question_count == 0 {
            return 0.0;
        }
        (f64::from(self.questions_analyzed) / f64::from(self.question_count)).min(1.0)
    }
}
