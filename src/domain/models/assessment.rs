use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Quality assessment computed for one specific version of a question.
///
/// Several assessments can exist per question; the most recently created
/// one is the current view. Scoring dimensions are carried opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Unique identifier.
    pub id: String,
    /// Assessed question.
    pub question_id: String,
    /// Question version the assessment was computed against.
    pub question_version: u64,
    /// Creation time, used to order assessments.
    pub created_at: DateTime<Utc>,
    /// Remaining scored dimensions.
    #[serde(flatten)]
    pub dimensions: Map<String, Value>,
}

impl Assessment {
    /// Whether this assessment was created strictly after `since`.
    ///
    /// With no baseline any assessment counts as newer.
    pub fn is_newer_than(&self, since: Option<DateTime<Utc>>) -> bool {
        since.is_none_or(|since| self.created_at > since)
    }
}
