//! Staleness of a derived artifact relative to its source entity.

use serde::{Deserialize, Serialize};

use crate::domain::models::{Assessment, Question};

/// Whether an artifact computed at `artifact_version` is outdated.
///
/// No artifact at all is "no data", not stale.
pub const fn is_stale(entity_version: u64, artifact_version: Option<u64>) -> bool {
    match artifact_version {
        Some(artifact_version) => entity_version > artifact_version,
        None => false,
    }
}

/// Display-oriented freshness of a question's current assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Freshness {
    /// No assessment exists yet.
    NoData,
    /// The assessment matches the question's current version.
    Current,
    /// The question was edited after the assessment was computed.
    Stale {
        /// Number of versions the assessment lags behind.
        behind: u64,
    },
}

impl Freshness {
    /// Freshness of `assessment` for `question`.
    pub fn of(question: &Question, assessment: Option<&Assessment>) -> Self {
        let artifact_version = assessment.map(|a| a.question_version);
        match artifact_version {
            None => Self::NoData,
            Some(v) if is_stale(question.version, Some(v)) => Self::Stale {
                behind: question.version - v,
            },
            Some(_) => Self::Current,
        }
    }

    /// Whether a warning should be shown.
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}
