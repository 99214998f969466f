use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::errors::SyncResult;
use crate::domain::models::{Assessment, Exam, GenerationJob, Material, Question, QuestionEdit};

/// Point reads of the current record of an entity.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Get an exam by ID
    async fn fetch_exam(&self, id: &str) -> SyncResult<Exam>;

    /// Get a generation job by ID
    async fn fetch_generation_job(&self, id: &str) -> SyncResult<GenerationJob>;

    /// Get a material by ID
    async fn fetch_material(&self, id: &str) -> SyncResult<Material>;

    /// Get a question by ID
    async fn fetch_question(&self, id: &str) -> SyncResult<Question>;
}

/// Reads of derived assessments.
#[async_trait]
pub trait AssessmentSource: Send + Sync {
    /// Most recently created assessment of a question.
    ///
    /// When `question_version` is set only assessments computed against that
    /// version are considered.
    async fn latest_assessment(
        &self,
        question_id: &str,
        question_version: Option<u64>,
    ) -> SyncResult<Option<Assessment>>;
}

/// Persists question edits.
#[async_trait]
pub trait QuestionWriter: Send + Sync {
    /// Write content and version of an edit in one request.
    async fn save_question_edit(&self, edit: &QuestionEdit) -> SyncResult<()>;
}

/// An entity that can be kept live through push deltas and fallback polling.
#[async_trait]
pub trait LiveEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Backing table, used for channel filters.
    const TABLE: &'static str;

    /// Point read of the current record.
    async fn fetch<S: RecordSource + ?Sized>(source: &S, id: &str) -> SyncResult<Self>;

    /// Whether `fresh` differs from `self` in a field worth re-rendering for.
    fn has_notable_change(&self, fresh: &Self) -> bool;
}

#[async_trait]
impl LiveEntity for Exam {
    const TABLE: &'static str = "exams";

    async fn fetch<S: RecordSource + ?Sized>(source: &S, id: &str) -> SyncResult<Self> {
        source.fetch_exam(id).await
    }

    fn has_notable_change(&self, fresh: &Self) -> bool {
        self.analysis_status != fresh.analysis_status
            || self.questions_analyzed != fresh.questions_analyzed
    }
}

#[async_trait]
impl LiveEntity for GenerationJob {
    const TABLE: &'static str = "generation_jobs";

    async fn fetch<S: RecordSource + ?Sized>(source: &S, id: &str) -> SyncResult<Self> {
        source.fetch_generation_job(id).await
    }

    fn has_notable_change(&self, fresh: &Self) -> bool {
        self.status != fresh.status
            || self.result_question_ids.len() != fresh.result_question_ids.len()
    }
}

#[async_trait]
impl LiveEntity for Material {
    const TABLE: &'static str = "materials";

    async fn fetch<S: RecordSource + ?Sized>(source: &S, id: &str) -> SyncResult<Self> {
        source.fetch_material(id).await
    }

    fn has_notable_change(&self, fresh: &Self) -> bool {
        self.chunk_count != fresh.chunk_count
    }
}
