//! The kinds of server-side work a [`JobLifecycleTracker`] drives.
//!
//! [`JobLifecycleTracker`]: crate::services::job_tracker::JobLifecycleTracker

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::models::{Assessment, GenerationJob, GenerationRequest, Material, Question, WorkStatus};
use crate::domain::ports::{Backend, TriggerAck};
use crate::services::job_tracker::{Settlement, TrackedWork};

/// What a reassessment must beat to count as new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassessBaseline {
    /// Question version at trigger time.
    pub version: u64,
    /// Creation time of the newest assessment at trigger time.
    pub since: Option<DateTime<Utc>>,
}

impl ReassessBaseline {
    /// Capture the baseline from the question and its current assessment.
    pub fn capture(question: &Question, current: Option<&Assessment>) -> Self {
        Self {
            version: question.version,
            since: current.map(|a| a.created_at),
        }
    }

    /// Whether `assessment` was computed for this version after the baseline.
    pub fn is_satisfied_by(&self, assessment: &Assessment) -> bool {
        assessment.question_version == self.version && assessment.is_newer_than(self.since)
    }
}

/// Reassessment of one question.
pub struct Reassessment {
    backend: Arc<dyn Backend>,
    exam_id: String,
    question_id: String,
    baseline: ReassessBaseline,
}

impl Reassessment {
    /// Reassess `question` of `exam_id`, given its assessment before the trigger.
    pub fn new(
        backend: Arc<dyn Backend>,
        exam_id: impl Into<String>,
        question: &Question,
        current: Option<&Assessment>,
    ) -> Self {
        Self {
            backend,
            exam_id: exam_id.into(),
            question_id: question.id.clone(),
            baseline: ReassessBaseline::capture(question, current),
        }
    }

    /// Baseline captured at construction.
    pub const fn baseline(&self) -> ReassessBaseline {
        self.baseline
    }
}

#[async_trait]
impl TrackedWork for Reassessment {
    type Output = Assessment;
    const KIND: &'static str = "reassessment";

    fn failure_message(&self) -> &'static str {
        "Reassessment failed. Please try again."
    }

    fn timeout_message(&self) -> &'static str {
        "Reassessment is taking too long. Refresh the page later."
    }

    async fn trigger(&self) -> SyncResult<TriggerAck> {
        self.backend
            .reassess_question(&self.exam_id, &self.question_id)
            .await
    }

    async fn fetch(&self, _ack: &TriggerAck) -> SyncResult<Option<Assessment>> {
        self.backend
            .latest_assessment(&self.question_id, Some(self.baseline.version))
            .await
    }

    fn settle(&self, output: &Assessment) -> Option<Settlement> {
        self.baseline
            .is_satisfied_by(output)
            .then_some(Settlement::Succeeded)
    }
}

/// Bulk question generation.
pub struct GenerationRun {
    backend: Arc<dyn Backend>,
    request: Option<GenerationRequest>,
}

impl GenerationRun {
    /// Start a new generation job.
    pub fn new(backend: Arc<dyn Backend>, request: GenerationRequest) -> Self {
        Self {
            backend,
            request: Some(request),
        }
    }

    /// Follow a job that is already running; only usable with
    /// [`JobLifecycleTracker::watch`](crate::services::job_tracker::JobLifecycleTracker::watch).
    pub fn existing(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            request: None,
        }
    }
}

#[async_trait]
impl TrackedWork for GenerationRun {
    type Output = GenerationJob;
    const KIND: &'static str = "generation";

    fn failure_message(&self) -> &'static str {
        "Generation failed"
    }

    fn timeout_message(&self) -> &'static str {
        "Generation is taking too long. Refresh the page later."
    }

    async fn trigger(&self) -> SyncResult<TriggerAck> {
        match &self.request {
            Some(request) => self.backend.generate_questions(request).await,
            None => Err(SyncError::Config("no generation request to trigger".to_string())),
        }
    }

    async fn fetch(&self, ack: &TriggerAck) -> SyncResult<Option<GenerationJob>> {
        self.backend.fetch_generation_job(&ack.job_id).await.map(Some)
    }

    fn settle(&self, output: &GenerationJob) -> Option<Settlement> {
        match output.status {
            WorkStatus::Completed => Some(Settlement::Succeeded),
            WorkStatus::Failed => Some(Settlement::Failed(
                output
                    .error_message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| self.failure_message().to_string()),
            )),
            WorkStatus::Pending | WorkStatus::Processing => None,
        }
    }

    fn reports_progress(&self) -> bool {
        true
    }
}

/// Chunking and embedding of uploaded material.
pub struct MaterialEmbedding {
    backend: Arc<dyn Backend>,
    material_id: String,
}

impl MaterialEmbedding {
    /// Embed `material_id`.
    pub fn new(backend: Arc<dyn Backend>, material_id: impl Into<String>) -> Self {
        Self {
            backend,
            material_id: material_id.into(),
        }
    }
}

#[async_trait]
impl TrackedWork for MaterialEmbedding {
    type Output = Material;
    const KIND: &'static str = "embedding";

    fn failure_message(&self) -> &'static str {
        "Processing the material failed"
    }

    fn timeout_message(&self) -> &'static str {
        "Processing the material is taking too long. Refresh the page later."
    }

    async fn trigger(&self) -> SyncResult<TriggerAck> {
        let ack = self.backend.embed_material(&self.material_id).await?;
        Ok(ack.or_job_id(&self.material_id))
    }

    async fn fetch(&self, _ack: &TriggerAck) -> SyncResult<Option<Material>> {
        self.backend.fetch_material(&self.material_id).await.map(Some)
    }

    fn settle(&self, output: &Material) -> Option<Settlement> {
        output.is_embedded().then_some(Settlement::Succeeded)
    }
}
