//! Owner of every live record and tracker of one UI surface.
//!
//! Each entity id has at most one live record and at most one tracker per
//! kind of work. Asking again for the same id reuses the live record, and
//! restarts the tracker after cancelling its running session. Tearing the
//! surface down (explicitly or by dropping it) cancels every timer and
//! closes every channel it opened.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::domain::errors::SyncResult;
use crate::domain::models::{
    Assessment, Exam, GenerationJob, GenerationRequest, Material, Question, QuestionEdit,
    QuestionOption, SyncConfig,
};
use crate::domain::ports::{Backend, PushTransport, TriggerAck};
use crate::services::bounded_poller::BoundedPoller;
use crate::services::fallback_coordinator::FallbackPolicy;
use crate::services::job_tracker::{JobLifecycleTracker, TrackerView};
use crate::services::live_record::{LiveRecord, RecordView};
use crate::services::push_subscription::PushSubscriptionManager;
use crate::services::tracked_work::{GenerationRun, MaterialEmbedding, Reassessment};

/// The more recently created of two assessments.
fn newest<'a>(a: Option<&'a Assessment>, b: Option<&'a Assessment>) -> Option<&'a Assessment> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.created_at > a.created_at { b } else { a }),
        (a, b) => a.or(b),
    }
}

/// Live state of one UI surface.
pub struct SyncSurface {
    backend: Arc<dyn Backend>,
    push: Option<PushSubscriptionManager>,
    config: SyncConfig,
    exams: HashMap<String, LiveRecord<Exam>>,
    reassessments: HashMap<String, JobLifecycleTracker<Assessment>>,
    /// Keyed by material id.
    generations: HashMap<String, JobLifecycleTracker<GenerationJob>>,
    /// Keyed by job id.
    job_watches: HashMap<String, JobLifecycleTracker<GenerationJob>>,
    embeddings: HashMap<String, JobLifecycleTracker<Material>>,
}

impl SyncSurface {
    /// Surface over `backend`. Without a push transport every live record
    /// polls from the start.
    pub fn new(
        backend: Arc<dyn Backend>,
        push: Option<Arc<dyn PushTransport>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            backend,
            push: push.map(PushSubscriptionManager::new),
            config,
            exams: HashMap::new(),
            reassessments: HashMap::new(),
            generations: HashMap::new(),
            job_watches: HashMap::new(),
            embeddings: HashMap::new(),
        }
    }

    fn job_poller(&self, label: &'static str) -> BoundedPoller {
        BoundedPoller::new(self.config.job_poll_interval(), self.config.poll_timeout()).label(label)
    }

    /// Keep an exam live. Mounting an exam that is already live reuses it.
    pub fn watch_exam(&mut self, exam_id: &str) -> watch::Receiver<RecordView<Exam>> {
        if let Some(record) = self.exams.get(exam_id) {
            return record.subscribe();
        }
        let record = LiveRecord::mount(
            exam_id,
            Arc::clone(&self.backend),
            self.push.as_ref(),
            FallbackPolicy::from(&self.config),
        );
        let view = record.subscribe();
        self.exams.insert(exam_id.to_string(), record);
        view
    }

    /// Stop keeping an exam live.
    pub fn unwatch_exam(&mut self, exam_id: &str) -> bool {
        self.exams.remove(exam_id).is_some()
    }

    /// Start analysis of every question of an exam and follow its progress
    /// through the exam's live record.
    ///
    /// A rejected trigger is returned as is; its
    /// [`user_message`](crate::domain::errors::SyncError::user_message) is
    /// what should be shown.
    pub async fn analyze_exam(
        &mut self,
        exam_id: &str,
    ) -> SyncResult<watch::Receiver<RecordView<Exam>>> {
        let ack = self.backend.analyze_exam(exam_id).await?;
        info!(exam_id, job_id = %ack.job_id, "exam analysis started");
        Ok(self.watch_exam(exam_id))
    }

    /// Reassess one question. `current` is the assessment shown before the
    /// trigger; it stays visible until a newer one arrives.
    ///
    /// When an earlier run of this question already produced a newer
    /// assessment, that one is the baseline the new run must beat.
    pub fn reassess(
        &mut self,
        exam_id: &str,
        question: &Question,
        current: Option<Assessment>,
    ) -> watch::Receiver<TrackerView<Assessment>> {
        let shown = self
            .reassessments
            .get(&question.id)
            .and_then(|tracker| tracker.snapshot().data);
        let baseline = newest(current.as_ref(), shown.as_ref());
        let work = Reassessment::new(Arc::clone(&self.backend), exam_id, question, baseline);
        let poller = BoundedPoller::new(
            self.config.reassess_poll_interval(),
            self.config.poll_timeout(),
        )
        .label("reassessment");
        let tracker = self
            .reassessments
            .entry(question.id.clone())
            .or_insert_with(|| JobLifecycleTracker::new(question.id.clone(), poller, current));
        tracker.start(work);
        tracker.subscribe()
    }

    /// Start a generation job for a material.
    pub fn generate(&mut self, request: GenerationRequest) -> watch::Receiver<TrackerView<GenerationJob>> {
        let poller = self.job_poller("generation");
        let key = request.material_id.clone();
        let work = GenerationRun::new(Arc::clone(&self.backend), request);
        let tracker = self
            .generations
            .entry(key.clone())
            .or_insert_with(|| JobLifecycleTracker::new(key, poller, None));
        tracker.start(work);
        tracker.subscribe()
    }

    /// Follow a generation job that is already running.
    pub fn watch_generation_job(&mut self, job_id: &str) -> watch::Receiver<TrackerView<GenerationJob>> {
        let poller = self.job_poller("generation");
        let work = GenerationRun::existing(Arc::clone(&self.backend));
        let tracker = self
            .job_watches
            .entry(job_id.to_string())
            .or_insert_with(|| JobLifecycleTracker::new(job_id, poller, None));
        tracker.watch(work, TriggerAck::processing(job_id));
        tracker.subscribe()
    }

    /// Chunk and embed a material, polling until it has chunks.
    pub fn embed_material(&mut self, material_id: &str) -> watch::Receiver<TrackerView<Material>> {
        let poller = self.job_poller("embedding");
        let work = MaterialEmbedding::new(Arc::clone(&self.backend), material_id);
        let tracker = self
            .embeddings
            .entry(material_id.to_string())
            .or_insert_with(|| JobLifecycleTracker::new(material_id, poller, None));
        tracker.start(work);
        tracker.subscribe()
    }

    /// Edit a question's content.
    ///
    /// The new version travels with the content in a single write, and the
    /// local copy is only updated once the write succeeded.
    pub async fn save_question_edit(
        &self,
        question: &mut Question,
        stem: impl Into<String>,
        options: Vec<QuestionOption>,
    ) -> SyncResult<QuestionEdit> {
        let edit = question.edit(stem, options);
        self.backend.save_question_edit(&edit).await?;
        question.apply(&edit);
        debug!(question_id = %question.id, version = question.version, "question edit saved");
        Ok(edit)
    }

    /// Number of live records and trackers held.
    pub fn active_count(&self) -> usize {
        self.exams.len()
            + self.reassessments.len()
            + self.generations.len()
            + self.job_watches.len()
            + self.embeddings.len()
    }

    /// Names of push channels still open.
    pub fn open_channels(&self) -> Vec<String> {
        self.push
            .as_ref()
            .map(PushSubscriptionManager::open_channels)
            .unwrap_or_default()
    }

    /// Cancel every timer and close every channel.
    pub fn teardown(&mut self) {
        let held = self.active_count();
        for tracker in self.reassessments.values() {
            tracker.cancel();
        }
        for tracker in self.generations.values().chain(self.job_watches.values()) {
            tracker.cancel();
        }
        for tracker in self.embeddings.values() {
            tracker.cancel();
        }
        self.reassessments.clear();
        self.generations.clear();
        self.job_watches.clear();
        self.embeddings.clear();
        self.exams.clear();
        if let Some(push) = &self.push {
            push.close_all();
        }
        if held > 0 {
            debug!(held, "sync surface torn down");
        }
    }
}

impl Drop for SyncSurface {
    fn drop(&mut self) {
        self.teardown();
    }
}
