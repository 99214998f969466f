//! Scripted backend and fixtures shared by service tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Map;

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::models::{
    Assessment, BloomLevel, Exam, GenerationJob, GenerationRequest, GenerationSpec, Material,
    Question, QuestionEdit, QuestionOption, QuestionSource, WorkStatus,
};
use crate::domain::ports::{
    AssessmentSource, QuestionWriter, RecordSource, TriggerAck, WorkTrigger,
};
use crate::services::lock;

/// Answers in order; the last one repeats forever.
struct Script<T>(VecDeque<T>);

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self(VecDeque::new())
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Option<T> {
        if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.0.front().cloned()
        }
    }
}

#[derive(Default)]
pub struct MockBackend {
    exam: Mutex<Option<Exam>>,
    pub exam_fetches: AtomicUsize,
    pub fail_exam_reads: AtomicBool,
    jobs: Mutex<Script<GenerationJob>>,
    pub job_fetches: AtomicUsize,
    materials: Mutex<Script<Material>>,
    pub material_fetches: AtomicUsize,
    assessments: Mutex<Script<Option<Assessment>>>,
    pub assessment_fetches: AtomicUsize,
    pub assessment_versions: Mutex<Vec<Option<u64>>>,
    rejection: Mutex<Option<(u16, String)>>,
    trigger_delay: Mutex<Option<Duration>>,
    pub triggers: Mutex<Vec<String>>,
    pub saved_edits: Mutex<Vec<QuestionEdit>>,
    pub fail_saves: AtomicBool,
}

impl MockBackend {
    pub fn set_exam(&self, exam: Exam) {
        *lock(&self.exam) = Some(exam);
    }

    pub fn script_jobs(&self, jobs: impl IntoIterator<Item = GenerationJob>) {
        lock(&self.jobs).0 = jobs.into_iter().collect();
    }

    pub fn script_materials(&self, materials: impl IntoIterator<Item = Material>) {
        lock(&self.materials).0 = materials.into_iter().collect();
    }

    pub fn script_assessments(&self, answers: impl IntoIterator<Item = Option<Assessment>>) {
        lock(&self.assessments).0 = answers.into_iter().collect();
    }

    pub fn reject_triggers(&self, status: u16, message: &str) {
        *lock(&self.rejection) = Some((status, message.to_string()));
    }

    pub fn delay_triggers(&self, delay: Duration) {
        *lock(&self.trigger_delay) = Some(delay);
    }

    pub fn trigger_log(&self) -> Vec<String> {
        lock(&self.triggers).clone()
    }

    async fn trigger(&self, call: String, job_id: &str) -> SyncResult<TriggerAck> {
        lock(&self.triggers).push(call);
        let delay = *lock(&self.trigger_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let rejection = lock(&self.rejection).clone();
        if let Some((status, message)) = rejection {
            return Err(SyncError::TriggerRejected { status, message });
        }
        Ok(TriggerAck {
            job_id: job_id.to_string(),
            status: "processing".to_string(),
        })
    }
}

#[async_trait]
impl RecordSource for MockBackend {
    async fn fetch_exam(&self, id: &str) -> SyncResult<Exam> {
        self.exam_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_exam_reads.load(Ordering::SeqCst) {
            return Err(SyncError::Network("connection reset".to_string()));
        }
        lock(&self.exam).clone().ok_or_else(|| SyncError::NotFound {
            table: "exams",
            id: id.to_string(),
        })
    }

    async fn fetch_generation_job(&self, id: &str) -> SyncResult<GenerationJob> {
        self.job_fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.jobs).next().ok_or_else(|| SyncError::NotFound {
            table: "generation_jobs",
            id: id.to_string(),
        })
    }

    async fn fetch_material(&self, id: &str) -> SyncResult<Material> {
        self.material_fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.materials).next().ok_or_else(|| SyncError::NotFound {
            table: "materials",
            id: id.to_string(),
        })
    }

    async fn fetch_question(&self, id: &str) -> SyncResult<Question> {
        Err(SyncError::NotFound {
            table: "questions",
            id: id.to_string(),
        })
    }
}

#[async_trait]
impl AssessmentSource for MockBackend {
    async fn latest_assessment(
        &self,
        _question_id: &str,
        question_version: Option<u64>,
    ) -> SyncResult<Option<Assessment>> {
        self.assessment_fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.assessment_versions).push(question_version);
        Ok(lock(&self.assessments).next().flatten())
    }
}

#[async_trait]
impl QuestionWriter for MockBackend {
    async fn save_question_edit(&self, edit: &QuestionEdit) -> SyncResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SyncError::Http {
                status: 409,
                body: "conflict".to_string(),
            });
        }
        lock(&self.saved_edits).push(edit.clone());
        Ok(())
    }
}

#[async_trait]
impl WorkTrigger for MockBackend {
    async fn analyze_exam(&self, exam_id: &str) -> SyncResult<TriggerAck> {
        self.trigger(format!("analyze:{exam_id}"), exam_id).await
    }

    async fn reassess_question(&self, exam_id: &str, question_id: &str) -> SyncResult<TriggerAck> {
        self.trigger(format!("reassess:{exam_id}:{question_id}"), question_id)
            .await
    }

    async fn generate_questions(&self, request: &GenerationRequest) -> SyncResult<TriggerAck> {
        self.trigger(format!("generate:{}", request.material_id), "job-1")
            .await
    }

    async fn embed_material(&self, material_id: &str) -> SyncResult<TriggerAck> {
        // The embedding function does not return a job id
        self.trigger(format!("embed:{material_id}"), "").await
    }
}

/// Let spawned tasks run; advances a paused clock by one millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_740_000_000, 0).unwrap_or_default()
}

pub fn exam(id: &str, status: WorkStatus, analyzed: u32) -> Exam {
    Exam {
        id: id.to_string(),
        title: format!("Exam {id}"),
        course: None,
        created_by: Some("docent-1".to_string()),
        learning_goals: vec![],
        analysis_status: status,
        question_count: 5,
        questions_analyzed: analyzed,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

pub fn spec(count: u32) -> GenerationSpec {
    GenerationSpec {
        count,
        bloom_level: BloomLevel::Toepassen,
        learning_goal: "Begrijpt recursie".to_string(),
        num_options: 4,
    }
}

pub fn generation_request(material_id: &str) -> GenerationRequest {
    GenerationRequest {
        material_id: material_id.to_string(),
        exam_id: Some("e1".to_string()),
        specification: spec(3),
    }
}

pub fn job(id: &str, status: WorkStatus, results: &[&str]) -> GenerationJob {
    GenerationJob {
        id: id.to_string(),
        created_by: Some("docent-1".to_string()),
        material_id: Some("m1".to_string()),
        exam_id: Some("e1".to_string()),
        specification: spec(3),
        status,
        result_question_ids: results.iter().map(ToString::to_string).collect(),
        error_message: None,
        created_at: epoch(),
        completed_at: None,
    }
}

pub fn material(id: &str, chunk_count: u32) -> Material {
    Material {
        id: id.to_string(),
        uploaded_by: Some("docent-1".to_string()),
        exam_id: None,
        filename: "hoofdstuk-3.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
        chunk_count,
        created_at: epoch(),
    }
}

pub fn question(id: &str, version: u64) -> Question {
    Question {
        id: id.to_string(),
        exam_id: "e1".to_string(),
        position: 0,
        stem: "Wat is de hoofdstad van Frankrijk?".to_string(),
        options: vec![
            QuestionOption {
                text: "Parijs".to_string(),
                position: 0,
                is_correct: Some(true),
            },
            QuestionOption {
                text: "Lyon".to_string(),
                position: 1,
                is_correct: None,
            },
        ],
        correct_option: 0,
        bloom_level: Some(BloomLevel::Onthouden),
        learning_goal: None,
        version,
        source: QuestionSource::Manual,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

pub fn assessment(id: &str, question_version: u64, created_at: DateTime<Utc>) -> Assessment {
    Assessment {
        id: id.to_string(),
        question_id: "q1".to_string(),
        question_version,
        created_at,
        dimensions: Map::new(),
    }
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    epoch() + chrono::Duration::seconds(seconds)
}
