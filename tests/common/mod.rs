//! In-memory backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use examsync::domain::models::{
    Assessment, Exam, GenerationJob, GenerationRequest, Material, Question, QuestionEdit,
    QuestionOption, QuestionSource, WorkStatus,
};
use examsync::domain::ports::{
    AssessmentSource, QuestionWriter, RecordSource, TriggerAck, WorkTrigger,
};
use examsync::{SyncError, SyncResult};
use serde_json::Map;

/// Backend whose reads come from memory and whose assessment answers are scripted.
#[derive(Default)]
pub struct InMemoryBackend {
    pub exams: Mutex<HashMap<String, Exam>>,
    pub questions: Mutex<HashMap<String, Question>>,
    assessments: Mutex<VecDeque<Option<Assessment>>>,
    pub exam_reads: AtomicUsize,
    pub assessment_reads: AtomicUsize,
    pub triggers: Mutex<Vec<String>>,
}

impl InMemoryBackend {
    pub fn with_exam(exam: Exam) -> Self {
        let backend = Self::default();
        backend.put_exam(exam);
        backend
    }

    pub fn put_exam(&self, exam: Exam) {
        self.exams.lock().unwrap().insert(exam.id.clone(), exam);
    }

    pub fn put_question(&self, question: Question) {
        self.questions.lock().unwrap().insert(question.id.clone(), question);
    }

    /// Answers of `latest_assessment` in order; the last one repeats.
    pub fn script_assessments(&self, answers: impl IntoIterator<Item = Option<Assessment>>) {
        *self.assessments.lock().unwrap() = answers.into_iter().collect();
    }

    pub fn trigger_log(&self) -> Vec<String> {
        self.triggers.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSource for InMemoryBackend {
    async fn fetch_exam(&self, id: &str) -> SyncResult<Exam> {
        self.exam_reads.fetch_add(1, Ordering::SeqCst);
        self.exams
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound { table: "exams", id: id.to_string() })
    }

    async fn fetch_generation_job(&self, id: &str) -> SyncResult<GenerationJob> {
        Err(SyncError::NotFound { table: "generation_jobs", id: id.to_string() })
    }

    async fn fetch_material(&self, id: &str) -> SyncResult<Material> {
        Err(SyncError::NotFound { table: "materials", id: id.to_string() })
    }

    async fn fetch_question(&self, id: &str) -> SyncResult<Question> {
        self.questions
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound { table: "questions", id: id.to_string() })
    }
}

#[async_trait]
impl AssessmentSource for InMemoryBackend {
    async fn latest_assessment(
        &self,
        _question_id: &str,
        question_version: Option<u64>,
    ) -> SyncResult<Option<Assessment>> {
        self.assessment_reads.fetch_add(1, Ordering::SeqCst);
        let mut answers = self.assessments.lock().unwrap();
        let answer = if answers.len() > 1 {
            answers.pop_front().flatten()
        } else {
            answers.front().cloned().flatten()
        };
        Ok(answer.filter(|a| question_version.is_none_or(|v| a.question_version == v)))
    }
}

#[async_trait]
impl QuestionWriter for InMemoryBackend {
    async fn save_question_edit(&self, edit: &QuestionEdit) -> SyncResult<()> {
        let mut questions = self.questions.lock().unwrap();
        let question = questions.get_mut(&edit.question_id).ok_or_else(|| SyncError::NotFound {
            table: "questions",
            id: edit.question_id.clone(),
        })?;
        question.apply(edit);
        Ok(())
    }
}

#[async_trait]
impl WorkTrigger for InMemoryBackend {
    async fn analyze_exam(&self, exam_id: &str) -> SyncResult<TriggerAck> {
        self.triggers.lock().unwrap().push(format!("analyze:{exam_id}"));
        Ok(TriggerAck::processing(exam_id))
    }

    async fn reassess_question(&self, exam_id: &str, question_id: &str) -> SyncResult<TriggerAck> {
        self.triggers
            .lock()
            .unwrap()
            .push(format!("reassess:{exam_id}:{question_id}"));
        Ok(TriggerAck::processing(question_id))
    }

    async fn generate_questions(&self, request: &GenerationRequest) -> SyncResult<TriggerAck> {
        self.triggers
            .lock()
            .unwrap()
            .push(format!("generate:{}", request.material_id));
        Ok(TriggerAck::processing("job-1"))
    }

    async fn embed_material(&self, material_id: &str) -> SyncResult<TriggerAck> {
        self.triggers.lock().unwrap().push(format!("embed:{material_id}"));
        Ok(TriggerAck::processing(material_id))
    }
}

/// Fixed instant `seconds` after a reference point.
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_740_000_000 + seconds, 0).unwrap()
}

pub fn exam(id: &str, status: WorkStatus, analyzed: u32) -> Exam {
    Exam {
        id: id.to_string(),
        title: format!("Exam {id}"),
        course: Some("Biologie".to_string()),
        created_by: None,
        learning_goals: vec!["Fotosynthese".to_string()],
        analysis_status: status,
        question_count: 5,
        questions_analyzed: analyzed,
        created_at: at(0),
        updated_at: at(0),
    }
}

pub fn question(id: &str, exam_id: &str, version: u64) -> Question {
    Question {
        id: id.to_string(),
        exam_id: exam_id.to_string(),
        position: 1,
        stem: "Waar vindt de lichtreactie plaats?".to_string(),
        options: vec![
            QuestionOption { text: "In de thylakoïden".to_string(), position: 0, is_correct: Some(true) },
            QuestionOption { text: "In het stroma".to_string(), position: 1, is_correct: Some(false) },
        ],
        correct_option: 0,
        bloom_level: None,
        learning_goal: None,
        version,
        source: QuestionSource::Manual,
        created_at: at(0),
        updated_at: at(0),
    }
}

pub fn assessment(id: &str, question_id: &str, version: u64, created_at: DateTime<Utc>) -> Assessment {
    Assessment {
        id: id.to_string(),
        question_id: question_id.to_string(),
        question_version: version,
        created_at,
        dimensions: Map::new(),
    }
}
