//! REST adapter for a PostgREST + edge-functions backend.
//!
//! Point reads go to `rest/v1/<table>` with `eq.` filters. Work triggers POST
//! JSON to `functions/v1/<name>` and need the signed-in user's access token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::models::{
    Assessment, BackendConfig, Exam, GenerationJob, GenerationRequest, Material, Question,
    QuestionEdit,
};
use crate::domain::ports::{AssessmentSource, QuestionWriter, RecordSource, TriggerAck, WorkTrigger};

#[derive(Deserialize)]
struct FunctionError {
    #[serde(default)]
    error: Option<String>,
}

/// Backend reached over HTTP.
pub struct RestBackend {
    http_client: ReqwestClient,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

impl RestBackend {
    /// Build a client from backend settings.
    pub fn new(config: &BackendConfig) -> SyncResult<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{name}", self.base_url)
    }

    /// Reads run as the user when signed in, anonymously otherwise.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn ensure_success(response: Response) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Http {
            status: status.as_u16(),
            body,
        })
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> SyncResult<Vec<T>> {
        let response = self
            .authorize(self.http_client.get(self.rest_url(table)))
            .query(query)
            .send()
            .await?;
        let rows = Self::ensure_success(response).await?.json::<Vec<T>>().await?;
        Ok(rows)
    }

    async fn select_by_id<T: DeserializeOwned>(&self, table: &'static str, id: &str) -> SyncResult<T> {
        let rows: Vec<T> = self
            .select(table, &[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .await?;
        rows.into_iter().next().ok_or_else(|| SyncError::NotFound {
            table,
            id: id.to_string(),
        })
    }

    async fn invoke<B: Serialize + Sync>(&self, function: &str, body: &B) -> SyncResult<TriggerAck> {
        let token = self.access_token.as_deref().ok_or(SyncError::NotAuthenticated)?;

        let response = self
            .http_client
            .post(self.function_url(function))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<FunctionError>(&text)
                .ok()
                .and_then(|e| e.error)
                .unwrap_or_default();
            warn!(function, status = status.as_u16(), error = %message, "function call rejected");
            return Err(SyncError::TriggerRejected {
                status: status.as_u16(),
                message,
            });
        }

        let ack = response.json::<TriggerAck>().await?;
        debug!(function, job_id = %ack.job_id, status = %ack.status, "function call accepted");
        Ok(ack)
    }
}

#[async_trait]
impl RecordSource for RestBackend {
    async fn fetch_exam(&self, id: &str) -> SyncResult<Exam> {
        self.select_by_id("exams", id).await
    }

    async fn fetch_generation_job(&self, id: &str) -> SyncResult<GenerationJob> {
        self.select_by_id("generation_jobs", id).await
    }

    async fn fetch_material(&self, id: &str) -> SyncResult<Material> {
        self.select_by_id("materials", id).await
    }

    async fn fetch_question(&self, id: &str) -> SyncResult<Question> {
        self.select_by_id("questions", id).await
    }
}

#[async_trait]
impl AssessmentSource for RestBackend {
    async fn latest_assessment(
        &self,
        question_id: &str,
        question_version: Option<u64>,
    ) -> SyncResult<Option<Assessment>> {
        let mut query = vec![
            ("question_id", format!("eq.{question_id}")),
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
            ("limit", "1".to_string()),
        ];
        if let Some(version) = question_version {
            query.push(("question_version", format!("eq.{version}")));
        }
        let rows: Vec<Assessment> = self.select("assessments", &query).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl QuestionWriter for RestBackend {
    #[instrument(skip(self, edit), fields(question_id = %edit.question_id, version = edit.version))]
    async fn save_question_edit(&self, edit: &QuestionEdit) -> SyncResult<()> {
        let response = self
            .authorize(self.http_client.patch(self.rest_url("questions")))
            .query(&[("id", format!("eq.{}", edit.question_id))])
            .header("Prefer", "return=minimal")
            .json(edit)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl WorkTrigger for RestBackend {
    async fn analyze_exam(&self, exam_id: &str) -> SyncResult<TriggerAck> {
        self.invoke("analyze", &json!({ "exam_id": exam_id })).await
    }

    async fn reassess_question(&self, exam_id: &str, question_id: &str) -> SyncResult<TriggerAck> {
        self.invoke(
            "analyze",
            &json!({ "exam_id": exam_id, "question_id": question_id }),
        )
        .await
    }

    async fn generate_questions(&self, request: &GenerationRequest) -> SyncResult<TriggerAck> {
        self.invoke("generate", request).await
    }

    async fn embed_material(&self, material_id: &str) -> SyncResult<TriggerAck> {
        let ack = self
            .invoke("embed-material", &json!({ "material_id": material_id }))
            .await?;
        Ok(ack.or_job_id(material_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BloomLevel, GenerationSpec, WorkStatus};
    use mockito::{Matcher, Server};

    fn backend(url: String, access_token: Option<&str>) -> RestBackend {
        RestBackend::new(&BackendConfig {
            url,
            anon_key: "anon-key".to_string(),
            access_token: access_token.map(str::to_string),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    fn exam_row() -> serde_json::Value {
        json!({
            "id": "e1",
            "title": "Biologie H3",
            "analysis_status": "processing",
            "question_count": 10,
            "questions_analyzed": 4,
            "created_at": "2025-03-01T10:00:00Z",
            "updated_at": "2025-03-01T10:05:00Z"
        })
    }

    #[tokio::test]
    async fn test_fetch_exam_filters_by_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/exams")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.e1".into()),
                Matcher::UrlEncoded("select".into(), "*".into()),
            ]))
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer user-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([exam_row()]).to_string())
            .create_async()
            .await;

        let exam = backend(server.url(), Some("user-token")).fetch_exam("e1").await.unwrap();
        assert_eq!(exam.analysis_status, WorkStatus::Processing);
        assert_eq!(exam.questions_analyzed, 4);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_result_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/materials")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let err = backend(server.url(), None).fetch_material("m9").await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { table: "materials", .. }));
    }

    #[tokio::test]
    async fn test_server_error_on_read_is_http_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/generation_jobs")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let err = backend(server.url(), None)
            .fetch_generation_job("j1")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Http { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_latest_assessment_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/assessments")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("question_id".into(), "eq.q1".into()),
                Matcher::UrlEncoded("question_version".into(), "eq.2".into()),
                Matcher::UrlEncoded("order".into(), "created_at.desc".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(
                json!([{
                    "id": "a1",
                    "question_id": "q1",
                    "question_version": 2,
                    "created_at": "2025-03-01T10:00:05Z",
                    "bet_score": 3
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let assessment = backend(server.url(), Some("t"))
            .latest_assessment("q1", Some(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(assessment.question_version, 2);
        assert_eq!(assessment.dimensions["bet_score"], 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_trigger_requires_sign_in() {
        let server = Server::new_async().await;
        let err = backend(server.url(), None).analyze_exam("e1").await.unwrap_err();
        assert!(matches!(err, SyncError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_reassess_posts_to_analyze_function() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/functions/v1/analyze")
            .match_header("authorization", "Bearer user-token")
            .match_body(Matcher::Json(json!({"exam_id": "e1", "question_id": "q1"})))
            .with_status(200)
            .with_body(json!({"job_id": "job-5", "status": "processing"}).to_string())
            .create_async()
            .await;

        let ack = backend(server.url(), Some("user-token"))
            .reassess_question("e1", "q1")
            .await
            .unwrap();
        assert_eq!(ack, TriggerAck::processing("job-5"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_trigger_keeps_server_error_text() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/functions/v1/generate")
            .with_status(422)
            .with_body(json!({"error": "Specificatie ongeldig"}).to_string())
            .create_async()
            .await;

        let request = GenerationRequest {
            material_id: "m1".to_string(),
            exam_id: None,
            specification: GenerationSpec {
                count: 5,
                bloom_level: BloomLevel::Begrijpen,
                learning_goal: "Celdeling".to_string(),
                num_options: 4,
            },
        };
        let err = backend(server.url(), Some("user-token"))
            .generate_questions(&request)
            .await
            .unwrap_err();
        match err {
            SyncError::TriggerRejected { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Specificatie ongeldig");
            }
            other => panic!("Expected TriggerRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_embed_ack_without_job_id() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/functions/v1/embed-material")
            .match_body(Matcher::Json(json!({"material_id": "m1"})))
            .with_status(200)
            .with_body(json!({"chunks": 12}).to_string())
            .create_async()
            .await;

        let ack = backend(server.url(), Some("user-token"))
            .embed_material("m1")
            .await
            .unwrap();
        assert_eq!(ack.job_id, "m1");
        assert!(ack.is_accepted());
    }

    #[tokio::test]
    async fn test_question_edit_is_single_patch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/rest/v1/questions")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.q1".into()))
            .match_body(Matcher::Json(json!({"stem": "Nieuw", "options": [], "version": 3})))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let edit = QuestionEdit {
            question_id: "q1".to_string(),
            stem: "Nieuw".to_string(),
            options: vec![],
            version: 3,
        };
        backend(server.url(), Some("t")).save_question_edit(&edit).await.unwrap();
        mock.assert_async().await;
    }
}
