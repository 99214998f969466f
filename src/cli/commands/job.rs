//! Generation job commands.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::{follow, report, CommandContext, TrackerOutput};
use crate::cli::output::{truncate, CommandOutput};
use crate::domain::models::{BloomLevel, GenerationJob, GenerationRequest, GenerationSpec, WorkStatus};
use crate::services::{JobPhase, TrackerView};

#[derive(Args, Debug)]
pub struct WatchJobArgs {
    /// Generation job ID
    pub job_id: String,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Material to generate questions from
    #[arg(long)]
    pub material: String,

    /// Exam the generated questions belong to
    #[arg(long)]
    pub exam: Option<String>,

    /// Number of questions to generate
    #[arg(long, default_value_t = 5)]
    pub count: u32,

    /// Bloom level (onthouden, begrijpen, toepassen, analyseren)
    #[arg(long)]
    pub bloom: String,

    /// Learning goal the questions should test
    #[arg(long)]
    pub goal: String,

    /// Number of answer options per question
    #[arg(long, default_value_t = 4)]
    pub options: u32,
}

impl GenerateArgs {
    pub fn into_request(self) -> Result<GenerationRequest> {
        let bloom_level: BloomLevel =
            serde_json::from_value(serde_json::Value::String(self.bloom.to_lowercase()))
                .with_context(|| format!("Unknown bloom level: {}", self.bloom))?;
        Ok(GenerationRequest {
            material_id: self.material,
            exam_id: self.exam,
            specification: GenerationSpec {
                count: self.count,
                bloom_level,
                learning_goal: self.goal,
                num_options: self.options,
            },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    pub id: String,
    pub status: WorkStatus,
    pub generated: usize,
    pub requested: u32,
    pub question_ids: Vec<String>,
}

impl From<GenerationJob> for JobDetail {
    fn from(job: GenerationJob) -> Self {
        let (generated, requested) = job.progress();
        Self {
            id: job.id,
            status: job.status,
            generated,
            requested,
            question_ids: job.result_question_ids,
        }
    }
}

impl CommandOutput for TrackerOutput<JobDetail> {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Generation for {}: {:?}", self.entity_id, self.phase)];
        if let Some(job_id) = &self.job_id {
            lines.push(format!("Job:       {job_id}"));
        }
        if let Some(job) = &self.data {
            lines.push(format!("Status:    {}", job.status));
            lines.push(format!("Questions: {}/{}", job.generated, job.requested));
            for id in &job.question_ids {
                lines.push(format!("  - {}", truncate(id, 36)));
            }
        }
        if let Some(error) = &self.error {
            lines.push(format!("{} {error}", console::style("Error:").red()));
        }
        lines.join("\n")
    }
}

fn describe(view: &TrackerView<GenerationJob>) -> String {
    match (&view.phase, &view.data) {
        (JobPhase::Triggered, _) => "Starting generation".to_string(),
        (_, Some(job)) => {
            let (generated, requested) = job.progress();
            format!("Generating questions: {generated}/{requested}")
        }
        _ => "Waiting for generation job".to_string(),
    }
}

pub async fn watch_job(args: WatchJobArgs, ctx: &CommandContext) -> Result<()> {
    let mut surface = ctx.surface()?;
    let spinner = ctx.spinner(format!("Following job {}", args.job_id));
    let view = surface.watch_generation_job(&args.job_id);
    let settled = follow(view, &spinner, describe).await?;
    surface.teardown();

    let result = TrackerOutput::from_view(&args.job_id, settled, JobDetail::from);
    let error = result.error.clone();
    report(&spinner, &result, result.succeeded(), error.as_deref(), ctx.json)
}

pub async fn generate(args: GenerateArgs, ctx: &CommandContext) -> Result<()> {
    let request = args.into_request()?;
    let material_id = request.material_id.clone();
    let mut surface = ctx.surface()?;
    let spinner = ctx.spinner(format!("Generating from {material_id}"));
    let view = surface.generate(request);
    let settled = follow(view, &spinner, describe).await?;
    surface.teardown();

    let result = TrackerOutput::from_view(&material_id, settled, JobDetail::from);
    let error = result.error.clone();
    report(&spinner, &result, result.succeeded(), error.as_deref(), ctx.json)
}
