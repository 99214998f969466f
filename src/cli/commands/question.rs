//! Question commands: reassessment, versioned edits and freshness.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use super::{follow, report, CommandContext, TrackerOutput};
use crate::cli::output::{output, truncate, CommandOutput, ProgressBarExt};
use crate::domain::models::{Assessment, Question, QuestionOption};
use crate::domain::ports::{AssessmentSource, RecordSource};
use crate::services::{Freshness, JobPhase, TrackerView};

#[derive(Args, Debug)]
pub struct ReassessArgs {
    /// Exam the question belongs to
    #[arg(long)]
    pub exam: String,

    /// Question to reassess
    #[arg(long)]
    pub question: String,
}

#[derive(Args, Debug)]
pub struct EditQuestionArgs {
    /// Question ID
    pub question_id: String,

    /// New question stem
    #[arg(long)]
    pub stem: String,

    /// Answer option, in order (repeat for each option)
    #[arg(long = "option", required = true)]
    pub options: Vec<String>,

    /// Zero-based index of the correct option
    #[arg(long)]
    pub correct: Option<usize>,
}

impl EditQuestionArgs {
    fn question_options(&self) -> Result<Vec<QuestionOption>> {
        if let Some(correct) = self.correct {
            if correct >= self.options.len() {
                bail!(
                    "Correct option {correct} is out of range for {} options",
                    self.options.len()
                );
            }
        }
        Ok(self
            .options
            .iter()
            .enumerate()
            .map(|(index, text)| QuestionOption {
                text: text.clone(),
                position: u32::try_from(index).unwrap_or(u32::MAX),
                is_correct: self.correct.map(|c| c == index),
            })
            .collect())
    }
}

#[derive(Args, Debug)]
pub struct FreshnessArgs {
    /// Question ID
    pub question_id: String,
}

/// Latest assessment of a question and how it relates to the question's version.
#[derive(Debug, Serialize)]
pub struct AssessmentDetail {
    pub id: String,
    pub question_version: u64,
    pub created_at: DateTime<Utc>,
    pub freshness: Freshness,
}

impl AssessmentDetail {
    fn new(question: &Question, assessment: Assessment) -> Self {
        Self {
            freshness: Freshness::of(question, Some(&assessment)),
            id: assessment.id,
            question_version: assessment.question_version,
            created_at: assessment.created_at,
        }
    }
}

fn freshness_line(freshness: Freshness) -> String {
    match freshness {
        Freshness::NoData => format!("{}", console::style("not assessed yet").dim()),
        Freshness::Current => format!("{}", console::style("current").green()),
        Freshness::Stale { behind } => format!(
            "{}",
            console::style(format!("outdated, {behind} edit(s) behind")).yellow()
        ),
    }
}

impl CommandOutput for TrackerOutput<AssessmentDetail> {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Reassessment of {}: {:?}", self.entity_id, self.phase)];
        if let Some(assessment) = &self.data {
            lines.push(format!(
                "Assessment {} (question version {}, {})",
                assessment.id,
                assessment.question_version,
                assessment.created_at.format("%Y-%m-%d %H:%M:%S")
            ));
            lines.push(format!("Freshness: {}", freshness_line(assessment.freshness)));
        }
        if let Some(error) = &self.error {
            lines.push(format!("{} {error}", console::style("Error:").red()));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct EditOutput {
    pub question_id: String,
    pub stem: String,
    pub version: u64,
    pub freshness: Freshness,
}

impl CommandOutput for EditOutput {
    fn to_human(&self) -> String {
        format!(
            "Saved question {} as version {}\nStem: {}\nAssessment: {}",
            self.question_id,
            self.version,
            truncate(&self.stem, 70),
            freshness_line(self.freshness)
        )
    }
}

#[derive(Debug, Serialize)]
pub struct FreshnessOutput {
    pub question_id: String,
    pub question_version: u64,
    pub assessment_version: Option<u64>,
    pub freshness: Freshness,
}

impl CommandOutput for FreshnessOutput {
    fn to_human(&self) -> String {
        let assessed = self
            .assessment_version
            .map_or_else(|| "none".to_string(), |v| format!("version {v}"));
        format!(
            "Question {} is at version {}, latest assessment: {}\nFreshness: {}",
            self.question_id,
            self.question_version,
            assessed,
            freshness_line(self.freshness)
        )
    }
}

fn describe(view: &TrackerView<Assessment>) -> String {
    match view.phase {
        JobPhase::Triggered => "Requesting reassessment".to_string(),
        _ => "Waiting for the new assessment".to_string(),
    }
}

pub async fn reassess(args: ReassessArgs, ctx: &CommandContext) -> Result<()> {
    let backend = ctx.backend()?;
    let question = backend.fetch_question(&args.question).await?;
    let current = backend.latest_assessment(&question.id, None).await?;

    let mut surface = ctx.surface()?;
    let spinner = ctx.spinner(format!("Reassessing {}", truncate(&question.stem, 40)));
    let view = surface.reassess(&args.exam, &question, current);
    let settled = follow(view, &spinner, describe).await?;
    surface.teardown();

    let result = TrackerOutput::from_view(&question.id, settled, |assessment| {
        AssessmentDetail::new(&question, assessment)
    });
    let error = result.error.clone();
    report(&spinner, &result, result.succeeded(), error.as_deref(), ctx.json)
}

pub async fn edit_question(args: EditQuestionArgs, ctx: &CommandContext) -> Result<()> {
    let options = args.question_options()?;
    let backend = ctx.backend()?;
    let mut question = backend.fetch_question(&args.question_id).await?;
    let surface = ctx.surface()?;

    let spinner = ctx.spinner(format!("Saving question {}", question.id));
    let edit = match surface.save_question_edit(&mut question, args.stem, options).await {
        Ok(edit) => edit,
        Err(e) => {
            spinner.finish_error("Could not save question");
            return Err(e.into());
        }
    };
    let latest = backend.latest_assessment(&question.id, None).await?;
    spinner.finish_success("Saved");

    let result = EditOutput {
        question_id: question.id.clone(),
        stem: edit.stem,
        version: edit.version,
        freshness: Freshness::of(&question, latest.as_ref()),
    };
    output(&result, ctx.json);
    Ok(())
}

pub async fn freshness(args: FreshnessArgs, ctx: &CommandContext) -> Result<()> {
    let backend = ctx.backend()?;
    let question = backend.fetch_question(&args.question_id).await?;
    let latest = backend.latest_assessment(&question.id, None).await?;

    let result = FreshnessOutput {
        question_id: question.id.clone(),
        question_version: question.version,
        assessment_version: latest.as_ref().map(|a| a.question_version),
        freshness: Freshness::of(&question, latest.as_ref()),
    };
    output(&result, ctx.json);
    Ok(())
}
