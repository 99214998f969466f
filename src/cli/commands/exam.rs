//! Exam commands: follow analysis progress through the exam's live record.

use anyhow::{bail, Result};
use clap::Args;
use indicatif::ProgressBar;
use serde::Serialize;
use tokio::sync::watch;

use super::CommandContext;
use crate::cli::output::{output, truncate, CommandOutput, ProgressBarExt};
use crate::domain::models::{Exam, WorkStatus};
use crate::services::{DeliveryMode, RecordView};

const ANALYSIS_FAILED: &str = "Analysis failed. Please try again.";

#[derive(Args, Debug)]
pub struct WatchExamArgs {
    /// Exam ID
    pub exam_id: String,

    /// Print the exam once loaded instead of waiting for analysis to finish
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Exam ID
    pub exam_id: String,
}

#[derive(Debug, Serialize)]
pub struct ExamOutput {
    pub id: String,
    pub title: String,
    pub analysis_status: WorkStatus,
    pub questions_analyzed: u32,
    pub question_count: u32,
    pub progress_percent: u32,
    pub delivery: DeliveryMode,
}

impl ExamOutput {
    fn new(exam: &Exam, delivery: DeliveryMode) -> Self {
        Self {
            id: exam.id.clone(),
            title: exam.title.clone(),
            analysis_status: exam.analysis_status,
            questions_analyzed: exam.questions_analyzed,
            question_count: exam.question_count,
            progress_percent: percent(exam.analysis_progress()),
            delivery,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(fraction: f64) -> u32 {
    (fraction * 100.0).round() as u32
}

impl CommandOutput for ExamOutput {
    fn to_human(&self) -> String {
        let status = match self.analysis_status {
            WorkStatus::Completed => console::style(self.analysis_status.as_str()).green(),
            WorkStatus::Failed => console::style(self.analysis_status.as_str()).red(),
            _ => console::style(self.analysis_status.as_str()).yellow(),
        };
        let mut lines = vec![
            format!("Exam:     {} ({})", truncate(&self.title, 60), self.id),
            format!("Analysis: {status}"),
            format!(
                "Progress: {}/{} questions ({}%)",
                self.questions_analyzed, self.question_count, self.progress_percent
            ),
        ];
        if self.delivery != DeliveryMode::Live {
            lines.push(format!(
                "{}",
                console::style("Live updates unavailable, refreshed by polling").dim()
            ));
        }
        lines.join("\n")
    }
}

fn describe(exam: &Exam) -> String {
    format!(
        "Analyzing {}: {}/{} questions",
        truncate(&exam.title, 40),
        exam.questions_analyzed,
        exam.question_count
    )
}

/// Follow the record until its initial read finished and, unless `once`,
/// until analysis reached a terminal status.
async fn follow_exam(
    mut view: watch::Receiver<RecordView<Exam>>,
    spinner: &ProgressBar,
    once: bool,
) -> Result<(Exam, DeliveryMode)> {
    loop {
        let current = view.borrow_and_update().clone();
        if let Some(error) = current.error {
            spinner.finish_error("Could not load exam");
            bail!(error);
        }
        if let Some(exam) = current.data {
            spinner.set_message(describe(&exam));
            if once || exam.analysis_status.is_terminal() {
                return Ok((exam, current.mode));
            }
        }
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    bail!("Exam record was unmounted");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                spinner.finish_warning("Interrupted");
                bail!("Interrupted");
            }
        }
    }
}

fn finish(spinner: &ProgressBar, exam: &Exam, mode: DeliveryMode, json_mode: bool) -> Result<()> {
    let result = ExamOutput::new(exam, mode);
    if exam.analysis_status == WorkStatus::Failed {
        spinner.finish_error(ANALYSIS_FAILED);
        output(&result, json_mode);
        bail!(ANALYSIS_FAILED);
    }
    spinner.finish_success("Exam loaded");
    output(&result, json_mode);
    Ok(())
}

pub async fn watch_exam(args: WatchExamArgs, ctx: &CommandContext) -> Result<()> {
    let mut surface = ctx.surface()?;
    let spinner = ctx.spinner(format!("Loading exam {}", args.exam_id));
    let view = surface.watch_exam(&args.exam_id);
    let (exam, mode) = follow_exam(view, &spinner, args.once).await?;
    surface.teardown();
    finish(&spinner, &exam, mode, ctx.json)
}

pub async fn analyze(args: AnalyzeArgs, ctx: &CommandContext) -> Result<()> {
    let mut surface = ctx.surface()?;
    let spinner = ctx.spinner(format!("Starting analysis of {}", args.exam_id));
    let view = match surface.analyze_exam(&args.exam_id).await {
        Ok(view) => view,
        Err(e) => {
            let message = e.user_message(ANALYSIS_FAILED);
            spinner.finish_error(message.as_str());
            bail!(message);
        }
    };
    let (exam, mode) = follow_exam(view, &spinner, false).await?;
    surface.teardown();
    finish(&spinner, &exam, mode, ctx.json)
}
