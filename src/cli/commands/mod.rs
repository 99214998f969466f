//! CLI command implementations.

pub mod exam;
pub mod job;
pub mod material;
pub mod question;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use indicatif::ProgressBar;
use serde::Serialize;
use tokio::sync::watch;

use crate::cli::output::{create_spinner, output, CommandOutput, ProgressBarExt};
use crate::domain::models::Config;
use crate::domain::ports::{Backend, PushTransport};
use crate::infrastructure::backend::RestBackend;
use crate::infrastructure::push::OfflineTransport;
use crate::services::{JobPhase, SyncSurface, TrackerView};

/// What every command needs: the loaded configuration and the output mode.
pub struct CommandContext {
    pub config: Config,
    pub json: bool,
}

impl CommandContext {
    pub const fn new(config: Config, json: bool) -> Self {
        Self { config, json }
    }

    pub fn backend(&self) -> Result<Arc<RestBackend>> {
        Ok(Arc::new(RestBackend::new(&self.config.backend)?))
    }

    /// A surface over the REST backend.
    pub fn surface(&self) -> Result<SyncSurface> {
        let backend: Arc<dyn Backend> = self.backend()?;
        Ok(SyncSurface::new(backend, self.push(), self.config.sync.clone()))
    }

    /// The CLI has no realtime socket, so live records poll from the start.
    /// Simulated push loss puts them on a channel that never connects and
    /// lets them degrade after the configured failure threshold.
    fn push(&self) -> Option<Arc<dyn PushTransport>> {
        self.config.realtime.simulate_push_loss.then(|| {
            Arc::new(OfflineTransport::new(Duration::from_millis(
                self.config.realtime.offline_retry_ms,
            ))) as Arc<dyn PushTransport>
        })
    }

    pub fn spinner(&self, message: impl Into<String>) -> ProgressBar {
        create_spinner(message, self.json)
    }
}

/// Wait for a tracker to settle, keeping the spinner message current.
///
/// Ctrl-C abandons the wait with an error.
pub async fn follow<T, F>(
    mut view: watch::Receiver<TrackerView<T>>,
    spinner: &ProgressBar,
    describe: F,
) -> Result<TrackerView<T>>
where
    T: Clone,
    F: Fn(&TrackerView<T>) -> String,
{
    loop {
        let current = view.borrow_and_update().clone();
        spinner.set_message(describe(&current));
        if current.phase.is_settled() {
            return Ok(current);
        }
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    bail!("Tracker stopped before the job settled");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                spinner.finish_warning("Interrupted");
                bail!("Interrupted");
            }
        }
    }
}

/// Final state of a tracked run as printed by the CLI.
#[derive(Debug, Serialize)]
pub struct TrackerOutput<D: Serialize> {
    pub entity_id: String,
    pub phase: JobPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<D>,
}

impl<D: Serialize> TrackerOutput<D> {
    pub fn from_view<T>(entity_id: &str, view: TrackerView<T>, detail: impl FnOnce(T) -> D) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            phase: view.phase,
            job_id: view.job_id,
            error: view.error,
            data: view.data.map(detail),
        }
    }

    pub const fn succeeded(&self) -> bool {
        matches!(self.phase, JobPhase::Succeeded)
    }
}

/// Stop the spinner, print the result and fail the command unless the run
/// succeeded.
pub fn report<O: CommandOutput>(
    spinner: &ProgressBar,
    result: &O,
    succeeded: bool,
    error: Option<&str>,
    json_mode: bool,
) -> Result<()> {
    if succeeded {
        spinner.finish_success("Done");
        output(result, json_mode);
        return Ok(());
    }
    let message = error.unwrap_or("Job did not complete");
    spinner.finish_error(message);
    output(result, json_mode);
    bail!("{message}")
}
