use crate::config::Config;
use crate::error::Result;
use crate::loader::{self, LoadReport};
use crate::runs::{RunRecorder, RunStatus};
use crate::store::Store;
use crate::summarizer::{self, SummaryReport};
use tracing::{error, info, warn};

pub const LOAD_JOB: &str = "load";
pub const SUMMARIZE_JOB: &str = "summarize";

/// Loads the configured data directory and records the run.
///
/// Per-file failures make the run `partial`; only an unreadable data
/// directory (or a store failure while recording) is returned as an error.
pub fn load_job<S: Store>(store: &mut S, config: &Config) -> Result<LoadReport> {
    let mut run = if config.record_runs {
        Some(RunRecorder::start(&*store, LOAD_JOB)?)
    } else {
        None
    };

    let result = loader::load_directory(store, &config.data_dir, &config.extensions);

    if let Some(run) = run.as_mut() {
        let (status, detail) = match &result {
            Ok(report) if report.failed() == 0 => (
                RunStatus::Succeeded,
                format!("{} files loaded", report.loaded()),
            ),
            Ok(report) => (
                RunStatus::Partial,
                format!(
                    "{} of {} files failed: {}",
                    report.failed(),
                    report.files.len(),
                    report.errors().join("; ")
                ),
            ),
            Err(e) => (RunStatus::Failed, e.to_string()),
        };
        RunRecorder::finish(&*store, run, status, Some(detail))?;
    }

    match &result {
        Ok(report) if report.failed() > 0 => {
            warn!("{} of {} files failed to load", report.failed(), report.files.len())
        }
        Ok(report) => info!("Loaded {} files", report.loaded()),
        Err(e) => error!("Load failed: {}", e),
    }
    result
}

/// Builds the summary table and records the run. Any failure fails the run.
pub fn summarize_job<S: Store>(store: &mut S, config: &Config) -> Result<SummaryReport> {
    let mut run = if config.record_runs {
        Some(RunRecorder::start(&*store, SUMMARIZE_JOB)?)
    } else {
        None
    };

    let result = summarizer::run_summary(store, &config.summary_table);

    if let Some(run) = run.as_mut() {
        let (status, detail) = match &result {
            Ok(report) => (
                RunStatus::Succeeded,
                format!("{} rows, sha256 {}", report.rows, report.fingerprint),
            ),
            Err(e) => (RunStatus::Failed, e.to_string()),
        };
        RunRecorder::finish(&*store, run, status, Some(detail))?;
    }

    if let Err(e) = &result {
        error!("Summary run failed: {}", e);
    }
    result
}
