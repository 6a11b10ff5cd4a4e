//! Shared workflow plumbing: progress reporting, non-fatal step failures
//! and the outcome every workflow returns.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use researchkit_shared::{ResearchError, Result};

/// Progress callback for reporting workflow status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called for each item processed within a phase.
    fn step(&self, current: usize, total: usize, detail: &str);
    /// Called once with the final outcome.
    fn done(&self, outcome: &WorkflowOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn step(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _outcome: &WorkflowOutcome) {}
}

// ---------------------------------------------------------------------------
// Step failures
// ---------------------------------------------------------------------------

/// Where a non-fatal failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStage {
    /// Reading a page: missing selector, timeout, page not loaded.
    Extraction,
    /// A chat completion failed or returned unusable output.
    Llm,
    /// A host side effect (git, spreadsheet, form) failed.
    Host,
    /// A local file such as the run manifest could not be written.
    Output,
}

/// A recorded, non-fatal failure. The run continued with a default value.
#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub stage: StepStage,
    /// What was being processed, e.g. a source id or URL.
    pub subject: String,
    pub message: String,
}

/// Collects step failures so the run can degrade instead of aborting.
#[derive(Debug, Default)]
pub struct StepLog {
    failures: Vec<StepFailure>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and log it.
    pub fn record(&mut self, stage: StepStage, subject: impl Into<String>, error: &ResearchError) {
        let subject = subject.into();
        warn!(stage = ?stage, subject = %subject, error = %error, "step failed, continuing");
        self.failures.push(StepFailure {
            stage,
            subject,
            message: error.to_string(),
        });
    }

    /// `Some(value)` on success; records the error and returns `None` otherwise.
    pub fn recover<T>(
        &mut self,
        stage: StepStage,
        subject: impl Into<String>,
        result: Result<T>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.record(stage, subject, &e);
                None
            }
        }
    }

    /// The value on success, `fallback` (with the error recorded) otherwise.
    pub fn or<T>(
        &mut self,
        stage: StepStage,
        subject: impl Into<String>,
        result: Result<T>,
        fallback: T,
    ) -> T {
        self.recover(stage, subject, result).unwrap_or(fallback)
    }

    pub fn failures(&self) -> &[StepFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_failures(self) -> Vec<StepFailure> {
        self.failures
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What a workflow run produced.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub workflow: String,
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Named result counts, e.g. `subscriptions: 4`.
    pub counts: BTreeMap<String, usize>,
    pub failures: Vec<StepFailure>,
}

impl WorkflowOutcome {
    pub fn success(workflow: &str, message: impl Into<String>) -> Self {
        Self {
            workflow: workflow.to_string(),
            ok: true,
            message: message.into(),
            output_path: None,
            counts: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn failure(workflow: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            ..Self::success(workflow, message)
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_count(mut self, name: &str, count: usize) -> Self {
        self.counts.insert(name.to_string(), count);
        self
    }

    pub fn with_failures(mut self, log: StepLog) -> Self {
        self.failures.extend(log.into_failures());
        self
    }

    /// Fold a fatal setup error into a failed outcome.
    pub fn from_result(workflow: &str, result: Result<WorkflowOutcome>) -> Self {
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(workflow, error = %e, "workflow aborted");
                Self::failure(workflow, e.to_string())
            }
        }
    }
}

/// Fixed settle delay; zero skips the sleep entirely.
pub async fn pause(ms: u64) {
    if ms == 0 {
        return;
    }
    debug!(ms, "settling");
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_log_records_and_recovers() {
        let mut log = StepLog::new();
        let ok: Result<u32> = Ok(3);
        let bad: Result<u32> = Err(ResearchError::parse("bad json"));

        assert_eq!(log.recover(StepStage::Llm, "a", ok), Some(3));
        assert_eq!(log.or(StepStage::Extraction, "b", bad, 0), 0);
        assert_eq!(log.len(), 1);
        assert_eq!(log.failures()[0].subject, "b");
        assert_eq!(log.failures()[0].stage, StepStage::Extraction);
        assert!(log.failures()[0].message.contains("bad json"));
    }

    #[test]
    fn outcome_from_error_is_not_ok() {
        let outcome = WorkflowOutcome::from_result(
            "papers",
            Err(ResearchError::config("LLM API key not found")),
        );
        assert!(!outcome.ok);
        assert_eq!(outcome.workflow, "papers");
        assert!(outcome.message.contains("API key"));
    }

    #[test]
    fn outcome_builder_collects_counts_and_failures() {
        let mut log = StepLog::new();
        log.record(StepStage::Host, "git push", &ResearchError::host("git.push", "rejected"));

        let outcome = WorkflowOutcome::success("commit_pr", "done")
            .with_output("reports/x.md")
            .with_count("files", 2)
            .with_failures(log);

        assert!(outcome.ok);
        assert_eq!(outcome.counts["files"], 2);
        assert_eq!(outcome.failures.len(), 1);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["failures"][0]["stage"], "host");
    }

    #[tokio::test]
    async fn zero_pause_returns_immediately() {
        let start = std::time::Instant::now();
        pause(0).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
