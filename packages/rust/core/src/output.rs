//! Report output: atomic writes, checksums and the per-run manifest.
//!
//! Every workflow writes its artifact through a [`RunRecorder`], which also
//! drops a `<artifact>.run.json` manifest next to it describing the run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use researchkit_shared::{ResearchError, Result, RunId};

use crate::pipeline::{StepFailure, StepLog, StepStage, WorkflowOutcome};

/// Metadata for a single written artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactMeta {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

impl ArtifactMeta {
    fn of(path: &Path, bytes: &[u8]) -> Self {
        Self {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            sha256: sha256_hex(bytes),
            size_bytes: bytes.len(),
        }
    }

    /// Checksum a file written by someone else (e.g. the spreadsheet host).
    /// `None` when it is not readable from here.
    pub fn from_file(path: &Path) -> Option<Self> {
        std::fs::read(path).ok().map(|bytes| Self::of(path, &bytes))
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write `content` to `path` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, content: &str) -> Result<ArtifactMeta> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = parent {
        std::fs::create_dir_all(dir).map_err(|e| ResearchError::io(dir, e))?;
    }

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ResearchError::validation(format!("not a file path: {}", path.display())))?;
    let temp = match parent {
        Some(dir) => dir.join(format!(".{filename}.tmp")),
        None => PathBuf::from(format!(".{filename}.tmp")),
    };

    std::fs::write(&temp, content).map_err(|e| ResearchError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| ResearchError::io(path, e))?;

    debug!(path = %path.display(), size = content.len(), "wrote artifact");
    Ok(ArtifactMeta::of(path, content.as_bytes()))
}

/// `<artifact>.run.json` next to the artifact.
pub fn manifest_path(artifact: &Path) -> PathBuf {
    let mut name = artifact
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".run.json");
    artifact.with_file_name(name)
}

/// Resolve a configured output file against the output directory.
/// Absolute paths are kept as-is.
pub fn resolve_output(dir: &Path, file: &str) -> PathBuf {
    let file = Path::new(file);
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        dir.join(file)
    }
}

// ---------------------------------------------------------------------------
// Run manifest
// ---------------------------------------------------------------------------

/// Written next to each artifact once the run completes.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub workflow: String,
    pub tool_version: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub ok: bool,
    pub message: String,
    pub counts: std::collections::BTreeMap<String, usize>,
    pub failures: Vec<StepFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactMeta>,
}

/// Tracks one workflow run from start to manifest.
#[derive(Debug, Clone)]
pub struct RunRecorder {
    run_id: RunId,
    workflow: String,
    started_at: DateTime<Utc>,
    artifact_path: PathBuf,
}

impl RunRecorder {
    pub fn start(workflow: &str, artifact_path: impl Into<PathBuf>) -> Self {
        let recorder = Self {
            run_id: RunId::new(),
            workflow: workflow.to_string(),
            started_at: Utc::now(),
            artifact_path: artifact_path.into(),
        };
        info!(run_id = %recorder.run_id, workflow, path = %recorder.artifact_path.display(), "run started");
        recorder
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Atomically write a text artifact to the run's path.
    pub fn write_text(&self, content: &str) -> Result<ArtifactMeta> {
        write_atomic(&self.artifact_path, content)
    }

    /// Write the run manifest and return the outcome pointing at the artifact.
    ///
    /// A manifest that cannot be written is recorded as a step failure; the
    /// outcome keeps its `ok` flag since the artifact itself exists.
    pub fn finish(&self, outcome: WorkflowOutcome, artifact: Option<ArtifactMeta>) -> WorkflowOutcome {
        let manifest = RunManifest {
            run_id: self.run_id.clone(),
            workflow: self.workflow.clone(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: self.started_at,
            completed_at: Utc::now(),
            ok: outcome.ok,
            message: outcome.message.clone(),
            counts: outcome.counts.clone(),
            failures: outcome.failures.clone(),
            artifact,
        };

        let mut outcome = if outcome.ok {
            outcome.with_output(&self.artifact_path)
        } else {
            outcome
        };

        let path = manifest_path(&self.artifact_path);
        if let Err(e) = write_manifest(&path, &manifest) {
            let mut log = StepLog::new();
            log.record(StepStage::Output, path.display().to_string(), &e);
            outcome = outcome.with_failures(log);
        }

        info!(
            run_id = %self.run_id,
            ok = outcome.ok,
            failures = outcome.failures.len(),
            manifest = %path.display(),
            "run finished"
        );
        outcome
    }
}

fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest)
        .map_err(|e| ResearchError::validation(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, &json).map(|_| ())
}
