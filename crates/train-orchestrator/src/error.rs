use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = OrchestratorError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("I/O error on {1}: {0}")]
    Io(std::io::Error, PathBuf),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown dataset group '{name}'; valid groups: {}", valid.join(", "))]
    UnknownGroup { name: String, valid: Vec<String> },
    #[error("unknown policy '{name}'; valid policies: {}", valid.join(", "))]
    UnknownPolicy { name: String, valid: Vec<String> },
    #[error("{0}")]
    ConflictingSelection(String),
    #[error("no datasets selected; pass a dataset group or an explicit dataset id")]
    NoDatasets,
    #[error("no policies selected")]
    NoPolicies,
    #[error("required tool not found: {0} (is it installed and on PATH?)")]
    ToolMissing(String),
    #[error("scheduler submission failed: {stderr}")]
    Scheduler { stderr: String },
    #[error("could not parse scheduler job id from {raw:?}")]
    SubmitParse { raw: String },
    #[error("{failed} of {total} sequenced jobs failed: {}", jobs.join(", "))]
    JobsFailed {
        failed: usize,
        total: usize,
        jobs: Vec<String>,
    },
    #[error("timestamp formatting failed: {0}")]
    TimeFormat(#[from] time::error::Format),
}

impl OrchestratorError {
    pub(crate) fn io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io(err, path.into())
    }
}
