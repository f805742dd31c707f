use std::path::PathBuf;

use thiserror::Error;

use dataset_schema::SchemaError;

pub type Result<T, E = ConvertError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("I/O error on {1}: {0}")]
    Io(std::io::Error, PathBuf),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("required tool not found: {0} (is it installed and on PATH?)")]
    ToolMissing(String),
    #[error("{tool} failed on {path}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        path: PathBuf,
        stderr: String,
    },
    #[error("could not parse {tool} output for {path}: {raw:?}")]
    ProbeParse {
        tool: &'static str,
        path: PathBuf,
        raw: String,
    },
    #[error("layout consolidation step failed (exit {status}): {stderr}")]
    ConsolidationFailed { status: i32, stderr: String },
    #[error(
        "dataset is already converted ({version}, {dim}-D); refusing to expand a second time"
    )]
    AlreadyConverted { version: String, dim: usize },
    #[error("vectors in {path} are {found}-D, expected {expected}-D; refusing to pad")]
    WrongSourceDim {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("column {column} in {path} has unsupported type {dtype}")]
    UnsupportedColumn {
        column: String,
        path: PathBuf,
        dtype: String,
    },
    #[error("sources disagree on schema: {0}")]
    MergeMismatch(String),
    #[error("hub request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("hub returned {status} for {url}: {body}")]
    HubStatus {
        status: u16,
        url: String,
        body: String,
    },
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ConvertError {
    pub(crate) fn io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io(err, path.into())
    }
}
