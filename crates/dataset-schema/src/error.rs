use std::path::PathBuf;

use thiserror::Error;

use crate::types::SchemaVersion;

pub type Result<T, E = SchemaError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("I/O error on {1}: {0}")]
    Io(std::io::Error, PathBuf),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown schema version tag: {0}")]
    UnknownVersion(String),
    #[error("unexpected schema version: expected {expected}, found {found}")]
    VersionMismatch {
        expected: SchemaVersion,
        found: SchemaVersion,
    },
    #[error("feature not declared: {0}")]
    MissingFeature(String),
    #[error("feature {key} has dtype {actual:?}, expected {expected:?}")]
    FeatureDtype {
        key: String,
        expected: crate::types::DType,
        actual: crate::types::DType,
    },
    #[error(
        "dimensionality mismatch: action is {action}-D but observation.state is {state}-D"
    )]
    DimMismatch { action: usize, state: usize },
    #[error("feature {key} is {found}-D but {version} requires {expected}-D")]
    WrongDim {
        key: String,
        version: SchemaVersion,
        expected: usize,
        found: usize,
    },
    #[error("feature {key} declares {shape}-D shape but lists {names} names")]
    NameCountMismatch {
        key: String,
        shape: usize,
        names: usize,
    },
    #[error("episode count mismatch: info.json declares {declared}, found {found}")]
    EpisodeCount { declared: usize, found: usize },
    #[error("frame count mismatch: info.json declares {declared}, episodes sum to {found}")]
    FrameCount { declared: usize, found: usize },
    #[error("missing video file for camera {camera}: {path}")]
    MissingVideo { camera: String, path: PathBuf },
    #[error(
        "video file count differs between cameras: {camera_a} has {count_a}, {camera_b} has {count_b}"
    )]
    VideoCountMismatch {
        camera_a: String,
        count_a: usize,
        camera_b: String,
        count_b: usize,
    },
    #[error("dataset has no {0} path template in info.json")]
    MissingPathTemplate(&'static str),
}
