//! File-layout consolidation: the external step that merges many small
//! per-episode data/video files into fewer larger files and renumbers
//! chunk/file indices.
//!
//! Consolidation is owned by the upstream dataset tooling; we only
//! parameterize and invoke it. A non-zero exit aborts the whole
//! conversion so a mismatched metadata/data pairing can never be
//! published as a valid dataset.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use crate::error::{ConvertError, Result};

/// Default consolidation threshold for data files, in megabytes.
///
/// Deliberately low: small recording sessions (tens of episodes at tens
/// of kilobytes each) must still consolidate into file-based storage.
pub const DEFAULT_DATA_FILE_SIZE_MB: u64 = 100;
pub const DEFAULT_VIDEO_FILE_SIZE_MB: u64 = 500;

#[derive(Debug, Clone)]
pub struct ConsolidateStep {
    /// Program and leading arguments of the external converter.
    pub program: Vec<String>,
    /// Threshold above which a data file is closed and a new one begun.
    pub data_file_size_mb: u64,
    /// Same, for video files; independently configurable.
    pub video_file_size_mb: u64,
}

impl Default for ConsolidateStep {
    fn default() -> Self {
        Self {
            program: vec![
                "python".to_string(),
                "-m".to_string(),
                "lerobot.datasets.v30.convert_dataset_v21_to_v30".to_string(),
            ],
            data_file_size_mb: DEFAULT_DATA_FILE_SIZE_MB,
            video_file_size_mb: DEFAULT_VIDEO_FILE_SIZE_MB,
        }
    }
}

impl ConsolidateStep {
    /// Run the consolidation step on a local dataset copy.
    ///
    /// `root` is the directory that contains the `repo_id`-named dataset
    /// folder; the external tool resolves the dataset as `root/repo_id`.
    pub async fn run(&self, repo_id: &str, root: &Path) -> Result<()> {
        let args = self.render_args(repo_id, root);
        info!(?args, "running layout consolidation");

        let (program, leading) = self
            .program
            .split_first()
            .ok_or_else(|| ConvertError::ToolMissing("consolidation program".to_string()))?;

        let result = Command::new(program)
            .args(leading)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await;
        let out = match result {
            Ok(out) => out,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConvertError::ToolMissing(program.clone()));
            }
            Err(err) => return Err(ConvertError::io(err, root)),
        };

        if !out.status.success() {
            return Err(ConvertError::ConsolidationFailed {
                status: out.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        info!("layout consolidation complete");
        Ok(())
    }

    fn render_args(&self, repo_id: &str, root: &Path) -> Vec<String> {
        vec![
            format!("--repo-id={repo_id}"),
            format!("--root={}", root.display()),
            format!("--data-file-size-in-mb={}", self.data_file_size_mb),
            format!("--video-file-size-in-mb={}", self.video_file_size_mb),
            // Publishing is the pipeline's last stage, never the tool's.
            "--push-to-hub=false".to_string(),
        ]
    }
}
