use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::types::{DType, Feature, SchemaVersion};

/// Dataset metadata, loaded from and saved to `meta/info.json`.
///
/// Features are kept in a sorted map so a rewritten file diffs cleanly
/// against the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub codebase_version: SchemaVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_type: Option<String>,
    pub total_episodes: usize,
    pub total_frames: usize,
    #[serde(default)]
    pub total_tasks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_videos: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    pub chunks_size: usize,
    /// Consolidation threshold for data files, v3.0 only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_files_size_in_mb: Option<u64>,
    /// Consolidation threshold for video files, v3.0 only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_files_size_in_mb: Option<u64>,
    pub fps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splits: Option<BTreeMap<String, String>>,
    pub data_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    pub features: BTreeMap<String, Feature>,
}

impl DatasetInfo {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| SchemaError::Io(err, path.to_owned()))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|err| SchemaError::Io(err, path.to_owned()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn version(&self) -> SchemaVersion {
        self.codebase_version
    }

    /// Feature declaration by key, or a typed error naming the key.
    pub fn feature(&self, key: &str) -> Result<&Feature> {
        self.features
            .get(key)
            .ok_or_else(|| SchemaError::MissingFeature(key.to_string()))
    }

    /// Keys of all declared camera stream features, sorted.
    pub fn camera_keys(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter(|(_, feature)| feature.dtype == DType::Video)
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Action dimensionality, if the action feature is declared.
    pub fn action_dim(&self) -> Result<usize> {
        Ok(self.feature("action")?.dim())
    }

    /// Observation-state dimensionality, if the feature is declared.
    pub fn state_dim(&self) -> Result<usize> {
        Ok(self.feature("observation.state")?.dim())
    }

    /// Storage chunk index for an episode under the v2.1 layout.
    pub fn chunk_index(&self, episode_index: usize) -> usize {
        episode_index / self.chunks_size
    }

    /// Path of an episode's parquet data file (v2.1 layout).
    pub fn episode_data_path(&self, episode_index: usize) -> PathBuf {
        expand_episode_template(&self.data_path, self.chunk_index(episode_index), episode_index)
            .into()
    }

    /// Path of an episode's video file for one camera (v2.1 layout).
    pub fn episode_video_path(&self, video_key: &str, episode_index: usize) -> Result<PathBuf> {
        let feature = self.feature(video_key)?;
        if feature.dtype != DType::Video {
            return Err(SchemaError::FeatureDtype {
                key: video_key.to_string(),
                expected: DType::Video,
                actual: feature.dtype,
            });
        }
        let template = self
            .video_path
            .as_deref()
            .ok_or(SchemaError::MissingPathTemplate("video"))?;
        Ok(
            expand_episode_template(template, self.chunk_index(episode_index), episode_index)
                .replace("{video_key}", video_key)
                .into(),
        )
    }

    /// Path of a consolidated data file (v3.0 layout).
    pub fn file_data_path(&self, chunk_index: usize, file_index: usize) -> PathBuf {
        expand_file_template(&self.data_path, chunk_index, file_index).into()
    }

    /// Path of a consolidated video file for one camera (v3.0 layout).
    pub fn file_video_path(
        &self,
        video_key: &str,
        chunk_index: usize,
        file_index: usize,
    ) -> Result<PathBuf> {
        let template = self
            .video_path
            .as_deref()
            .ok_or(SchemaError::MissingPathTemplate("video"))?;
        Ok(expand_file_template(template, chunk_index, file_index)
            .replace("{video_key}", video_key)
            .into())
    }
}

fn expand_episode_template(template: &str, chunk: usize, episode: usize) -> String {
    template
        .replace("{episode_chunk:03d}", &format!("{chunk:03}"))
        .replace("{episode_index:06d}", &format!("{episode:06}"))
}

fn expand_file_template(template: &str, chunk: usize, file: usize) -> String {
    template
        .replace("{chunk_index:03d}", &format!("{chunk:03}"))
        .replace("{file_index:03d}", &format!("{file:03}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Feature;

    fn v21_info() -> DatasetInfo {
        let mut features = BTreeMap::new();
        features.insert(
            "action".to_string(),
            Feature::vector(crate::names::ARM_JOINT_NAMES.map(String::from).to_vec()),
        );
        features.insert(
            "observation.images.wrist_right".to_string(),
            Feature::camera(640, 480, 30, "av1"),
        );
        DatasetInfo {
            codebase_version: SchemaVersion::V21,
            robot_type: Some("bimanual_follower".to_string()),
            total_episodes: 25,
            total_frames: 7421,
            total_tasks: 1,
            total_videos: Some(75),
            total_chunks: Some(1),
            chunks_size: 1000,
            data_files_size_in_mb: None,
            video_files_size_in_mb: None,
            fps: 30,
            splits: None,
            data_path: "data/chunk-{episode_chunk:03d}/episode_{episode_index:06d}.parquet"
                .to_string(),
            video_path: Some(
                "videos/chunk-{episode_chunk:03d}/{video_key}/episode_{episode_index:06d}.mp4"
                    .to_string(),
            ),
            image_path: None,
            features,
        }
    }

    #[test]
    fn episode_paths_expand_templates() {
        let info = v21_info();
        assert_eq!(
            info.episode_data_path(7),
            PathBuf::from("data/chunk-000/episode_000007.parquet")
        );
        let video = info
            .episode_video_path("observation.images.wrist_right", 7)
            .unwrap();
        assert_eq!(
            video,
            PathBuf::from(
                "videos/chunk-000/observation.images.wrist_right/episode_000007.mp4"
            )
        );
    }

    #[test]
    fn chunk_index_follows_chunks_size() {
        let mut info = v21_info();
        info.chunks_size = 10;
        assert_eq!(info.chunk_index(9), 0);
        assert_eq!(info.chunk_index(10), 1);
    }

    #[test]
    fn video_path_rejects_non_video_feature() {
        let info = v21_info();
        assert!(info.episode_video_path("action", 0).is_err());
    }

    #[test]
    fn file_paths_expand_v30_templates() {
        let mut info = v21_info();
        info.data_path = "data/chunk-{chunk_index:03d}/file-{file_index:03d}.parquet".to_string();
        assert_eq!(
            info.file_data_path(0, 2),
            PathBuf::from("data/chunk-000/file-002.parquet")
        );
    }

    #[test]
    fn info_round_trips_through_json() {
        let info = v21_info();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info.json");
        info.save(&path).unwrap();
        let loaded = DatasetInfo::load(&path).unwrap();
        assert_eq!(loaded.codebase_version, SchemaVersion::V21);
        assert_eq!(loaded.total_episodes, 25);
        assert_eq!(loaded.camera_keys(), vec!["observation.images.wrist_right"]);
        assert_eq!(loaded.action_dim().unwrap(), 12);
    }
}
