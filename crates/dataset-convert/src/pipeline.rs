//! The conversion pipeline: a fixed stage sequence from fetch to publish.
//!
//! fetch -> validate source -> merge/stage -> expand dims -> remap
//! cameras -> consolidate layout -> rewrite metadata -> validate target
//! -> publish.
//!
//! Publish is the final stage and runs only after the target validation
//! passed, so a dataset that fails anywhere leaves nothing on the hub.
//! Only fetch and publish retry (inside the hub client); every local
//! stage failure is deterministic and aborts.

use std::path::{Path, PathBuf};

use tracing::info;

use dataset_schema::{
    load_stats, names, save_stats, validate_dataset, DatasetInfo, Feature, SchemaVersion,
};

use crate::cameras::{remap_cameras, remap_feature_keys};
use crate::consolidate::{ConsolidateStep, DEFAULT_DATA_FILE_SIZE_MB, DEFAULT_VIDEO_FILE_SIZE_MB};
use crate::error::{ConvertError, Result};
use crate::expand::{expand_data_dir, VECTOR_COLUMNS};
use crate::hub::HubClient;
use crate::merge::merge_sources;
use crate::video::VideoTool;

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Source dataset repo ids, merged in order when more than one.
    pub sources: Vec<String>,
    /// Repo id the converted dataset is published under.
    pub dest_repo: String,
    /// Upload to the hub after target validation.
    pub push: bool,
    /// Keep the working directory after a successful push.
    pub keep_work_dir: bool,
    pub data_file_size_mb: u64,
    pub video_file_size_mb: u64,
    pub work_dir: PathBuf,
    /// Concurrent ffmpeg processes during the camera remap.
    pub parallelism: usize,
}

impl ConvertOptions {
    pub fn new(sources: Vec<String>, dest_repo: String) -> Self {
        Self {
            sources,
            dest_repo,
            push: true,
            keep_work_dir: false,
            data_file_size_mb: DEFAULT_DATA_FILE_SIZE_MB,
            video_file_size_mb: DEFAULT_VIDEO_FILE_SIZE_MB,
            work_dir: std::env::temp_dir().join("mimic-convert"),
            parallelism: 4,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Converter {
    pub hub: HubClient,
    pub video: VideoTool,
    pub consolidate: ConsolidateStep,
}

impl Converter {
    pub fn new(hub: HubClient) -> Self {
        Self {
            hub,
            ..Self::default()
        }
    }

    /// Run the full conversion. Returns the local path of the converted
    /// dataset, which survives when `push` is off or `keep_work_dir` is
    /// on.
    pub async fn run(&self, options: &ConvertOptions) -> Result<PathBuf> {
        let work = &options.work_dir;
        let sources_dir = work.join("sources");
        let dataset_root = work.join(&options.dest_repo);
        reset_dir(&sources_dir)?;
        reset_dir(&dataset_root)?;

        info!(sources = ?options.sources, dest = %options.dest_repo, "starting conversion");

        let mut fetched = Vec::with_capacity(options.sources.len());
        for (position, source) in options.sources.iter().enumerate() {
            let dir = sources_dir.join(position.to_string());
            self.hub.snapshot_download(source, &dir).await?;
            fetched.push(dir);
        }

        for dir in &fetched {
            ensure_unconverted(&DatasetInfo::load(dir.join("meta/info.json"))?)?;
            validate_dataset(dir, Some(SchemaVersion::V21))?;
        }
        info!("source validation passed");

        if let [only] = fetched.as_slice() {
            stage_single_source(only, &dataset_root)?;
        } else {
            merge_sources(&fetched, &dataset_root)?;
        }

        expand_data_dir(
            &dataset_root.join("data"),
            names::BASE_DIMS,
            SchemaVersion::V21.expected_dim(),
        )?;
        expand_stats(&dataset_root)?;

        remap_cameras(&dataset_root, &self.video, options.parallelism).await?;
        let info_path = dataset_root.join("meta/info.json");
        let mut info = DatasetInfo::load(&info_path)?;
        remap_feature_keys(&mut info);
        info.save(&info_path)?;

        let consolidate = ConsolidateStep {
            program: self.consolidate.program.clone(),
            data_file_size_mb: options.data_file_size_mb,
            video_file_size_mb: options.video_file_size_mb,
        };
        consolidate.run(&options.dest_repo, work).await?;

        rewrite_metadata(&dataset_root, options)?;

        validate_dataset(&dataset_root, Some(SchemaVersion::V30))?;
        info!("target validation passed");

        if options.push {
            self.hub.create_repo(&options.dest_repo).await?;
            let message = format!(
                "Convert to v3.0 schema from {} source(s)",
                options.sources.len()
            );
            self.hub
                .upload_folder(&options.dest_repo, &dataset_root, &message)
                .await?;
        }

        remove_dir(&sources_dir)?;
        if options.push && !options.keep_work_dir {
            remove_dir(&dataset_root)?;
        } else {
            info!(path = %dataset_root.display(), "converted dataset kept locally");
        }
        Ok(dataset_root)
    }
}

/// Refuse to run the upgrade twice over the same dataset.
///
/// A v3.0 source, or one whose vectors already carry the base
/// dimensions, would get padded to 18-D and published with metadata that
/// no trainer accepts.
fn ensure_unconverted(info: &DatasetInfo) -> Result<()> {
    let dim = info.action_dim().unwrap_or(0);
    if info.version() == SchemaVersion::V30 || dim == SchemaVersion::V30.expected_dim() {
        return Err(ConvertError::AlreadyConverted {
            version: info.version().to_string(),
            dim,
        });
    }
    Ok(())
}

fn stage_single_source(source: &Path, dataset_root: &Path) -> Result<()> {
    if let Some(parent) = dataset_root.parent() {
        std::fs::create_dir_all(parent).map_err(|err| ConvertError::io(err, parent))?;
    }
    std::fs::rename(source, dataset_root).map_err(|err| ConvertError::io(err, source))
}

/// Append zero statistics for the new base dimensions.
fn expand_stats(root: &Path) -> Result<()> {
    let path = root.join("meta/stats.json");
    if !path.is_file() {
        return Ok(());
    }
    let mut stats = load_stats(&path)?;
    for key in VECTOR_COLUMNS {
        if let Some(feature) = stats.get_mut(key) {
            if feature.dim() == SchemaVersion::V21.expected_dim() {
                feature.extend_zeros(names::BASE_DIMS);
            }
        }
    }
    save_stats(&path, &stats)?;
    Ok(())
}

/// Bring `meta/info.json` in line with the transformed data: version
/// tag, robot type, 15-D vector declarations with base names, and the
/// consolidation thresholds the layout was produced with. Camera
/// declarations were already rewritten during the remap stage.
fn rewrite_metadata(root: &Path, options: &ConvertOptions) -> Result<()> {
    let path = root.join("meta/info.json");
    let mut info = DatasetInfo::load(&path)?;
    info.codebase_version = SchemaVersion::V30;
    info.robot_type = Some(names::TARGET_ROBOT_TYPE.to_string());
    info.data_files_size_in_mb = Some(options.data_file_size_mb);
    info.video_files_size_in_mb = Some(options.video_file_size_mb);
    info.features.insert(
        "action".to_string(),
        Feature::vector(names::v30_action_names()),
    );
    info.features.insert(
        "observation.state".to_string(),
        Feature::vector(names::v30_state_names()),
    );
    info.save(&path)?;
    Ok(())
}

fn reset_dir(path: &Path) -> Result<()> {
    remove_dir(path)?;
    std::fs::create_dir_all(path).map_err(|err| ConvertError::io(err, path))
}

fn remove_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path).map_err(|err| ConvertError::io(err, path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset_schema::FeatureStats;
    use std::collections::BTreeMap;

    fn v21_info(dim: usize) -> DatasetInfo {
        let names: Vec<String> = (0..dim).map(|index| format!("joint_{index}.pos")).collect();
        let mut features = BTreeMap::new();
        features.insert("action".to_string(), Feature::vector(names.clone()));
        features.insert("observation.state".to_string(), Feature::vector(names));
        DatasetInfo {
            codebase_version: SchemaVersion::V21,
            robot_type: Some("bimanual_follower".to_string()),
            total_episodes: 5,
            total_frames: 500,
            total_tasks: 1,
            total_videos: None,
            total_chunks: Some(1),
            chunks_size: 1000,
            data_files_size_in_mb: None,
            video_files_size_in_mb: None,
            fps: 30,
            splits: None,
            data_path: "data/chunk-{episode_chunk:03d}/episode_{episode_index:06d}.parquet"
                .to_string(),
            video_path: None,
            image_path: None,
            features,
        }
    }

    #[test]
    fn twelve_dim_v21_source_is_accepted() {
        assert!(ensure_unconverted(&v21_info(12)).is_ok());
    }

    #[test]
    fn v30_source_is_rejected() {
        let mut info = v21_info(12);
        info.codebase_version = SchemaVersion::V30;
        let err = ensure_unconverted(&info).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::AlreadyConverted { dim: 12, .. }
        ));
    }

    #[test]
    fn fifteen_dim_source_is_rejected_even_when_tagged_v21() {
        let err = ensure_unconverted(&v21_info(15)).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::AlreadyConverted { dim: 15, .. }
        ));
    }

    #[test]
    fn metadata_rewrite_sets_version_robot_and_vector_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("meta")).unwrap();
        v21_info(12).save(dir.path().join("meta/info.json")).unwrap();

        let options = ConvertOptions::new(vec!["org/src".to_string()], "org/dst".to_string());
        rewrite_metadata(dir.path(), &options).unwrap();

        let info = DatasetInfo::load(dir.path().join("meta/info.json")).unwrap();
        assert_eq!(info.version(), SchemaVersion::V30);
        assert_eq!(info.robot_type.as_deref(), Some("mimic_follower"));
        assert_eq!(info.action_dim().unwrap(), 15);
        assert_eq!(info.state_dim().unwrap(), 15);
        assert_eq!(info.data_files_size_in_mb, Some(100));
        let action = info.feature("action").unwrap();
        let names = action.names.as_ref().unwrap().as_flat();
        assert_eq!(&names[12..], &["base_vx", "base_vy", "base_omega"]);
    }

    #[test]
    fn stats_expansion_pads_vector_features_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("meta")).unwrap();
        let mut stats = BTreeMap::new();
        stats.insert(
            "action".to_string(),
            FeatureStats {
                min: vec![-1.0; 12],
                max: vec![1.0; 12],
                mean: vec![0.0; 12],
                std: vec![0.5; 12],
                extra: BTreeMap::new(),
            },
        );
        stats.insert(
            "observation.images.top".to_string(),
            FeatureStats {
                min: vec![0.0; 3],
                max: vec![1.0; 3],
                mean: vec![0.4; 3],
                std: vec![0.2; 3],
                extra: BTreeMap::new(),
            },
        );
        save_stats(dir.path().join("meta/stats.json"), &stats).unwrap();

        expand_stats(dir.path()).unwrap();
        let stats = load_stats(dir.path().join("meta/stats.json")).unwrap();
        assert_eq!(stats["action"].dim(), 15);
        assert_eq!(stats["observation.images.top"].dim(), 3);
    }
}
