use std::path::Path;

use tracing::{debug, info};

use crate::episodes::load_episodes;
use crate::error::{Result, SchemaError};
use crate::info::DatasetInfo;
use crate::types::SchemaVersion;

/// Validate a dataset directory against its own metadata.
///
/// Checks that the version tag, vector dimensionalities, episode/frame
/// counts and camera stream files are mutually consistent. Returns the
/// parsed `info.json` on success so callers can keep working with it.
///
/// Fails on the first inconsistency; the converter treats any failure
/// as an abort-before-publish condition.
pub fn validate_dataset(
    root: impl AsRef<Path>,
    expected_version: Option<SchemaVersion>,
) -> Result<DatasetInfo> {
    let root = root.as_ref();
    let info = DatasetInfo::load(root.join("meta").join("info.json"))?;

    if let Some(expected) = expected_version {
        if info.version() != expected {
            return Err(SchemaError::VersionMismatch {
                expected,
                found: info.version(),
            });
        }
    }

    check_vector_features(&info)?;
    check_episode_counts(root, &info)?;
    check_video_files(root, &info)?;

    info!(
        version = %info.version(),
        episodes = info.total_episodes,
        frames = info.total_frames,
        cameras = info.camera_keys().len(),
        "dataset validated"
    );
    Ok(info)
}

fn check_vector_features(info: &DatasetInfo) -> Result<()> {
    let action_dim = info.action_dim()?;
    let state_dim = info.state_dim()?;
    if action_dim != state_dim {
        return Err(SchemaError::DimMismatch {
            action: action_dim,
            state: state_dim,
        });
    }

    let expected = info.version().expected_dim();
    if action_dim != expected {
        return Err(SchemaError::WrongDim {
            key: "action".to_string(),
            version: info.version(),
            expected,
            found: action_dim,
        });
    }

    for key in ["action", "observation.state"] {
        let feature = info.feature(key)?;
        if let Some(names) = &feature.names {
            if names.len() != feature.dim() {
                return Err(SchemaError::NameCountMismatch {
                    key: key.to_string(),
                    shape: feature.dim(),
                    names: names.len(),
                });
            }
        }
    }
    Ok(())
}

fn check_episode_counts(root: &Path, info: &DatasetInfo) -> Result<()> {
    let episodes_path = root.join("meta").join("episodes.jsonl");
    if !episodes_path.exists() {
        // v3.0 consolidates episode metadata into parquet files; the
        // jsonl listing only exists in v2.1-era datasets.
        debug!("no episodes.jsonl, skipping episode count check");
        return Ok(());
    }

    let episodes = load_episodes(&episodes_path)?;
    if episodes.len() != info.total_episodes {
        return Err(SchemaError::EpisodeCount {
            declared: info.total_episodes,
            found: episodes.len(),
        });
    }

    let frames: usize = episodes.iter().map(|episode| episode.length).sum();
    if frames != info.total_frames {
        return Err(SchemaError::FrameCount {
            declared: info.total_frames,
            found: frames,
        });
    }
    Ok(())
}

fn check_video_files(root: &Path, info: &DatasetInfo) -> Result<()> {
    let cameras = info.camera_keys();
    if cameras.is_empty() {
        return Ok(());
    }

    match info.version() {
        SchemaVersion::V21 => {
            // Episode-per-file layout: every declared camera must have a
            // video file for every episode.
            for camera in &cameras {
                for episode_index in 0..info.total_episodes {
                    let relative = info.episode_video_path(camera, episode_index)?;
                    let path = root.join(&relative);
                    if !path.exists() {
                        return Err(SchemaError::MissingVideo {
                            camera: camera.to_string(),
                            path,
                        });
                    }
                }
            }
        }
        SchemaVersion::V30 => {
            // Consolidated layout: camera streams must carry the same
            // number of video files as each other.
            let mut counts: Vec<(&str, usize)> = Vec::new();
            for camera in &cameras {
                let dir = root.join("videos").join(camera);
                if !dir.is_dir() {
                    return Err(SchemaError::MissingVideo {
                        camera: camera.to_string(),
                        path: dir,
                    });
                }
                counts.push((camera, count_mp4_files(&dir)?));
            }
            if let Some(&(first_camera, first_count)) = counts.first() {
                if first_count == 0 {
                    return Err(SchemaError::MissingVideo {
                        camera: first_camera.to_string(),
                        path: root.join("videos").join(first_camera),
                    });
                }
                for &(camera, count) in &counts[1..] {
                    if count != first_count {
                        return Err(SchemaError::VideoCountMismatch {
                            camera_a: first_camera.to_string(),
                            count_a: first_count,
                            camera_b: camera.to_string(),
                            count_b: count,
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

fn count_mp4_files(dir: &Path) -> Result<usize> {
    let mut count = 0;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries =
            std::fs::read_dir(&current).map_err(|err| SchemaError::Io(err, current.clone()))?;
        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::Io(err, current.clone()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "mp4") {
                count += 1;
            }
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episodes::{save_episodes, EpisodeMeta};
    use crate::names;
    use crate::types::Feature;
    use std::collections::BTreeMap;
    use std::fs;

    fn write_fixture(
        root: &Path,
        version: SchemaVersion,
        episodes: usize,
        cameras: &[&str],
    ) -> DatasetInfo {
        let mut features = BTreeMap::new();
        let dim = version.expected_dim();
        let joint_names: Vec<String> = names::ARM_JOINT_NAMES
            .iter()
            .map(|s| s.to_string())
            .chain(
                names::BASE_ACTION_NAMES
                    .iter()
                    .map(|s| s.to_string())
                    .take(dim.saturating_sub(12)),
            )
            .collect();
        features.insert("action".to_string(), Feature::vector(joint_names.clone()));
        features.insert(
            "observation.state".to_string(),
            Feature::vector(joint_names),
        );
        for camera in cameras {
            features.insert(
                names::image_key(camera),
                Feature::camera(640, 480, 30, "av1"),
            );
        }

        let (data_path, video_path) = match version {
            SchemaVersion::V21 => (
                "data/chunk-{episode_chunk:03d}/episode_{episode_index:06d}.parquet",
                "videos/chunk-{episode_chunk:03d}/{video_key}/episode_{episode_index:06d}.mp4",
            ),
            SchemaVersion::V30 => (
                "data/chunk-{chunk_index:03d}/file-{file_index:03d}.parquet",
                "videos/{video_key}/chunk-{chunk_index:03d}/file-{file_index:03d}.mp4",
            ),
        };

        let info = DatasetInfo {
            codebase_version: version,
            robot_type: Some("bimanual_follower".to_string()),
            total_episodes: episodes,
            total_frames: episodes * 100,
            total_tasks: 1,
            total_videos: Some(episodes * cameras.len()),
            total_chunks: Some(1),
            chunks_size: 1000,
            data_files_size_in_mb: None,
            video_files_size_in_mb: None,
            fps: 30,
            splits: None,
            data_path: data_path.to_string(),
            video_path: Some(video_path.to_string()),
            image_path: None,
            features,
        };

        fs::create_dir_all(root.join("meta")).unwrap();
        info.save(root.join("meta/info.json")).unwrap();

        let metas: Vec<EpisodeMeta> = (0..episodes)
            .map(|episode_index| EpisodeMeta {
                episode_index,
                tasks: vec!["handover".to_string()],
                length: 100,
            })
            .collect();
        save_episodes(root.join("meta/episodes.jsonl"), &metas).unwrap();

        match version {
            SchemaVersion::V21 => {
                for camera in cameras {
                    for episode_index in 0..episodes {
                        let path = root
                            .join(
                                info.episode_video_path(&names::image_key(camera), episode_index)
                                    .unwrap(),
                            );
                        fs::create_dir_all(path.parent().unwrap()).unwrap();
                        fs::write(path, b"").unwrap();
                    }
                }
            }
            SchemaVersion::V30 => {
                for camera in cameras {
                    let dir = root
                        .join("videos")
                        .join(names::image_key(camera))
                        .join("chunk-000");
                    fs::create_dir_all(&dir).unwrap();
                    fs::write(dir.join("file-000.mp4"), b"").unwrap();
                }
            }
        }

        info
    }

    #[test]
    fn valid_v21_dataset_passes() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), SchemaVersion::V21, 2, &["wrist_right", "top"]);
        let info = validate_dataset(dir.path(), Some(SchemaVersion::V21)).unwrap();
        assert_eq!(info.total_episodes, 2);
    }

    #[test]
    fn missing_video_fails() {
        let dir = tempfile::tempdir().unwrap();
        let info = write_fixture(dir.path(), SchemaVersion::V21, 2, &["wrist_right"]);
        let victim = dir.path().join(
            info.episode_video_path("observation.images.wrist_right", 1)
                .unwrap(),
        );
        fs::remove_file(victim).unwrap();
        let err = validate_dataset(dir.path(), None).unwrap_err();
        assert!(matches!(err, SchemaError::MissingVideo { .. }));
    }

    #[test]
    fn wrong_version_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), SchemaVersion::V21, 1, &["wrist_right"]);
        let err = validate_dataset(dir.path(), Some(SchemaVersion::V30)).unwrap_err();
        assert!(matches!(err, SchemaError::VersionMismatch { .. }));
    }

    #[test]
    fn episode_count_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = write_fixture(dir.path(), SchemaVersion::V21, 2, &["wrist_right"]);
        info.total_episodes = 3;
        info.save(dir.path().join("meta/info.json")).unwrap();
        let err = validate_dataset(dir.path(), None).unwrap_err();
        // The missing third episode's video is hit only after the count check.
        assert!(matches!(err, SchemaError::EpisodeCount { .. }));
    }

    #[test]
    fn v30_unequal_camera_counts_fail() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), SchemaVersion::V30, 2, &["top", "front"]);
        let extra = dir
            .path()
            .join("videos/observation.images.top/chunk-000/file-001.mp4");
        fs::write(extra, b"").unwrap();
        let err = validate_dataset(dir.path(), None).unwrap_err();
        assert!(matches!(err, SchemaError::VideoCountMismatch { .. }));
    }
}
