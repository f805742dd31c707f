//! Camera channel remapping: rename stored streams, letterbox the top
//! camera to its new resolution, and synthesize the front camera as
//! black frames matching the reference stream frame-for-frame.
//!
//! Operates on the episode-per-file video layout
//! (`videos/chunk-XXX/observation.images.<camera>/episode_NNNNNN.mp4`);
//! the later consolidation stage reorganizes files, so directory names
//! and `info.json` feature keys must already agree when it runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use dataset_schema::{names, DatasetInfo, Feature};

use crate::error::{ConvertError, Result};
use crate::video::VideoTool;

/// Rename camera directories, letterbox `top`, and synthesize `front`
/// under every chunk of `root/videos`.
pub async fn remap_cameras(root: &Path, video: &VideoTool, parallelism: usize) -> Result<()> {
    let videos_dir = root.join("videos");
    if !videos_dir.is_dir() {
        tracing::warn!(dir = %videos_dir.display(), "no videos directory, skipping camera remap");
        return Ok(());
    }
    let chunks = chunk_dirs(&videos_dir)?;
    info!(chunks = chunks.len(), "remapping camera streams");

    for chunk in &chunks {
        rename_camera_dirs(chunk)?;
    }

    let letterbox_targets = collect_episode_videos(&chunks, names::LETTERBOX_CAMERA)?;
    info!(
        videos = letterbox_targets.len(),
        width = names::LETTERBOX_WIDTH,
        height = names::LETTERBOX_HEIGHT,
        "letterboxing top camera"
    );
    run_parallel(parallelism, letterbox_targets, |path| {
        let video = video.clone();
        async move {
            let tmp = path.with_extension("letterbox.mp4");
            video
                .letterbox(&path, &tmp, names::LETTERBOX_WIDTH, names::LETTERBOX_HEIGHT)
                .await?;
            std::fs::rename(&tmp, &path).map_err(|err| ConvertError::io(err, &path))?;
            Ok(())
        }
    })
    .await?;

    // The right wrist stream is the frame-count reference for the
    // synthesized front camera.
    let reference = collect_episode_videos(&chunks, "right_wrist")?;
    info!(videos = reference.len(), "synthesizing front camera");
    run_parallel(parallelism, reference, |path| {
        let video = video.clone();
        async move {
            let frames = video.frame_count(&path).await?;
            let front_path = sibling_camera_path(&path, names::SYNTHETIC_CAMERA)?;
            video
                .create_blank_video(
                    &front_path,
                    frames,
                    names::SYNTHETIC_WIDTH,
                    names::SYNTHETIC_HEIGHT,
                    names::SYNTHETIC_FPS,
                )
                .await?;
            debug!(frames, file = %front_path.display(), "front stream written");
            Ok(())
        }
    })
    .await?;

    Ok(())
}

/// Apply the same key substitution to the feature declarations.
///
/// Renamed streams keep their declaration; `top` is re-declared at the
/// letterboxed resolution and `front` gains a fresh declaration. This
/// runs with the file remap so the metadata and the directory tree never
/// disagree on camera keys.
pub fn remap_feature_keys(info: &mut DatasetInfo) {
    for (old, new) in names::CAMERA_RENAMES {
        if let Some(feature) = info.features.remove(&names::image_key(old)) {
            info.features.insert(names::image_key(new), feature);
        }
    }

    let codec = "libx264";
    info.features.insert(
        names::image_key(names::LETTERBOX_CAMERA),
        Feature::camera(
            names::LETTERBOX_WIDTH,
            names::LETTERBOX_HEIGHT,
            info.fps,
            codec,
        ),
    );
    info.features.insert(
        names::image_key(names::SYNTHETIC_CAMERA),
        Feature::camera(
            names::SYNTHETIC_WIDTH,
            names::SYNTHETIC_HEIGHT,
            names::SYNTHETIC_FPS,
            codec,
        ),
    );

    if let Some(total_videos) = info.total_videos.as_mut() {
        // One synthesized stream per episode joins the set.
        *total_videos += info.total_episodes;
    }
}

fn rename_camera_dirs(chunk: &Path) -> Result<()> {
    for (old, new) in names::CAMERA_RENAMES {
        let from = chunk.join(names::image_key(old));
        if from.is_dir() {
            let to = chunk.join(names::image_key(new));
            debug!(from = %from.display(), to = %to.display(), "renaming stream");
            std::fs::rename(&from, &to).map_err(|err| ConvertError::io(err, &from))?;
        }
    }
    Ok(())
}

fn chunk_dirs(videos_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(videos_dir).map_err(|err| ConvertError::io(err, videos_dir))?;
    let mut chunks = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| ConvertError::io(err, videos_dir))?;
        let path = entry.path();
        if path.is_dir()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("chunk-"))
        {
            chunks.push(path);
        }
    }
    chunks.sort();
    Ok(chunks)
}

fn collect_episode_videos(chunks: &[PathBuf], camera: &str) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();
    for chunk in chunks {
        let dir = chunk.join(names::image_key(camera));
        if !dir.is_dir() {
            continue;
        }
        let entries = std::fs::read_dir(&dir).map_err(|err| ConvertError::io(err, &dir))?;
        for entry in entries {
            let entry = entry.map_err(|err| ConvertError::io(err, &dir))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "mp4") {
                videos.push(path);
            }
        }
    }
    videos.sort();
    Ok(videos)
}

/// Path of the same episode file under a different camera directory.
fn sibling_camera_path(path: &Path, camera: &str) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        ConvertError::io(
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
            path,
        )
    })?;
    let chunk = path.parent().and_then(Path::parent).ok_or_else(|| {
        ConvertError::io(
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "no chunk directory"),
            path,
        )
    })?;
    Ok(chunk.join(names::image_key(camera)).join(file_name))
}

async fn run_parallel<F, Fut>(parallelism: usize, items: Vec<PathBuf>, job: F) -> Result<()>
where
    F: Fn(PathBuf) -> Fut,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut set = JoinSet::new();
    for item in items {
        let permit = semaphore.clone();
        let fut = job(item);
        set.spawn(async move {
            let _permit = permit.acquire().await;
            fut.await
        });
    }
    while let Some(result) = set.join_next().await {
        result??;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset_schema::{DType, SchemaVersion};
    use std::collections::BTreeMap;
    use std::fs;

    fn fixture_info() -> DatasetInfo {
        let mut features = BTreeMap::new();
        for camera in ["wrist_right", "wrist_left", "realsense_top"] {
            features.insert(names::image_key(camera), Feature::camera(640, 480, 30, "av1"));
        }
        features.insert(
            "action".to_string(),
            Feature::vector(names::ARM_JOINT_NAMES.map(String::from).to_vec()),
        );
        DatasetInfo {
            codebase_version: SchemaVersion::V21,
            robot_type: Some("bimanual_follower".to_string()),
            total_episodes: 10,
            total_frames: 1000,
            total_tasks: 1,
            total_videos: Some(30),
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
    fn feature_keys_follow_rename_table() {
        let mut info = fixture_info();
        remap_feature_keys(&mut info);

        for old in ["wrist_right", "wrist_left", "realsense_top"] {
            assert!(!info.features.contains_key(&names::image_key(old)));
        }
        for new in ["right_wrist", "left_wrist", "top", "front"] {
            assert!(info.features.contains_key(&names::image_key(new)), "{new}");
        }

        let top = &info.features[&names::image_key("top")];
        assert_eq!(top.shape, vec![720, 1280, 3]);
        let front = &info.features[&names::image_key("front")];
        assert_eq!(front.shape, vec![480, 640, 3]);
        assert_eq!(front.dtype, DType::Video);
    }

    #[test]
    fn total_videos_grows_by_one_stream() {
        let mut info = fixture_info();
        remap_feature_keys(&mut info);
        assert_eq!(info.total_videos, Some(40));
    }

    #[test]
    fn rename_moves_directories() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = dir.path().join("videos/chunk-000");
        for camera in ["wrist_right", "wrist_left", "realsense_top"] {
            fs::create_dir_all(chunk.join(names::image_key(camera))).unwrap();
        }
        rename_camera_dirs(&chunk).unwrap();
        assert!(chunk.join("observation.images.right_wrist").is_dir());
        assert!(chunk.join("observation.images.left_wrist").is_dir());
        assert!(chunk.join("observation.images.top").is_dir());
        assert!(!chunk.join("observation.images.wrist_right").exists());
    }

    #[test]
    fn sibling_path_swaps_camera_directory() {
        let path = Path::new(
            "videos/chunk-000/observation.images.right_wrist/episode_000003.mp4",
        );
        let sibling = sibling_camera_path(path, "front").unwrap();
        assert_eq!(
            sibling,
            Path::new("videos/chunk-000/observation.images.front/episode_000003.mp4")
        );
    }
}
