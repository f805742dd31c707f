//! Multi-source merge: concatenate several recorded datasets into one,
//! renumbering episodes contiguously, before the version upgrade runs
//! once over the merged whole.
//!
//! Sources must agree on their feature declarations and frame rate; a
//! disagreement is a recording error upstream, not something the merge
//! can paper over.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, RecordBatch};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{debug, info, warn};

use dataset_schema::{
    load_episodes, load_stats, save_episodes, save_stats, DatasetInfo, DatasetStats, EpisodeMeta,
    FeatureStats,
};

use crate::error::{ConvertError, Result};

/// Merge the datasets at `sources` into a fresh dataset at `dest`.
///
/// Episodes keep their within-source order; indices are reassigned so
/// the merged dataset counts 0..total with no gaps. Returns the merged
/// metadata after it has been written to `dest/meta/info.json`.
pub fn merge_sources(sources: &[PathBuf], dest: &Path) -> Result<DatasetInfo> {
    let first = sources.first().ok_or_else(|| {
        ConvertError::MergeMismatch("at least one source dataset is required".to_string())
    })?;
    let mut merged = DatasetInfo::load(first.join("meta/info.json"))?;
    for source in &sources[1..] {
        let info = DatasetInfo::load(source.join("meta/info.json"))?;
        check_compatible(&merged, &info, source)?;
    }
    info!(sources = sources.len(), dest = %dest.display(), "merging datasets");

    std::fs::create_dir_all(dest.join("meta")).map_err(|err| ConvertError::io(err, dest))?;

    let mut episodes: Vec<EpisodeMeta> = Vec::new();
    let mut next_episode: usize = 0;
    let mut next_frame: i64 = 0;
    let mut stats_inputs: Vec<(DatasetStats, usize)> = Vec::new();

    for source in sources {
        let info = DatasetInfo::load(source.join("meta/info.json"))?;
        let source_episodes = load_episodes(source.join("meta/episodes.jsonl"))?;
        debug!(source = %source.display(), episodes = source_episodes.len(), "merging source");

        for episode in &source_episodes {
            let src_data = source.join(info.episode_data_path(episode.episode_index));
            let dst_data = dest.join(merged.episode_data_path(next_episode));
            let frames = renumber_episode_file(&src_data, &dst_data, next_episode, next_frame)?;

            for camera in info.camera_keys() {
                let src = source.join(info.episode_video_path(camera, episode.episode_index)?);
                let dst = dest.join(merged.episode_video_path(camera, next_episode)?);
                if let Some(parent) = dst.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|err| ConvertError::io(err, parent))?;
                }
                std::fs::copy(&src, &dst).map_err(|err| ConvertError::io(err, &src))?;
            }

            episodes.push(EpisodeMeta {
                episode_index: next_episode,
                tasks: episode.tasks.clone(),
                length: frames,
            });
            next_episode += 1;
            next_frame += frames as i64;
        }

        let stats_path = source.join("meta/stats.json");
        if stats_path.is_file() {
            stats_inputs.push((load_stats(&stats_path)?, info.total_frames));
        }
    }

    save_episodes(dest.join("meta/episodes.jsonl"), &episodes)?;
    merge_tasks(sources, dest)?;

    if stats_inputs.len() == sources.len() {
        let stats = merge_stats(&stats_inputs)?;
        save_stats(dest.join("meta/stats.json"), &stats)?;
    } else if !stats_inputs.is_empty() {
        warn!("not every source carries stats.json, skipping merged stats");
    }

    let camera_count = merged.camera_keys().len();
    merged.total_episodes = next_episode;
    merged.total_frames = usize::try_from(next_frame).unwrap_or(0);
    merged.total_videos = Some(next_episode * camera_count);
    merged.total_chunks = Some(next_episode.div_ceil(merged.chunks_size));
    if merged.splits.is_some() {
        merged.splits = Some(
            [("train".to_string(), format!("0:{next_episode}"))]
                .into_iter()
                .collect(),
        );
    }
    merged.save(dest.join("meta/info.json"))?;
    info!(
        episodes = merged.total_episodes,
        frames = merged.total_frames,
        "merge complete"
    );
    Ok(merged)
}

/// Sources must be interchangeable recordings of the same robot setup.
fn check_compatible(first: &DatasetInfo, other: &DatasetInfo, source: &Path) -> Result<()> {
    if other.codebase_version != first.codebase_version {
        return Err(ConvertError::MergeMismatch(format!(
            "{} is {}, expected {}",
            source.display(),
            other.codebase_version,
            first.codebase_version
        )));
    }
    if other.fps != first.fps {
        return Err(ConvertError::MergeMismatch(format!(
            "{} runs at {} fps, expected {}",
            source.display(),
            other.fps,
            first.fps
        )));
    }
    if serde_json::to_value(&other.features)? != serde_json::to_value(&first.features)? {
        return Err(ConvertError::MergeMismatch(format!(
            "{} declares different features",
            source.display()
        )));
    }
    Ok(())
}

/// Copy one episode's data file, rewriting its bookkeeping columns.
///
/// `episode_index` becomes the new index on every row; `index` becomes a
/// contiguous global frame range starting at `frame_start`. Rewriting
/// from scratch (rather than offsetting) keeps the merged numbering
/// gap-free even when a source has holes in its own numbering.
fn renumber_episode_file(
    src: &Path,
    dst: &Path,
    episode_index: usize,
    frame_start: i64,
) -> Result<usize> {
    let file = File::open(src).map_err(|err| ConvertError::io(err, src))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut batches = Vec::new();
    let mut frame = frame_start;
    for batch in reader {
        let batch = renumber_batch(&batch?, episode_index as i64, &mut frame, src)?;
        batches.push(batch);
    }

    let schema = batches.first().map(|batch| batch.schema()).ok_or_else(|| {
        ConvertError::io(
            std::io::Error::new(std::io::ErrorKind::InvalidData, "empty parquet file"),
            src,
        )
    })?;

    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|err| ConvertError::io(err, parent))?;
    }
    let out = File::create(dst).map_err(|err| ConvertError::io(err, dst))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(out, schema, Some(props))?;
    for batch in &batches {
        writer.write(batch)?;
    }
    writer.close()?;

    Ok(usize::try_from(frame - frame_start).unwrap_or(0))
}

fn renumber_batch(
    batch: &RecordBatch,
    episode_index: i64,
    frame: &mut i64,
    path: &Path,
) -> Result<RecordBatch> {
    let rows = batch.num_rows();
    let mut columns: Vec<(String, ArrayRef)> = Vec::with_capacity(batch.num_columns());
    for (field, column) in batch.schema().fields().iter().zip(batch.columns()) {
        let column: ArrayRef = match field.name().as_str() {
            "episode_index" => {
                require_int64(column, field.name(), path)?;
                Arc::new(Int64Array::from(vec![episode_index; rows]))
            }
            "index" => {
                require_int64(column, field.name(), path)?;
                Arc::new(Int64Array::from(
                    (*frame..*frame + rows as i64).collect::<Vec<_>>(),
                ))
            }
            _ => column.clone(),
        };
        columns.push((field.name().clone(), column));
    }
    *frame += rows as i64;
    Ok(RecordBatch::try_from_iter(columns)?)
}

fn require_int64(array: &ArrayRef, column: &str, path: &Path) -> Result<()> {
    if array.data_type() != &DataType::Int64 {
        return Err(ConvertError::UnsupportedColumn {
            column: column.to_string(),
            path: path.to_owned(),
            dtype: format!("{:?}", array.data_type()),
        });
    }
    Ok(())
}

/// Task tables index into the data files by position, so sources must
/// carry byte-identical task lists for the merged indices to stay valid.
fn merge_tasks(sources: &[PathBuf], dest: &Path) -> Result<()> {
    let first_path = sources[0].join("meta/tasks.jsonl");
    if !first_path.is_file() {
        return Ok(());
    }
    let first =
        std::fs::read_to_string(&first_path).map_err(|err| ConvertError::io(err, &first_path))?;
    for source in &sources[1..] {
        let path = source.join("meta/tasks.jsonl");
        let tasks =
            std::fs::read_to_string(&path).map_err(|err| ConvertError::io(err, &path))?;
        if tasks != first {
            return Err(ConvertError::MergeMismatch(format!(
                "{} declares a different task list",
                source.display()
            )));
        }
    }
    let dst = dest.join("meta/tasks.jsonl");
    std::fs::write(&dst, first).map_err(|err| ConvertError::io(err, &dst))?;
    Ok(())
}

/// Combine per-source statistics, weighting by frame count.
///
/// min/max combine elementwise; the combined variance comes from the
/// standard pooled form E[x^2] - E[x]^2 over the per-source moments.
fn merge_stats(inputs: &[(DatasetStats, usize)]) -> Result<DatasetStats> {
    let mut merged = DatasetStats::new();
    let (first, _) = &inputs[0];
    for (key, base) in first {
        let mut parts = Vec::with_capacity(inputs.len());
        for (stats, frames) in inputs {
            match stats.get(key) {
                Some(feature) if feature.dim() == base.dim() => {
                    check_stat_lengths(key, feature)?;
                    parts.push((feature, *frames));
                }
                Some(_) => {
                    return Err(ConvertError::MergeMismatch(format!(
                        "stats for {key} disagree on dimensionality"
                    )));
                }
                // A feature only some sources track cannot be pooled.
                None => {
                    return Err(ConvertError::MergeMismatch(format!(
                        "stats for {key} missing from a source"
                    )));
                }
            }
        }
        merged.insert(key.clone(), merge_feature_stats(&parts));
    }
    Ok(merged)
}

/// Every stats vector is independently optional in `stats.json`, so a
/// source can carry `mean`/`std` without `min`/`max`; pooling needs all
/// four at the same length.
fn check_stat_lengths(key: &str, stats: &FeatureStats) -> Result<()> {
    let dim = stats.dim();
    if stats.min.len() != dim || stats.max.len() != dim || stats.std.len() != dim {
        return Err(ConvertError::MergeMismatch(format!(
            "stats for {key} carry min/max/mean/std of different lengths"
        )));
    }
    Ok(())
}

fn merge_feature_stats(parts: &[(&FeatureStats, usize)]) -> FeatureStats {
    let dim = parts[0].0.dim();
    let total: f64 = parts.iter().map(|(_, frames)| *frames as f64).sum();

    let mut out = FeatureStats {
        extra: parts[0].0.extra.clone(),
        ..FeatureStats::default()
    };
    if dim == 0 || total == 0.0 {
        return out;
    }

    for index in 0..dim {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut mean = 0.0;
        let mut second_moment = 0.0;
        for (stats, frames) in parts {
            let weight = *frames as f64 / total;
            min = min.min(stats.min[index]);
            max = max.max(stats.max[index]);
            mean += weight * stats.mean[index];
            second_moment +=
                weight * (stats.std[index] * stats.std[index] + stats.mean[index] * stats.mean[index]);
        }
        out.min.push(min);
        out.max.push(max);
        out.mean.push(mean);
        out.std.push((second_moment - mean * mean).max(0.0).sqrt());
    }
    out
}
