//! dataset-schema: record schema for Mimic robot-learning datasets
//!
//! Models the on-disk layout of a recorded dataset (metadata, episode
//! listings, per-feature declarations) across the two schema versions we
//! care about: `v2.1` (12-D arm-only, episode-per-file storage) and
//! `v3.0` (15-D arm+base, size-consolidated file storage).

mod error;
pub use error::{Result, SchemaError};

mod types;
pub use types::{DType, Feature, FeatureNames, SchemaVersion, VideoInfo};

mod info;
pub use info::DatasetInfo;

mod episodes;
pub use episodes::{load_episodes, save_episodes, EpisodeMeta};

mod stats;
pub use stats::{load_stats, save_stats, DatasetStats, FeatureStats};

pub mod names;

mod validate;
pub use validate::validate_dataset;
