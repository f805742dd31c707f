use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// Summary statistics for one vector feature from `meta/stats.json`.
///
/// Image features store nested per-channel stats; we keep those as raw
/// JSON since the converter never touches them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureStats {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub min: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub max: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mean: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub std: Vec<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FeatureStats {
    /// Append `count` zero-valued dimensions to every statistic vector.
    ///
    /// The new dimensions hold a physically stationary base, so zero is
    /// the exact statistic, not an estimate.
    pub fn extend_zeros(&mut self, count: usize) {
        for stat in [&mut self.min, &mut self.max, &mut self.mean, &mut self.std] {
            if !stat.is_empty() {
                stat.extend(std::iter::repeat(0.0).take(count));
            }
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

/// All per-feature statistics keyed by feature name.
pub type DatasetStats = BTreeMap<String, FeatureStats>;

pub fn load_stats(path: impl AsRef<Path>) -> Result<DatasetStats> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| SchemaError::Io(err, path.to_owned()))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

pub fn save_stats(path: impl AsRef<Path>, stats: &DatasetStats) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|err| SchemaError::Io(err, path.to_owned()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), stats)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_zeros_appends_to_all_vectors() {
        let mut stats = FeatureStats {
            min: vec![-1.0; 12],
            max: vec![1.0; 12],
            mean: vec![0.5; 12],
            std: vec![0.1; 12],
            extra: BTreeMap::new(),
        };
        stats.extend_zeros(3);
        assert_eq!(stats.min.len(), 15);
        assert_eq!(stats.max.len(), 15);
        assert_eq!(&stats.mean[12..], &[0.0, 0.0, 0.0]);
        assert_eq!(&stats.std[12..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn extend_zeros_skips_absent_vectors() {
        let mut stats = FeatureStats::default();
        stats.extend_zeros(3);
        assert!(stats.min.is_empty());
    }

    #[test]
    fn stats_round_trip_preserves_unknown_fields() {
        let raw = r#"{"action": {"min": [0.0], "max": [1.0], "mean": [0.5], "std": [0.2], "count": [100]}}"#;
        let stats: DatasetStats = serde_json::from_str(raw).unwrap();
        let action = &stats["action"];
        assert_eq!(action.dim(), 1);
        assert!(action.extra.contains_key("count"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        save_stats(&path, &stats).unwrap();
        let loaded = load_stats(&path).unwrap();
        assert!(loaded["action"].extra.contains_key("count"));
    }
}
