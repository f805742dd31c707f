use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// Per-episode metadata, one JSON object per line in `meta/episodes.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeMeta {
    pub episode_index: usize,
    #[serde(default)]
    pub tasks: Vec<String>,
    /// Number of frames in the episode.
    pub length: usize,
}

/// Load episode metadata, sorted by episode index.
pub fn load_episodes(path: impl AsRef<Path>) -> Result<Vec<EpisodeMeta>> {
    let path = path.as_ref();
    let raw =
        std::fs::read_to_string(path).map_err(|err| SchemaError::Io(err, path.to_owned()))?;
    let mut episodes = raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<Result<Vec<EpisodeMeta>, _>>()?;
    episodes.sort_by_key(|episode| episode.episode_index);
    Ok(episodes)
}

pub fn save_episodes(path: impl AsRef<Path>, episodes: &[EpisodeMeta]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|err| SchemaError::Io(err, path.to_owned()))?;
    let mut writer = BufWriter::new(file);
    for episode in episodes {
        serde_json::to_writer(&mut writer, episode)?;
        writer
            .write_all(b"\n")
            .map_err(|err| SchemaError::Io(err, path.to_owned()))?;
    }
    Ok(())
}
