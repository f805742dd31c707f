//! Host-based parameter defaulting.
//!
//! Resolution is a pure three-tier chain: an explicit override always
//! wins, then the host entry, then the global fallback. No environment
//! variables or hostname sniffing inside the resolution itself; the
//! caller names the host.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::{OrchestratorError, Result};

pub const DEFAULT_STEPS: u64 = 100_000;

/// Per-host training defaults.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HostDefaults {
    pub batch_size: u32,
    pub num_workers: u32,
}

/// Fully resolved training parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainParams {
    pub batch_size: u32,
    pub num_workers: u32,
    pub steps: u64,
}

/// Explicit CLI overrides, each optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamOverrides {
    pub batch_size: Option<u32>,
    pub num_workers: Option<u32>,
    pub steps: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostTable {
    global: HostDefaults,
    #[serde(default)]
    hosts: BTreeMap<String, HostDefaults>,
}

impl Default for HostTable {
    /// The fleet's known compute hosts. A YAML table overrides this.
    fn default() -> Self {
        let mut hosts = BTreeMap::new();
        hosts.insert(
            "jetson".to_string(),
            HostDefaults {
                batch_size: 4,
                num_workers: 2,
            },
        );
        hosts.insert(
            "workstation".to_string(),
            HostDefaults {
                batch_size: 8,
                num_workers: 4,
            },
        );
        hosts.insert(
            "cluster".to_string(),
            HostDefaults {
                batch_size: 32,
                num_workers: 8,
            },
        );
        Self {
            global: HostDefaults {
                batch_size: 8,
                num_workers: 4,
            },
            hosts,
        }
    }
}

impl HostTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| OrchestratorError::io(err, path))?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn host_names(&self) -> Vec<&str> {
        self.hosts.keys().map(String::as_str).collect()
    }

    fn defaults_for(&self, host: &str) -> HostDefaults {
        match self.hosts.get(host) {
            Some(defaults) => *defaults,
            None => {
                warn!(host, "host not in table, using global defaults");
                self.global
            }
        }
    }

    /// Resolve the full parameter set for one host.
    pub fn resolve(&self, host: &str, overrides: ParamOverrides) -> TrainParams {
        let defaults = self.defaults_for(host);
        TrainParams {
            batch_size: overrides.batch_size.unwrap_or(defaults.batch_size),
            num_workers: overrides.num_workers.unwrap_or(defaults.num_workers),
            steps: overrides.steps.unwrap_or(DEFAULT_STEPS),
        }
    }
}
