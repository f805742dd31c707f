//! Dataset group resolution: symbolic group names map to ordered lists
//! of dataset repo ids via a static YAML table.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Deserialize)]
struct GroupsFile {
    groups: BTreeMap<String, Vec<String>>,
}

/// The group table, keyed by group name.
#[derive(Debug, Clone, Default)]
pub struct DatasetGroups {
    groups: BTreeMap<String, Vec<String>>,
}

impl DatasetGroups {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| OrchestratorError::io(err, path))?;
        let file: GroupsFile = serde_yaml::from_str(&raw)?;
        Ok(Self {
            groups: file.groups,
        })
    }

    pub fn from_map(groups: BTreeMap<String, Vec<String>>) -> Self {
        Self { groups }
    }

    /// Group names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups
            .iter()
            .map(|(name, datasets)| (name.as_str(), datasets.as_slice()))
    }

    /// Datasets of one group, in their declared order.
    ///
    /// An unknown name never resolves to an empty list; the error names
    /// every valid group so the operator can correct the invocation.
    pub fn get(&self, name: &str) -> Result<&[String]> {
        self.groups
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| OrchestratorError::UnknownGroup {
                name: name.to_string(),
                valid: self.groups.keys().cloned().collect(),
            })
    }

    /// Concatenate several groups into one dataset list, dropping
    /// duplicates while preserving first-occurrence order.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<String>> {
        let mut datasets = Vec::new();
        for name in names {
            for dataset in self.get(name)? {
                if !datasets.contains(dataset) {
                    datasets.push(dataset.clone());
                }
            }
        }
        Ok(datasets)
    }
}
