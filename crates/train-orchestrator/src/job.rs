//! Training job specification and the external trainer command line.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{OrchestratorError, Result};
use crate::hosts::TrainParams;

/// Known policy types, each with the program that launches its trainer.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, Vec<String>>,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let trainer = || {
            vec![
                "python".to_string(),
                "-m".to_string(),
                "lerobot.scripts.train".to_string(),
            ]
        };
        let mut policies = BTreeMap::new();
        for policy in ["act", "smolvla", "diffusion", "pi0"] {
            policies.insert(policy.to_string(), trainer());
        }
        Self { policies }
    }
}

impl PolicyRegistry {
    pub fn from_map(policies: BTreeMap<String, Vec<String>>) -> Self {
        Self { policies }
    }

    /// Policy names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.policies.keys().map(String::as_str).collect()
    }

    pub fn launcher(&self, policy: &str) -> Result<&[String]> {
        self.policies
            .get(policy)
            .map(Vec::as_slice)
            .ok_or_else(|| OrchestratorError::UnknownPolicy {
                name: policy.to_string(),
                valid: self.policies.keys().cloned().collect(),
            })
    }
}

/// One fully parameterized training invocation.
#[derive(Debug, Clone)]
pub struct TrainJob {
    pub job_id: String,
    pub policy: String,
    /// Dataset group the job trains on, for logging and job naming.
    pub group: String,
    pub datasets: Vec<String>,
    pub params: TrainParams,
    pub push: bool,
    pub output_dir: PathBuf,
}

impl TrainJob {
    /// Render the full trainer command (program plus arguments).
    ///
    /// The dataset list uses the trainer's bracketed comma form,
    /// `[a,b,c]`, which it parses as a multi-dataset selection.
    pub fn command(&self, registry: &PolicyRegistry) -> Result<Vec<String>> {
        let mut command = registry.launcher(&self.policy)?.to_vec();
        command.push(format!("--dataset.repo_id=[{}]", self.datasets.join(",")));
        command.push(format!("--policy.type={}", self.policy));
        command.push(format!("--batch_size={}", self.params.batch_size));
        command.push(format!("--num_workers={}", self.params.num_workers));
        command.push(format!("--steps={}", self.params.steps));
        command.push(format!("--output_dir={}", self.output_dir.display()));
        command.push(format!("--job_name={}", self.job_id));
        command.push("--save_checkpoint=true".to_string());
        command.push(format!("--policy.push_to_hub={}", self.push));
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TrainJob {
        TrainJob {
            job_id: "act_jetson_handover_20250101_120000_ab12".to_string(),
            policy: "act".to_string(),
            group: "handover".to_string(),
            datasets: vec![
                "mimic-robotics/handover_1".to_string(),
                "mimic-robotics/handover_2".to_string(),
            ],
            params: TrainParams {
                batch_size: 8,
                num_workers: 4,
                steps: 100_000,
            },
            push: true,
            output_dir: PathBuf::from("outputs/act_jetson_handover_20250101_120000_ab12"),
        }
    }

    #[test]
    fn command_carries_datasets_in_bracketed_form() {
        let command = job().command(&PolicyRegistry::default()).unwrap();
        assert_eq!(command[0], "python");
        assert!(command.contains(
            &"--dataset.repo_id=[mimic-robotics/handover_1,mimic-robotics/handover_2]"
                .to_string()
        ));
        assert!(command.contains(&"--policy.type=act".to_string()));
        assert!(command.contains(&"--batch_size=8".to_string()));
        assert!(command.contains(&"--steps=100000".to_string()));
        assert!(command.contains(&"--policy.push_to_hub=true".to_string()));
    }

    #[test]
    fn unknown_policy_error_lists_valid_ones() {
        let registry = PolicyRegistry::default();
        let err = registry.launcher("acr").unwrap_err();
        match &err {
            OrchestratorError::UnknownPolicy { name, valid } => {
                assert_eq!(name, "acr");
                assert_eq!(valid, &["act", "diffusion", "pi0", "smolvla"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("smolvla"));
    }
}
