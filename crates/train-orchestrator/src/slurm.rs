//! Batch-scheduler backend.
//!
//! The scheduler is an external collaborator, so submission goes through
//! the [`BatchScheduler`] trait; [`SlurmScheduler`] is the production
//! implementation and tests swap in a recording mock.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::error::{OrchestratorError, Result};

/// One structured job submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub job_name: String,
    pub gpus: u32,
    pub cpus: u32,
    pub mem_gb: u32,
    /// Wall-clock limit in the scheduler's `HH:MM:SS` form.
    pub wall_clock: String,
    /// Job id this submission must wait for, preserving sequencing
    /// across submissions that themselves return immediately.
    pub dependency: Option<String>,
    pub command: Vec<String>,
    pub log_path: PathBuf,
}

impl SubmitRequest {
    pub fn new(job_name: String, command: Vec<String>, log_path: PathBuf) -> Self {
        Self {
            job_name,
            gpus: 1,
            cpus: 8,
            mem_gb: 64,
            wall_clock: "24:00:00".to_string(),
            dependency: None,
            command,
            log_path,
        }
    }
}

/// Submits one job and returns the scheduler's job id.
pub trait BatchScheduler {
    fn submit(&self, request: &SubmitRequest) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    sbatch: PathBuf,
    /// Directory the rendered submission scripts are written to.
    script_dir: PathBuf,
}

impl SlurmScheduler {
    pub fn new(script_dir: impl Into<PathBuf>) -> Self {
        Self {
            sbatch: PathBuf::from("sbatch"),
            script_dir: script_dir.into(),
        }
    }

    pub fn with_sbatch(mut self, sbatch: impl Into<PathBuf>) -> Self {
        self.sbatch = sbatch.into();
        self
    }
}

impl BatchScheduler for SlurmScheduler {
    fn submit(&self, request: &SubmitRequest) -> Result<String> {
        std::fs::create_dir_all(&self.script_dir)
            .map_err(|err| OrchestratorError::io(err, &self.script_dir))?;
        let script_path = self.script_dir.join(format!("{}.sbatch", request.job_name));
        std::fs::write(&script_path, render_script(request))
            .map_err(|err| OrchestratorError::io(err, &script_path))?;

        let mut command = Command::new(&self.sbatch);
        command.arg("--parsable");
        if let Some(dependency) = &request.dependency {
            command.arg(format!("--dependency=afterany:{dependency}"));
        }
        command.arg(&script_path);

        let out = command.output().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                OrchestratorError::ToolMissing(self.sbatch.display().to_string())
            } else {
                OrchestratorError::io(err, &self.sbatch)
            }
        })?;
        if !out.status.success() {
            return Err(OrchestratorError::Scheduler {
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }

        // --parsable prints "jobid" or "jobid;cluster".
        let raw = String::from_utf8_lossy(&out.stdout).into_owned();
        let job_id = raw
            .trim()
            .split(';')
            .next()
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
            .ok_or_else(|| OrchestratorError::SubmitParse { raw: raw.clone() })?
            .to_string();
        info!(job_id, name = request.job_name, "submitted batch job");
        Ok(job_id)
    }
}

/// Render the submission script for one request.
pub fn render_script(request: &SubmitRequest) -> String {
    let mut script = String::from("#!/bin/bash\n");
    script.push_str(&format!("#SBATCH --job-name={}\n", request.job_name));
    script.push_str(&format!("#SBATCH --gres=gpu:{}\n", request.gpus));
    script.push_str(&format!("#SBATCH --cpus-per-task={}\n", request.cpus));
    script.push_str(&format!("#SBATCH --mem={}G\n", request.mem_gb));
    script.push_str(&format!("#SBATCH --time={}\n", request.wall_clock));
    script.push_str(&format!("#SBATCH --output={}\n", request.log_path.display()));
    script.push('\n');
    script.push_str(&shell_join(&request.command));
    script.push('\n');
    script
}

/// Join a command for the script body, quoting arguments that need it.
fn shell_join(command: &[String]) -> String {
    command
        .iter()
        .map(|arg| {
            if arg.chars().all(|c| {
                c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | ':' | ',')
            }) {
                arg.clone()
            } else {
                format!("'{}'", arg.replace('\'', r"'\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
