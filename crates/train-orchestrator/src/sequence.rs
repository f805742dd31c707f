//! Sequencing: expand a (groups x policies) selection into ordered jobs
//! and run them through one of the execution backends.
//!
//! Everything is validated before anything launches; a batch never fails
//! halfway through planning. Groups form the outer loop, policies the
//! inner loop, so every policy finishes on one dataset group before the
//! next group starts.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::backend::{launch_background, run_foreground};
use crate::error::{OrchestratorError, Result};
use crate::groups::DatasetGroups;
use crate::hosts::{HostTable, ParamOverrides};
use crate::job::{PolicyRegistry, TrainJob};
use crate::jobid;
use crate::monitor::{wait_for_job, DEFAULT_POLL_INTERVAL};
use crate::slurm::{BatchScheduler, SubmitRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Foreground,
    Background,
    Slurm,
}

/// One orchestration request, as assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub policies: Vec<String>,
    pub groups: Vec<String>,
    /// Single explicit dataset id; mutually exclusive with `groups`.
    pub dataset: Option<String>,
    pub host: String,
    pub overrides: ParamOverrides,
    pub push: bool,
    pub backend: Backend,
    /// Wait for each job before launching the next.
    pub blocking: bool,
    pub logs_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub poll_interval: Duration,
}

impl TrainRequest {
    pub fn new(policies: Vec<String>, groups: Vec<String>, host: String) -> Self {
        Self {
            policies,
            groups,
            dataset: None,
            host,
            overrides: ParamOverrides::default(),
            push: false,
            backend: Backend::Foreground,
            blocking: true,
            logs_dir: PathBuf::from("logs"),
            outputs_dir: PathBuf::from("outputs"),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    pub groups: DatasetGroups,
    pub policies: PolicyRegistry,
    pub hosts: HostTable,
}

impl Orchestrator {
    /// Validate the whole request and expand it into ordered jobs.
    ///
    /// Fails on the first unknown policy or group, conflicting selection,
    /// or empty selection, before any side effect.
    pub fn plan(&self, request: &TrainRequest) -> Result<Vec<TrainJob>> {
        if request.policies.is_empty() {
            return Err(OrchestratorError::NoPolicies);
        }
        for policy in &request.policies {
            self.policies.launcher(policy)?;
        }

        let selections: Vec<(String, Vec<String>)> = match (&request.dataset, &request.groups) {
            (Some(_), groups) if !groups.is_empty() => {
                return Err(OrchestratorError::ConflictingSelection(
                    "--dataset and --groups are mutually exclusive".to_string(),
                ));
            }
            (Some(dataset), _) => vec![(dataset.clone(), vec![dataset.clone()])],
            (None, groups) if groups.is_empty() => return Err(OrchestratorError::NoDatasets),
            (None, groups) => groups
                .iter()
                .map(|name| Ok((name.clone(), self.groups.get(name)?.to_vec())))
                .collect::<Result<_>>()?,
        };

        let params = self.hosts.resolve(&request.host, request.overrides);

        let mut jobs = Vec::with_capacity(selections.len() * request.policies.len());
        for (group, datasets) in &selections {
            for policy in &request.policies {
                let job_id = jobid::generate(policy, &request.host, group)?;
                let paths = jobid::paths(&job_id, &request.logs_dir, &request.outputs_dir);
                jobs.push(TrainJob {
                    job_id,
                    policy: policy.clone(),
                    group: group.clone(),
                    datasets: datasets.clone(),
                    params,
                    push: request.push,
                    output_dir: paths.output_dir,
                });
            }
        }
        Ok(jobs)
    }

    /// Plan and launch. Returns once every job is launched, or in
    /// blocking mode once every job has completed. A job's own failure
    /// does not stop the sequence; it is reported at the end.
    pub async fn execute(
        &self,
        request: &TrainRequest,
        scheduler: &dyn BatchScheduler,
    ) -> Result<()> {
        let jobs = self.plan(request)?;
        info!(jobs = jobs.len(), backend = ?request.backend, "launching sequence");

        let mut failed = Vec::new();
        let mut previous_submission: Option<String> = None;

        for job in &jobs {
            let command = job.command(&self.policies)?;
            let paths = jobid::paths(&job.job_id, &request.logs_dir, &request.outputs_dir);
            info!(job = job.job_id, policy = job.policy, group = job.group, "launching");

            match request.backend {
                Backend::Foreground => {
                    let status = run_foreground(&command).await?;
                    if !status.success() {
                        warn!(job = job.job_id, ?status, "job exited non-zero");
                        failed.push(job.job_id.clone());
                    }
                }
                Backend::Background => {
                    let launched = launch_background(&command, &paths.log, &paths.pid).await?;
                    if request.blocking {
                        let outcome =
                            wait_for_job(launched.child, &paths.log, request.poll_interval)
                                .await?;
                        if !outcome.is_success() {
                            failed.push(job.job_id.clone());
                        }
                    }
                }
                Backend::Slurm => {
                    let mut submission =
                        SubmitRequest::new(job.job_id.clone(), command, paths.log.clone());
                    submission.dependency = previous_submission.take();
                    previous_submission = Some(scheduler.submit(&submission)?);
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::JobsFailed {
                failed: failed.len(),
                total: jobs.len(),
                jobs: failed,
            })
        }
    }
}
