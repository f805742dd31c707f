//! train-orchestrator: policy-training launch and sequencing
//!
//! Resolves a symbolic policy/dataset-group selection into fully
//! parameterized trainer invocations, generates per-job identities
//! (log/PID/checkpoint paths derive from them), and sequences the jobs
//! through one of three backends: foreground, detached background, or a
//! batch scheduler. Training itself is an external process; the
//! orchestrator only launches and observes it.

mod error;
pub use error::{OrchestratorError, Result};

pub mod backend;
pub mod groups;
pub mod hosts;
pub mod job;
pub mod jobid;
pub mod monitor;
pub mod sequence;
pub mod slurm;

pub use groups::DatasetGroups;
pub use hosts::{HostTable, ParamOverrides, TrainParams};
pub use job::{PolicyRegistry, TrainJob};
pub use monitor::JobOutcome;
pub use sequence::{Backend, Orchestrator, TrainRequest};
pub use slurm::{BatchScheduler, SlurmScheduler, SubmitRequest};
