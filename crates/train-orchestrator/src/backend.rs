//! Process-launch backends: foreground (inherit the terminal) and
//! background (detached, output to a per-job log, PID persisted).
//!
//! The orchestrator's only concurrency primitive is "spawn a child and
//! optionally wait"; nothing is shared with a launched job beyond the
//! file system.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::info;

use crate::error::{OrchestratorError, Result};

/// A detached training job.
///
/// Dropping the handle does not kill the child; the PID file is the
/// durable record for later lookup or cancellation.
#[derive(Debug)]
pub struct BackgroundJob {
    pub pid: u32,
    pub child: Child,
    pub log_path: PathBuf,
    pub pid_path: PathBuf,
}

/// Run a job synchronously, inheriting the caller's terminal.
pub async fn run_foreground(command: &[String]) -> Result<ExitStatus> {
    let (program, args) = split_command(command)?;
    info!(program, "launching in foreground");
    Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|err| spawn_error(err, program))
}

/// Spawn a job detached, with stdout and stderr appended to `log_path`
/// and the child's PID written to `pid_path`.
pub async fn launch_background(
    command: &[String],
    log_path: &Path,
    pid_path: &Path,
) -> Result<BackgroundJob> {
    let (program, args) = split_command(command)?;
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| OrchestratorError::io(err, parent))?;
    }
    let log = std::fs::File::create(log_path)
        .map_err(|err| OrchestratorError::io(err, log_path))?;
    let log_err = log
        .try_clone()
        .map_err(|err| OrchestratorError::io(err, log_path))?;

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()
        .map_err(|err| spawn_error(err, program))?;

    let pid = child.id().unwrap_or(0);
    std::fs::write(pid_path, format!("{pid}\n"))
        .map_err(|err| OrchestratorError::io(err, pid_path))?;
    info!(pid, log = %log_path.display(), "launched in background");

    Ok(BackgroundJob {
        pid,
        child,
        log_path: log_path.to_owned(),
        pid_path: pid_path.to_owned(),
    })
}

fn split_command(command: &[String]) -> Result<(&String, &[String])> {
    command
        .split_first()
        .ok_or_else(|| OrchestratorError::ToolMissing("trainer command".to_string()))
}

fn spawn_error(err: std::io::Error, program: &str) -> OrchestratorError {
    if err.kind() == std::io::ErrorKind::NotFound {
        OrchestratorError::ToolMissing(program.to_string())
    } else {
        OrchestratorError::io(err, program)
    }
}
