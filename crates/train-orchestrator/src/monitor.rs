//! Blocking-wait monitoring for a launched job: process-exit wait joined
//! with fixed-interval polling of the job's log for marker strings.
//!
//! Log markers are the primary completion contract (operators grep for
//! the same strings); the exit status is the fallback when the trainer
//! dies without printing either marker.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Child;
use tracing::{info, warn};

use crate::error::{OrchestratorError, Result};

pub const COMPLETION_MARKERS: [&str; 2] = ["Training completed", "End of training"];
pub const ERROR_MARKERS: [&str; 3] = [
    "Traceback (most recent call last)",
    "CUDA out of memory",
    "RuntimeError",
];

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// How one monitored job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// A completion marker appeared in the log.
    Completed,
    /// An error marker appeared in the log.
    Failed { marker: String },
    /// The process exited without printing either marker.
    Exited { code: i32 },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Exited { code: 0 })
    }
}

/// Incremental scanner over a growing log file.
///
/// Each poll reads only the bytes appended since the last one; a
/// trailing partial line is carried over so a marker split across polls
/// is still seen.
#[derive(Debug)]
pub struct LogWatch {
    path: PathBuf,
    offset: u64,
    carry: String,
}

impl LogWatch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            carry: String::new(),
        }
    }

    /// Scan newly appended log content for markers. A missing file is
    /// not an error; the job may not have written anything yet.
    pub fn poll(&mut self) -> Result<Option<JobOutcome>> {
        let mut file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(OrchestratorError::io(err, &self.path)),
        };
        file.seek(SeekFrom::Start(self.offset))
            .map_err(|err| OrchestratorError::io(err, &self.path))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|err| OrchestratorError::io(err, &self.path))?;
        self.offset += bytes.len() as u64;
        // Trainer output is not guaranteed UTF-8 (progress bars, stray
        // binary); a bad byte must not abort the wait.
        let chunk = String::from_utf8_lossy(&bytes);

        let buffered = std::mem::take(&mut self.carry) + &*chunk;
        let (complete, partial) = match buffered.rfind('\n') {
            Some(last) => buffered.split_at(last + 1),
            None => ("", buffered.as_str()),
        };
        self.carry = partial.to_string();

        for line in complete.lines() {
            if let Some(outcome) = scan_line(line) {
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }

    /// Final scan once the process has exited; the carry is a complete
    /// line now.
    fn finish(&mut self) -> Result<Option<JobOutcome>> {
        if let Some(outcome) = self.poll()? {
            return Ok(Some(outcome));
        }
        Ok(scan_line(&std::mem::take(&mut self.carry)))
    }
}

pub fn scan_line(line: &str) -> Option<JobOutcome> {
    for marker in COMPLETION_MARKERS {
        if line.contains(marker) {
            return Some(JobOutcome::Completed);
        }
    }
    for marker in ERROR_MARKERS {
        if line.contains(marker) {
            return Some(JobOutcome::Failed {
                marker: marker.to_string(),
            });
        }
    }
    None
}

/// Wait for one job: returns as soon as a marker appears or the process
/// exits, whichever the poll observes first.
pub async fn wait_for_job(
    mut child: Child,
    log_path: &Path,
    poll_interval: Duration,
) -> Result<JobOutcome> {
    let mut watch = LogWatch::new(log_path);
    loop {
        if let Some(outcome) = watch.poll()? {
            report(&outcome, log_path);
            return Ok(outcome);
        }
        match child
            .try_wait()
            .map_err(|err| OrchestratorError::io(err, log_path))?
        {
            Some(status) => {
                let outcome = match watch.finish()? {
                    Some(outcome) => outcome,
                    None => JobOutcome::Exited {
                        code: status.code().unwrap_or(-1),
                    },
                };
                report(&outcome, log_path);
                return Ok(outcome);
            }
            None => tokio::time::sleep(poll_interval).await,
        }
    }
}

fn report(outcome: &JobOutcome, log_path: &Path) {
    match outcome {
        JobOutcome::Completed => info!(log = %log_path.display(), "job completed"),
        JobOutcome::Failed { marker } => {
            warn!(log = %log_path.display(), marker, "job failed");
        }
        JobOutcome::Exited { code } => {
            info!(log = %log_path.display(), code, "job exited without marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_marker_ends_wait_with_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "step 99999\nTraining completed in 3:12:44\n").unwrap();
        let mut watch = LogWatch::new(&path);
        let outcome = watch.poll().unwrap().unwrap();
        assert!(outcome.is_success());
    }

    #[test]
    fn error_marker_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "step 100\nCUDA out of memory. Tried to allocate\n").unwrap();
        let mut watch = LogWatch::new(&path);
        let outcome = watch.poll().unwrap().unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                marker: "CUDA out of memory".to_string()
            }
        );
        assert!(!outcome.is_success());
    }

    #[test]
    fn polling_only_reads_appended_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "step 1\nstep 2\n").unwrap();
        let mut watch = LogWatch::new(&path);
        assert_eq!(watch.poll().unwrap(), None);

        let mut existing = std::fs::read_to_string(&path).unwrap();
        existing.push_str("End of training\n");
        std::fs::write(&path, existing).unwrap();
        assert_eq!(watch.poll().unwrap(), Some(JobOutcome::Completed));
    }

    #[test]
    fn non_utf8_bytes_do_not_abort_the_watch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        let mut content = b"\x1b[2K\xff\xfe progress garbage\n".to_vec();
        content.extend_from_slice(b"End of training\n");
        std::fs::write(&path, content).unwrap();
        let mut watch = LogWatch::new(&path);
        assert_eq!(watch.poll().unwrap(), Some(JobOutcome::Completed));
    }

    #[test]
    fn missing_log_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut watch = LogWatch::new(dir.path().join("not-yet.log"));
        assert_eq!(watch.poll().unwrap(), None);
    }

    #[tokio::test]
    async fn wait_uses_exit_status_when_no_marker_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "starting\n").unwrap();
        let child = tokio::process::Command::new("sh")
            .args(["-c", "exit 0"])
            .spawn()
            .unwrap();
        let outcome = wait_for_job(child, &path, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Exited { code: 0 });
        assert!(outcome.is_success());
    }
}
