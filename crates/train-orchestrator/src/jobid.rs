//! Job identity generation.
//!
//! One identity names one training invocation and derives its log file,
//! PID file, and checkpoint directory. The timestamp is second
//! resolution; the random suffix keeps identities unique when the
//! sequencing loop launches several jobs within the same second.

use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::Result;

/// Paths derived from a job identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub log: PathBuf,
    pub pid: PathBuf,
    pub output_dir: PathBuf,
}

/// `{policy}_{host}_{group}_{timestamp}_{suffix}`, all parts sanitized.
pub fn generate(policy: &str, host: &str, group: &str) -> Result<String> {
    let timestamp = OffsetDateTime::now_utc().format(&format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let suffix: String = uuid::Uuid::new_v4().simple().to_string()[..4].to_string();
    Ok(format!(
        "{}_{}_{}_{timestamp}_{suffix}",
        sanitize(policy),
        sanitize(host),
        sanitize(group)
    ))
}

/// Replace everything outside `[A-Za-z0-9]` with `_` so the identity is
/// safe as a file name and a scheduler job name.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn paths(job_id: &str, logs_dir: &Path, outputs_dir: &Path) -> JobPaths {
    JobPaths {
        log: logs_dir.join(format!("{job_id}.log")),
        pid: logs_dir.join(format!("{job_id}.pid")),
        output_dir: outputs_dir.join(job_id),
    }
}
