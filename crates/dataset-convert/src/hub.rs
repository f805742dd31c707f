//! Client for the dataset registry (a HuggingFace-style hub).
//!
//! Artifacts are keyed by an `organization/name` repo id. Fetch and
//! publish are the only stages of the conversion pipeline that touch the
//! network, and the only ones wrapped in retries: a re-download or a
//! re-upload of unmodified content is idempotent, a failed transform is
//! a bug.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConvertError, Result};

const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Number of attempts for each network operation (1 initial + retries).
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Raw bytes per commit; base64 adds a third on top, so this also bounds
/// the in-memory request body. Consolidated video files can be larger
/// than this on their own; such a file gets a commit to itself.
const MAX_COMMIT_BYTES: u64 = 128 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HubClient {
    base_url: String,
    client: Client,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

#[derive(Debug, Serialize)]
struct CommitLine<'a> {
    key: &'a str,
    value: serde_json::Value,
}

impl Default for HubClient {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl HubClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    /// List every file in a dataset repo. The tree endpoint pages its
    /// results (a `Link: ...; rel="next"` header points at the next
    /// page), so large repos take several requests.
    pub async fn list_files(&self, repo_id: &str) -> Result<Vec<String>> {
        let mut url = format!(
            "{}/api/datasets/{repo_id}/tree/main?recursive=true",
            self.base_url
        );
        let mut files = Vec::new();
        loop {
            let response = self.authorized(self.client.get(&url)).send().await?;
            let response = check_status(response, &url).await?;
            let next = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_next_link);
            let entries: Vec<TreeEntry> = response.json().await?;
            files.extend(
                entries
                    .into_iter()
                    .filter(|entry| entry.kind == "file")
                    .map(|entry| entry.path),
            );
            match next {
                Some(next) => url = next,
                None => return Ok(files),
            }
        }
    }

    /// Download a full snapshot of a dataset repo into `dest`.
    pub async fn snapshot_download(&self, repo_id: &str, dest: &Path) -> Result<()> {
        let files = with_retry("list files", || self.list_files(repo_id)).await?;
        info!(repo_id, files = files.len(), dest = %dest.display(), "downloading snapshot");
        for file in &files {
            with_retry("download file", || self.download_file(repo_id, file, dest)).await?;
        }
        Ok(())
    }

    /// Stream one file to disk; video files are too large to buffer.
    async fn download_file(&self, repo_id: &str, file: &str, dest: &Path) -> Result<()> {
        use tokio::io::AsyncWriteExt as _;

        let url = format!("{}/datasets/{repo_id}/resolve/main/{file}", self.base_url);
        let response = self.authorized(self.client.get(&url)).send().await?;
        let mut response = check_status(response, &url).await?;

        let target = dest.join(file);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| ConvertError::io(err, parent))?;
        }
        let mut out = tokio::fs::File::create(&target)
            .await
            .map_err(|err| ConvertError::io(err, &target))?;
        let mut bytes: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk)
                .await
                .map_err(|err| ConvertError::io(err, &target))?;
            bytes += chunk.len() as u64;
        }
        out.flush()
            .await
            .map_err(|err| ConvertError::io(err, &target))?;
        debug!(file, bytes, "downloaded");
        Ok(())
    }

    /// Create a dataset repo; an already-existing repo is not an error.
    pub async fn create_repo(&self, repo_id: &str) -> Result<()> {
        let (organization, name) = repo_id.split_once('/').unwrap_or(("", repo_id));
        let url = format!("{}/api/repos/create", self.base_url);
        let mut body = serde_json::json!({ "type": "dataset", "name": name });
        if !organization.is_empty() {
            body["organization"] = serde_json::Value::String(organization.to_string());
        }
        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            debug!(repo_id, "repo already exists");
            return Ok(());
        }
        check_status(response, &url).await?;
        info!(repo_id, "created dataset repo");
        Ok(())
    }

    /// Upload every file under `folder`, split into size-bounded commits
    /// so the commit body never has to hold the whole dataset.
    pub async fn upload_folder(
        &self,
        repo_id: &str,
        folder: &Path,
        commit_message: &str,
    ) -> Result<()> {
        let files = collect_files(folder)?;
        let batches = plan_batches(&files, MAX_COMMIT_BYTES)?;
        info!(
            repo_id,
            files = files.len(),
            commits = batches.len(),
            "uploading folder"
        );

        let url = format!("{}/api/datasets/{repo_id}/commit/main", self.base_url);
        let total = batches.len();
        for (number, batch) in batches.iter().enumerate() {
            let summary = if total == 1 {
                commit_message.to_string()
            } else {
                format!("{commit_message} (part {}/{total})", number + 1)
            };
            let body = render_commit(folder, batch, &summary).await?;
            let send = || async {
                let response = self
                    .authorized(self.client.post(&url))
                    .header("Content-Type", "application/x-ndjson")
                    .body(body.clone())
                    .send()
                    .await?;
                check_status(response, &url).await?;
                Ok(())
            };
            with_retry("upload commit", send).await?;
            debug!(repo_id, files = batch.len(), %summary, "commit pushed");
        }
        info!(repo_id, "upload complete");
        Ok(())
    }
}

/// Group files into commits whose raw sizes stay under `limit`. Order is
/// preserved; a file larger than the limit forms a commit by itself.
fn plan_batches(files: &[PathBuf], limit: u64) -> Result<Vec<Vec<PathBuf>>> {
    let mut batches = Vec::new();
    let mut current: Vec<PathBuf> = Vec::new();
    let mut current_bytes: u64 = 0;
    for file in files {
        let size = std::fs::metadata(file)
            .map_err(|err| ConvertError::io(err, file))?
            .len();
        if !current.is_empty() && current_bytes + size > limit {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current.push(file.clone());
        current_bytes += size;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    Ok(batches)
}

/// Render the NDJSON body for one commit.
async fn render_commit(folder: &Path, files: &[PathBuf], summary: &str) -> Result<String> {
    let mut lines = Vec::with_capacity(files.len() + 1);
    lines.push(serde_json::to_string(&CommitLine {
        key: "header",
        value: serde_json::json!({ "summary": summary }),
    })?);
    for file in files {
        let contents = tokio::fs::read(file)
            .await
            .map_err(|err| ConvertError::io(err, file))?;
        let relative = file
            .strip_prefix(folder)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/");
        lines.push(serde_json::to_string(&CommitLine {
            key: "file",
            value: serde_json::json!({
                "path": relative,
                "content": base64::engine::general_purpose::STANDARD.encode(&contents),
                "encoding": "base64",
            }),
        })?);
    }
    Ok(lines.join("\n"))
}

/// Pull the `rel="next"` target out of an RFC 5988 `Link` header.
fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.contains(r#"rel="next""#) {
            return None;
        }
        let target = target.trim();
        Some(target.strip_prefix('<')?.strip_suffix('>')?.to_string())
    })
}

async fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ConvertError::HubStatus {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

/// Retry an idempotent network operation with exponential backoff.
async fn with_retry<T, F, Fut>(operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < RETRY_ATTEMPTS && is_transient(&err) => {
                warn!(operation, attempt, %err, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Network-level failures and server errors are worth retrying; client
/// errors (bad repo id, missing auth) are not.
fn is_transient(err: &ConvertError) -> bool {
    match err {
        ConvertError::Http(_) => true,
        ConvertError::HubStatus { status, .. } => *status >= 500 || *status == 429,
        _ => false,
    }
}

fn collect_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![folder.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries =
            std::fs::read_dir(&current).map_err(|err| ConvertError::io(err, &current))?;
        for entry in entries {
            let entry = entry.map_err(|err| ConvertError::io(err, &current))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(is_transient(&ConvertError::HubStatus {
            status: 503,
            url: String::new(),
            body: String::new(),
        }));
        assert!(is_transient(&ConvertError::HubStatus {
            status: 429,
            url: String::new(),
            body: String::new(),
        }));
        assert!(!is_transient(&ConvertError::HubStatus {
            status: 404,
            url: String::new(),
            body: String::new(),
        }));
        assert!(!is_transient(&ConvertError::ToolMissing("ffmpeg".into())));
    }

    #[test]
    fn collect_files_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("meta")).unwrap();
        std::fs::write(dir.path().join("meta/info.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("README.md"), b"#").unwrap();
        let files = collect_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("README.md"));
        assert!(files[1].ends_with("meta/info.json"));
    }

    #[test]
    fn batches_stay_under_size_limit_and_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let c = dir.path().join("c.bin");
        std::fs::write(&a, vec![0u8; 10]).unwrap();
        std::fs::write(&b, vec![0u8; 10]).unwrap();
        std::fs::write(&c, vec![0u8; 10]).unwrap();

        let batches = plan_batches(&[a.clone(), b.clone(), c.clone()], 25).unwrap();
        assert_eq!(batches, vec![vec![a, b], vec![c]]);
    }

    #[test]
    fn oversized_file_gets_a_commit_to_itself() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("meta.json");
        let large = dir.path().join("video.mp4");
        let tail = dir.path().join("tail.json");
        std::fs::write(&small, vec![0u8; 4]).unwrap();
        std::fs::write(&large, vec![0u8; 100]).unwrap();
        std::fs::write(&tail, vec![0u8; 4]).unwrap();

        let batches =
            plan_batches(&[small.clone(), large.clone(), tail.clone()], 25).unwrap();
        assert_eq!(batches, vec![vec![small], vec![large], vec![tail]]);
    }

    #[test]
    fn next_page_link_is_extracted() {
        let header = concat!(
            "<https://huggingface.co/api/datasets/org/x/tree/main",
            "?recursive=true&cursor=abc>; rel=\"next\""
        );
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some(concat!(
                "https://huggingface.co/api/datasets/org/x/tree/main",
                "?recursive=true&cursor=abc"
            ))
        );
        assert_eq!(parse_next_link("<https://x>; rel=\"prev\""), None);
        assert_eq!(parse_next_link(""), None);
    }

    #[test]
    fn commit_lines_are_valid_ndjson() {
        let line = serde_json::to_string(&CommitLine {
            key: "header",
            value: serde_json::json!({ "summary": "converted" }),
        })
        .unwrap();
        assert!(line.contains("\"key\":\"header\""));
        assert!(!line.contains('\n'));
    }
}
