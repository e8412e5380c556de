//! Repo Client: the minimal content-addressed git-host REST surface the
//! evolver needs. Opaque to the wider system beyond the operations below.
//! See Component Design §4.4.

use crate::secrets::SecretString;
use base64::Engine as _;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repo request failed: {0}")]
    Request(String),
    #[error("repo not configured")]
    NotConfigured,
}

const REPO_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RepoClient {
    base_url: String,
    token: SecretString,
    org: String,
    repo: String,
    client: reqwest::Client,
}

impl RepoClient {
    pub fn new(token: SecretString, org: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            token,
            org: org.into(),
            repo: repo.into(),
            client: reqwest::Client::new(),
        }
    }

    fn repo_path(&self, suffix: &str) -> String {
        format!("{}/repos/{}/{}/{suffix}", self.base_url, self.org, self.repo)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(reqwest::StatusCode, serde_json::Value)> {
        let mut req = self
            .client
            .request(method, path)
            .timeout(REPO_CALL_TIMEOUT)
            .bearer_auth(self.token.unsecure())
            .header("User-Agent", "cradle-agent");
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| RepoError::Request(e.to_string()))?;
        let status = response.status();
        let data = response.json().await.unwrap_or(serde_json::Value::Null);
        Ok((status, data))
    }

    /// Creates the repository if it does not already exist. Idempotent.
    pub async fn ensure_repo(&self) -> Result<()> {
        let (status, _) = self.request(reqwest::Method::GET, &self.repo_path(""), None).await?;
        if status == reqwest::StatusCode::NOT_FOUND {
            let (status, data) = self
                .request(
                    reqwest::Method::POST,
                    &format!("{}/orgs/{}/repos", self.base_url, self.org),
                    Some(json!({ "name": self.repo, "private": true })),
                )
                .await?;
            if !status.is_success() {
                return Err(RepoError::Request(format!("create repo failed: {data}")));
            }
        }
        Ok(())
    }

    /// The repository's default branch name (e.g. `"main"`).
    pub async fn default_branch(&self) -> Result<String> {
        let (status, data) = self.request(reqwest::Method::GET, &self.repo_path(""), None).await?;
        if !status.is_success() {
            return Err(RepoError::Request(format!("default_branch failed: {data}")));
        }
        Ok(data
            .get("default_branch")
            .and_then(|v| v.as_str())
            .unwrap_or("main")
            .to_string())
    }

    /// Number of commits `branch` is ahead of `local_sha`, i.e. how many
    /// commits the local checkout is behind the given branch. Uses GitHub's
    /// compare API: `GET /repos/{org}/{repo}/compare/{base}...{head}`.
    pub async fn commits_behind(&self, local_sha: &str, branch: &str) -> Result<u64> {
        let url = self.repo_path(&format!("compare/{local_sha}...{branch}"));
        let (status, data) = self.request(reqwest::Method::GET, &url, None).await?;
        if !status.is_success() {
            return Err(RepoError::Request(format!("commits_behind failed: {data}")));
        }
        Ok(data.get("ahead_by").and_then(|v| v.as_u64()).unwrap_or(0))
    }

    /// Returns `(content, blob_sha)` for `path` at `git_ref`, or `None` if missing.
    pub async fn read_file(&self, path: &str, git_ref: &str) -> Result<Option<(String, String)>> {
        let url = format!("{}?ref={git_ref}", self.repo_path(&format!("contents/{path}")));
        let (status, data) = self.request(reqwest::Method::GET, &url, None).await?;
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RepoError::Request(format!("read_file failed: {data}")));
        }
        let sha = data.get("sha").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let encoded = data.get("content").and_then(|v| v.as_str()).unwrap_or_default();
        let decoded_bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.replace('\n', ""))
            .map_err(|e| RepoError::Request(format!("content was not valid base64: {e}")))?;
        let decoded = String::from_utf8_lossy(&decoded_bytes).into_owned();
        Ok(Some((decoded, sha)))
    }

    /// Content-addressed write: `prev_sha` present means update, absent means create.
    pub async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        prev_sha: Option<&str>,
    ) -> Result<String> {
        let mut body = json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
            "branch": branch,
        });
        if let Some(sha) = prev_sha {
            body["sha"] = json!(sha);
        }
        let (status, data) = self
            .request(reqwest::Method::PUT, &self.repo_path(&format!("contents/{path}")), Some(body))
            .await?;
        if !status.is_success() {
            return Err(RepoError::Request(format!("put_file failed: {data}")));
        }
        Ok(data
            .get("content")
            .and_then(|c| c.get("sha"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// Not an error if the branch already exists.
    pub async fn create_branch(&self, new: &str, from: &str) -> Result<()> {
        let (_, from_ref) = self
            .request(reqwest::Method::GET, &self.repo_path(&format!("git/ref/heads/{from}")), None)
            .await?;
        let sha = from_ref
            .get("object")
            .and_then(|o| o.get("sha"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let (status, data) = self
            .request(
                reqwest::Method::POST,
                &self.repo_path("git/refs"),
                Some(json!({ "ref": format!("refs/heads/{new}"), "sha": sha })),
            )
            .await?;

        if status.is_success() || already_exists(&data) {
            return Ok(());
        }
        Err(RepoError::Request(format!("create_branch failed: {data}")))
    }

    /// Not an error if already up to date.
    pub async fn merge(&self, head: &str, base: &str, message: &str) -> Result<()> {
        let (status, data) = self
            .request(
                reqwest::Method::POST,
                &self.repo_path("merges"),
                Some(json!({ "base": base, "head": head, "commit_message": message })),
            )
            .await?;
        if status.is_success() || status == reqwest::StatusCode::NO_CONTENT || already_up_to_date(&data) {
            return Ok(());
        }
        Err(RepoError::Request(format!("merge failed: {data}")))
    }

    pub async fn delete_branch(&self, name: &str) -> Result<()> {
        let (status, data) = self
            .request(
                reqwest::Method::DELETE,
                &self.repo_path(&format!("git/refs/heads/{name}")),
                None,
            )
            .await?;
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(RepoError::Request(format!("delete_branch failed: {data}")))
    }

    /// Reads the current blob SHA per path (if any) and issues one
    /// content-addressed write per file.
    pub async fn push_files(
        &self,
        files: &HashMap<String, String>,
        branch: &str,
        message: &str,
    ) -> Result<()> {
        for (path, content) in files {
            let prev_sha = self.read_file(path, branch).await?.map(|(_, sha)| sha);
            self.put_file(path, content, message, branch, prev_sha.as_deref()).await?;
        }
        Ok(())
    }
}

fn already_exists(data: &serde_json::Value) -> bool {
    data.get("message")
        .and_then(|m| m.as_str())
        .map(|m| m.to_lowercase().contains("already exists"))
        .unwrap_or(false)
}

fn already_up_to_date(data: &serde_json::Value) -> bool {
    data.get("message")
        .and_then(|m| m.as_str())
        .map(|m| m.to_lowercase().contains("already"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_detects_github_message() {
        let data = json!({ "message": "Reference already exists" });
        assert!(already_exists(&data));
    }
}
