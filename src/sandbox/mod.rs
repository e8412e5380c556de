//! Isolation Sandbox Driver
//!
//! Runs untrusted LLM-authored code in an ephemeral, capability-dropped
//! container per call, falling back to an unsandboxed subprocess when no
//! container runtime is available. See Component Design §4.2.

pub mod container;
pub mod subprocess;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Per-stream output cap. Anything beyond this is truncated in place with
/// `TRUNCATION_MARKER` appended and `truncated` set on the result.
pub const OUTPUT_CAP_BYTES: usize = 50_000;
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Environment variables forwarded into the sandbox by explicit allowlist.
pub const FORWARDED_ENV_ALLOWLIST: &[&str] = &["SEARCH_API_KEY", "SEARCH_ENGINE_ID"];

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("container runtime error: {0}")]
    Container(String),

    #[error("subprocess error: {0}")]
    Subprocess(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMethod {
    ContainerStdin,
    ContainerShell,
    SubprocessFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub truncated: bool,
    pub method: SandboxMethod,
}

/// Truncate `buf` to `OUTPUT_CAP_BYTES`, appending the marker, and report
/// whether truncation happened. Operates on valid UTF-8 boundaries.
pub fn cap_stream(buf: &[u8]) -> (String, bool) {
    if buf.len() <= OUTPUT_CAP_BYTES {
        return (String::from_utf8_lossy(buf).into_owned(), false);
    }
    let mut cut = OUTPUT_CAP_BYTES;
    while cut > 0 && !buf.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = String::from_utf8_lossy(&buf[..cut]).into_owned();
    out.push_str(TRUNCATION_MARKER);
    (out, true)
}

fn timeout_result(method: SandboxMethod, timeout: Duration) -> SandboxResult {
    SandboxResult {
        success: false,
        stdout: String::new(),
        stderr: format!("sandbox timed out after {}s", timeout.as_secs()),
        exit_code: -1,
        duration_ms: timeout.as_millis() as u64,
        truncated: false,
        method,
    }
}

/// Driver facade: probes the container runtime once (memoized) and routes
/// every call to the container backend when available, else subprocess.
pub struct SandboxDriver {
    data_dir: PathBuf,
    container_available: OnceCell<bool>,
}

impl SandboxDriver {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir, container_available: OnceCell::new() }
    }

    async fn container_available(&self) -> bool {
        *self
            .container_available
            .get_or_init(|| async { container::probe().await })
            .await
    }

    /// General-purpose scripting runtime. Program text is delivered on the
    /// container's standard input; `packages`, if present, are installed by
    /// a bootstrap prepended ahead of execution, still via stdin.
    pub async fn run_code(
        &self,
        program: &str,
        timeout: Duration,
        packages: &[String],
        network: bool,
    ) -> Result<SandboxResult> {
        if self.container_available().await {
            match container::run_code(program, timeout, packages, network).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    tracing::warn!(error = %err, "container run_code failed, falling back to subprocess");
                }
            }
        } else {
            tracing::warn!("container runtime unavailable, using subprocess fallback");
        }
        subprocess::run_code(&self.data_dir, program, timeout, packages).await
    }

    /// POSIX shell execution.
    pub async fn run_shell(
        &self,
        script: &str,
        base_image: &str,
        timeout: Duration,
        network: bool,
    ) -> Result<SandboxResult> {
        if self.container_available().await {
            match container::run_shell(script, base_image, timeout, network).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    tracing::warn!(error = %err, "container run_shell failed, falling back to subprocess");
                }
            }
        } else {
            tracing::warn!("container runtime unavailable, using subprocess fallback");
        }
        subprocess::run_shell(&self.data_dir, script, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_stream_passes_short_output_through() {
        let (out, truncated) = cap_stream(b"hello");
        assert_eq!(out, "hello");
        assert!(!truncated);
    }

    #[test]
    fn cap_stream_truncates_and_marks_long_output() {
        let long = vec![b'x'; OUTPUT_CAP_BYTES + 100];
        let (out, truncated) = cap_stream(&long);
        assert!(truncated);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.len(), OUTPUT_CAP_BYTES + TRUNCATION_MARKER.len());
    }

    #[test]
    fn cap_stream_exactly_at_cap_is_not_truncated() {
        let exact = vec![b'x'; OUTPUT_CAP_BYTES];
        let (out, truncated) = cap_stream(&exact);
        assert!(!truncated);
        assert_eq!(out.len(), OUTPUT_CAP_BYTES);
    }
}
