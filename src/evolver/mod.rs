//! Self-Evolution Engine
//!
//! Snapshots the agent's own source tree, asks the LLM Router for a single
//! proposed file change, tests it in the sandbox, and pushes it through the
//! Repo Client. A fully successful evolution exits the process with status
//! 42 so a supervisor can pull the merged change and restart. See Component
//! Design §4.5.

use crate::llm::router::LLMRouter;
use crate::memory::MemoryPort;
use crate::repo::RepoClient;
use crate::sandbox::SandboxDriver;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Files that must never be the target of a proposed change, whether named
/// bare or with the source-directory prefix. Covers the entry point, the
/// config loader, and the evolver itself.
const PROTECTED_FILES: &[&str] = &[
    "main.rs",
    "src/main.rs",
    "config.rs",
    "src/config.rs",
    "evolver/mod.rs",
    "src/evolver/mod.rs",
    "Dockerfile",
    "supervisor.sh",
];

const SANDBOX_TEST_TIMEOUT: Duration = Duration::from_secs(30);

const PROPOSAL_SYSTEM_PROMPT: &str = "You are proposing exactly one self-improvement to your own \
    source tree. Pick a single existing file and a focused, low-to-medium risk change. Respond \
    with exactly one JSON object: \
    {\"path\":str,\"content\":str,\"summary\":str,\"test_code\":str|null}. \
    `path` is relative to the repository root. `content` is the complete new file contents. \
    `test_code` is optional Python or shell to sanity-check the change in isolation; omit it if \
    the change cannot be meaningfully smoke-tested outside the full build.";

#[derive(Debug, Deserialize)]
struct Proposal {
    path: String,
    content: String,
    summary: String,
    #[serde(default)]
    test_code: Option<String>,
}

pub struct Evolver {
    router: Arc<LLMRouter>,
    sandbox: Arc<SandboxDriver>,
    repo: RepoClient,
    memory: Arc<dyn MemoryPort>,
    source_root: PathBuf,
    evolution_count: u64,
}

impl Evolver {
    pub fn new(
        router: Arc<LLMRouter>,
        sandbox: Arc<SandboxDriver>,
        repo: RepoClient,
        memory: Arc<dyn MemoryPort>,
        source_root: PathBuf,
    ) -> Self {
        Self { router, sandbox, repo, memory, source_root, evolution_count: 0 }
    }

    /// Run one full evolution attempt, returning a human-readable summary.
    /// Never panics; every failure path is folded into the summary string.
    pub async fn evolve(&mut self) -> String {
        self.evolution_count += 1;
        let branch = format!("evolve-{}-{}", self.evolution_count, unix_time());

        let snapshot = match self.snapshot_source() {
            Ok(snapshot) => snapshot,
            Err(err) => return format!("evolution aborted: could not snapshot source: {err}"),
        };

        let prompt = format!(
            "Current source tree (path -> content, truncated to 4000 chars each):\n\n{}",
            render_snapshot(&snapshot)
        );

        let response = match self
            .router
            .complete(&prompt, Some(PROPOSAL_SYSTEM_PROMPT), None, 0.4, 4096)
            .await
        {
            Ok(response) => response,
            Err(err) => return format!("evolution aborted: router exhausted: {err}"),
        };

        let proposal = match extract_proposal(&response.content) {
            Some(proposal) => proposal,
            None => return "evolution aborted: could not parse a proposal from the LLM response".to_string(),
        };

        if is_protected(&proposal.path) {
            return format!("evolution rejected: {} is a protected file", proposal.path);
        }

        if let Some(test_code) = &proposal.test_code {
            let result = self
                .sandbox
                .run_code(test_code, SANDBOX_TEST_TIMEOUT, &[], false)
                .await;
            match result {
                Ok(result) if !result.success => {
                    let record = format!(
                        "proposal for {} rejected: sandbox test failed (exit {}): {}",
                        proposal.path, result.exit_code, result.stderr
                    );
                    if let Err(err) = self
                        .memory
                        .write_memory(&format!("evolution-failure:{}", self.evolution_count), &record)
                        .await
                    {
                        tracing::warn!(error = %err, "failed to persist evolution failure memory");
                    }
                    return format!(
                        "evolution rejected: sandbox test failed (exit {}): {}",
                        result.exit_code, result.stderr
                    );
                }
                Err(err) => {
                    return format!("evolution rejected: sandbox test could not run: {err}");
                }
                Ok(_) => {}
            }
        }

        if let Err(err) = self.repo.create_branch(&branch, "main").await {
            return format!("evolution aborted: could not create branch: {err}");
        }

        let mut files = HashMap::new();
        files.insert(proposal.path.clone(), proposal.content.clone());
        if let Err(err) = self
            .repo
            .push_files(&files, &branch, &format!("self-evolution: {}", proposal.summary))
            .await
        {
            let _ = self.repo.delete_branch(&branch).await;
            return format!("evolution aborted: push failed: {err}");
        }

        if let Err(err) = self
            .repo
            .merge(&branch, "main", &format!("merge evolution {branch}"))
            .await
        {
            let _ = self.repo.delete_branch(&branch).await;
            return format!("evolution aborted: merge failed: {err}");
        }

        let _ = self.repo.delete_branch(&branch).await;

        let record = format!("merged {} to {}: {}", proposal.path, branch, proposal.summary);
        if let Err(err) = self
            .memory
            .write_memory(&format!("evolution:{}", self.evolution_count), &record)
            .await
        {
            tracing::warn!(error = %err, "failed to persist evolution success memory");
        }

        tracing::info!(path = %proposal.path, summary = %proposal.summary, "self-evolution merged, requesting restart");
        format!("evolution succeeded: {} ({})", proposal.path, proposal.summary)
    }

    fn snapshot_source(&self) -> std::io::Result<HashMap<String, String>> {
        let mut snapshot = HashMap::new();
        let src_dir = self.source_root.join("src");
        if src_dir.is_dir() {
            collect_rust_files(&src_dir, &self.source_root, &mut snapshot)?;
        }
        for root_file in ["Cargo.toml", "DESIGN.md"] {
            let path = self.source_root.join(root_file);
            if let Ok(content) = std::fs::read_to_string(&path) {
                snapshot.insert(root_file.to_string(), content);
            }
        }
        Ok(snapshot)
    }
}

fn collect_rust_files(
    dir: &Path,
    root: &Path,
    out: &mut HashMap<String, String>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, root, out)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            if let (Ok(rel), Ok(content)) = (path.strip_prefix(root), std::fs::read_to_string(&path)) {
                out.insert(rel.to_string_lossy().replace('\\', "/"), content);
            }
        }
    }
    Ok(())
}

fn render_snapshot(snapshot: &HashMap<String, String>) -> String {
    let mut entries: Vec<_> = snapshot.iter().collect();
    entries.sort_by_key(|(path, _)| path.clone());
    entries
        .iter()
        .map(|(path, content)| {
            let truncated = if content.len() > 4000 { &content[..4000] } else { content.as_str() };
            format!("--- {path} ---\n{truncated}\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_protected(path: &str) -> bool {
    PROTECTED_FILES.iter().any(|protected| path == *protected || path.ends_with(&format!("/{protected}")))
}

fn extract_proposal(content: &str) -> Option<Proposal> {
    let trimmed = content.trim();
    if let Ok(proposal) = serde_json::from_str(trimmed) {
        return Some(proposal);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Process exit status that signals a supervisor to pull the merged branch
/// and restart the process.
pub const RESTART_EXIT_CODE: i32 = 42;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_files_rejected_bare_and_prefixed() {
        assert!(is_protected("main.rs"));
        assert!(is_protected("src/main.rs"));
        assert!(is_protected("cradle/src/main.rs"));
        assert!(!is_protected("src/task/mod.rs"));
    }

    #[test]
    fn extract_proposal_handles_prose_wrapped_json() {
        let text = "Here is my proposal:\n{\"path\":\"src/task/skills.rs\",\"content\":\"x\",\"summary\":\"s\"}\nthanks";
        let proposal = extract_proposal(text).unwrap();
        assert_eq!(proposal.path, "src/task/skills.rs");
        assert!(proposal.test_code.is_none());
    }

    #[test]
    fn extract_proposal_returns_none_on_garbage() {
        assert!(extract_proposal("not json").is_none());
    }
}
