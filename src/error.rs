//! Crate-wide error type.
//!
//! Every subsystem returns its own error where it needs specific variants
//! (see `llm::LLMError`, `sandbox::SandboxError`, `repo::RepoError`); this
//! type is the common currency at the boundaries the heartbeat and CLI
//! operate on.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CradleError>;

#[derive(Debug, Error)]
pub enum CradleError {
    #[error("router error: {0}")]
    Router(#[from] crate::llm::LLMError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] crate::sandbox::SandboxError),

    #[error("repo error: {0}")]
    Repo(#[from] crate::repo::RepoError),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl CradleError {
    /// Whether the heartbeat loop may log-and-continue after this error.
    /// Per the error handling policy, this is always true — the loop
    /// never crashes on a subsystem error, only on an explicit exit-42.
    pub fn is_recoverable(&self) -> bool {
        true
    }
}
