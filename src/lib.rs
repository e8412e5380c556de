//! Cradle: a self-modifying agent daemon.
//!
//! This library provides the core functionality shared by the binary and
//! the integration tests: configuration, the LLM router, the isolation
//! sandbox, the task engine, the memory port, the repo client, the
//! self-evolution engine, the chat transport, and the heartbeat scheduler
//! that ties them together.

/// Configuration management module
pub mod config;

/// Secret redaction and log scrubbing
pub mod secrets;

/// Top-level error type
pub mod error;

/// Telemetry and observability
pub mod telemetry;

/// LLM provider abstraction and router
pub mod llm;

/// Isolation sandbox driver
pub mod sandbox;

/// Task engine (ReAct loop)
pub mod task;

/// Memory port abstraction
pub mod memory;

/// Repo client for self-evolution pushes
pub mod repo;

/// Self-evolution engine
pub mod evolver;

/// Chat transport abstraction
pub mod chat;

/// Persisted runtime state
pub mod state;

/// Heartbeat scheduler
pub mod heartbeat;

pub use error::CradleError;
