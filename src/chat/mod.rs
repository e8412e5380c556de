//! Chat Transport: the narrow surface the heartbeat and task engine use to
//! announce themselves and receive commands from a single allowed operator
//! handle. Concrete transports (Telegram today) implement `ChatTransport`.

pub mod telegram;

use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat transport request failed: {0}")]
    Request(String),
    #[error("chat transport not configured")]
    NotConfigured,
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub from_handle: String,
    pub text: String,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<()>;

    /// Long-poll for new messages since the last call. Returns an empty
    /// vec on timeout; never blocks longer than the transport's own poll
    /// interval.
    async fn poll_updates(&mut self) -> Result<Vec<IncomingMessage>>;
}

/// The single command surface the spec names: `/start`, `/status` (and its
/// `/plan` alias), `/cost`, `/evolve`, `/task <text>`. Anything else that
/// isn't a recognized command is treated as `/task <text>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Status,
    Cost,
    Evolve,
    Task(String),
}

pub fn parse_command(text: &str) -> Command {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();
    if lower == "/start" {
        Command::Start
    } else if lower == "/status" || lower == "/plan" {
        Command::Status
    } else if lower == "/cost" {
        Command::Cost
    } else if lower == "/evolve" {
        Command::Evolve
    } else if let Some(rest) = trimmed.strip_prefix("/task") {
        Command::Task(rest.trim().to_string())
    } else {
        Command::Task(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_is_an_alias_for_status() {
        assert_eq!(parse_command("/plan"), Command::Status);
        assert_eq!(parse_command("/status"), Command::Status);
    }

    #[test]
    fn bare_text_becomes_a_task_command() {
        assert_eq!(parse_command("summarize today's logs"), Command::Task("summarize today's logs".to_string()));
    }

    #[test]
    fn task_command_strips_its_own_prefix() {
        assert_eq!(parse_command("/task do the thing"), Command::Task("do the thing".to_string()));
    }
}
