//! Heartbeat: a single-threaded scheduler that multiplexes task processing,
//! idle work, persistence, self-evolution, and repo sync on one tick
//! cadence. See Component Design §4.6.

use crate::chat::{ChatTransport, Command};
use crate::evolver::{Evolver, RESTART_EXIT_CODE};
use crate::memory::MemoryPort;
use crate::repo::RepoClient;
use crate::state::{claim_first_boot, PersistedState, TaskSummary};
use crate::task::{TaskEngine, TaskSource};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const TASKS_PER_BEAT: usize = 3;
const IDLE_SEED_EVERY: u64 = 20;
const IDLE_SEED_AFTER_BEAT: u64 = 5;
const FIRST_EVOLUTION_BEAT: u64 = 20;
const EVOLUTION_EVERY: u64 = 50;
const PERSIST_EVERY: u64 = 5;
const SKILL_REFRESH_EVERY: u64 = 10;
const REPO_SYNC_EVERY: u64 = 20;
const MEMORY_PERSIST_EVERY: u64 = 100;
const LOG_EVERY: u64 = 5;

/// Round-robin idle-work seeds used when nothing else is pending.
const IDLE_TASK_TEMPLATES: &[(&str, &str)] = &[
    ("review recent reflections", "Scan the most recent task reflections for a recurring failure pattern."),
    ("tidy skill notes", "Check whether any built-in skill text is stale given recent task outcomes."),
    ("propose a small improvement", "Look for one small, safe improvement to make to your own source."),
];

pub struct Heartbeat {
    engine: TaskEngine,
    evolver: Option<Evolver>,
    repo: Option<RepoClient>,
    chat: Option<Box<dyn ChatTransport>>,
    memory: Arc<dyn MemoryPort>,
    data_dir: PathBuf,
    interval: Duration,
    state: PersistedState,
    idle_template_index: usize,
}

pub enum TickResult {
    Continue,
    Restart,
}

impl Heartbeat {
    pub fn new(
        engine: TaskEngine,
        evolver: Option<Evolver>,
        repo: Option<RepoClient>,
        chat: Option<Box<dyn ChatTransport>>,
        memory: Arc<dyn MemoryPort>,
        data_dir: PathBuf,
        interval: Duration,
    ) -> Self {
        let state = PersistedState::load_or_default(&data_dir);
        Self { engine, evolver, repo, chat, memory, data_dir, interval, state, idle_template_index: 0 }
    }

    /// Startup-time side effects: best-effort chat announcement and
    /// first-ever-boot bootstrap task seeding.
    pub async fn on_startup(&mut self) {
        if let Some(chat) = &self.chat {
            if let Err(err) = chat.send_message("cradle is online").await {
                tracing::warn!(error = %err, "startup chat announcement failed");
            }
        }

        if claim_first_boot(&self.data_dir) {
            tracing::info!("first boot detected, seeding bootstrap task");
            self.engine.add_task(
                "bootstrap masterplan",
                "This is the first time you have run. Write a short masterplan for what to \
                 work on next and store it under the 'masterplan' canvas slug.",
                None,
                TaskSource::Bootstrap,
            );
        }
    }

    /// Run the process forever, one tick per `interval`, until a restart is
    /// requested (self-evolution merged, or a repo sync found upstream
    /// ahead) or the caller's cancellation signal fires.
    pub async fn run_until_restart(&mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> TickResult {
        self.on_startup().await;
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let TickResult::Restart = self.tick().await {
                        return TickResult::Restart;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("heartbeat received shutdown signal, persisting state and exiting");
                        self.persist_state();
                        return TickResult::Continue;
                    }
                }
            }
        }
    }

    async fn tick(&mut self) -> TickResult {
        self.state.beat_count += 1;
        let beat = self.state.beat_count;

        if self.drain_tasks().await {
            return TickResult::Restart;
        }

        if beat % IDLE_SEED_EVERY == 0 && beat > IDLE_SEED_AFTER_BEAT {
            self.seed_idle_work();
        }

        if beat == FIRST_EVOLUTION_BEAT || (beat > FIRST_EVOLUTION_BEAT && beat % EVOLUTION_EVERY == 0) {
            if self.run_evolution().await {
                return TickResult::Restart;
            }
        }

        if beat % PERSIST_EVERY == 0 {
            self.persist_state();
        }

        if beat % SKILL_REFRESH_EVERY == 0 {
            self.refresh_skills().await;
        }

        if beat % REPO_SYNC_EVERY == 0 && self.engine.pending_count() == 0 && self.sync_repo().await {
            return TickResult::Restart;
        }

        if beat % MEMORY_PERSIST_EVERY == 0 {
            self.persist_memory_summary().await;
        }

        if beat % LOG_EVERY == 0 {
            tracing::info!(
                beat,
                pending = self.engine.pending_count(),
                total = self.engine.total_count(),
                evolutions = self.state.evolution_count,
                "heartbeat tick"
            );
        }

        self.drain_chat_commands().await;

        TickResult::Continue
    }

    /// Drains up to `TASKS_PER_BEAT` tasks, returning `true` if any of them
    /// reported a self-update push that requires a supervised restart.
    async fn drain_tasks(&mut self) -> bool {
        let mut restart_requested = false;
        for _ in 0..TASKS_PER_BEAT {
            let Some(outcome) = self.engine.process_next().await else { break };

            if outcome.task.status.is_terminal() {
                if let Some(chat) = &self.chat {
                    let text = match &outcome.task.result {
                        Some(result) => format!("task '{}' completed: {}", outcome.task.title, result),
                        None => format!(
                            "task '{}' failed: {}",
                            outcome.task.title,
                            outcome.task.error.as_deref().unwrap_or("unknown error")
                        ),
                    };
                    if let Err(err) = chat.send_message(&text).await {
                        tracing::warn!(error = %err, "task completion notification failed");
                    }
                }

                if outcome.task.status == crate::task::TaskStatus::Failed
                    && outcome.task.source != TaskSource::SelfHealing
                {
                    self.engine.add_task(
                        format!("self-heal: {}", outcome.task.title),
                        format!(
                            "A prior attempt at '{}' failed with: {}. Diagnose and try a different approach.",
                            outcome.task.title,
                            outcome.task.error.as_deref().unwrap_or("unknown error")
                        ),
                        None,
                        TaskSource::SelfHealing,
                    );
                }
            }

            if outcome.requested_restart {
                tracing::info!("task reported a pushed self-update, requesting restart");
                restart_requested = true;
            }
        }
        restart_requested
    }

    fn seed_idle_work(&mut self) {
        if self.engine.pending_count() > 0 {
            return;
        }
        let (title, description) = IDLE_TASK_TEMPLATES[self.idle_template_index % IDLE_TASK_TEMPLATES.len()];
        self.idle_template_index += 1;
        self.engine.add_task(title, description, None, TaskSource::SelfSeed);
    }

    async fn run_evolution(&mut self) -> bool {
        let Some(evolver) = &mut self.evolver else {
            return false;
        };
        let summary = evolver.evolve().await;
        self.state.evolution_count += 1;
        tracing::info!(summary = %summary, "self-evolution attempt finished");

        if let Some(chat) = &self.chat {
            let _ = chat.send_message(&format!("evolution attempt: {summary}")).await;
        }

        if summary.starts_with("evolution succeeded") {
            self.persist_state();
            std::process::exit(RESTART_EXIT_CODE);
        }
        false
    }

    fn persist_state(&mut self) {
        self.state.tasks = self
            .engine
            .snapshot()
            .iter()
            .map(|(id, task)| (id.clone(), TaskSummary::from(task)))
            .collect();
        if let Err(err) = self.state.persist(&self.data_dir) {
            tracing::warn!(error = %err, "failed to persist heartbeat state");
        }
    }

    async fn refresh_skills(&mut self) {
        if let Err(err) = self.memory.list_skills().await {
            tracing::debug!(error = %err, "skill refresh skipped, memory unavailable");
        }
    }

    /// Returns `true` if the local checkout is behind upstream, meaning the
    /// caller should restart after a supervisor pull. Only meaningful to
    /// call when the task queue is empty.
    async fn sync_repo(&mut self) -> bool {
        let Some(repo) = &self.repo else {
            return false;
        };

        let branch = match repo.default_branch().await {
            Ok(branch) => branch,
            Err(err) => {
                tracing::debug!(error = %err, "repo sync check failed, staying on current revision");
                return false;
            }
        };

        let behind = match repo.commits_behind(env!("GIT_COMMIT_HASH"), &branch).await {
            Ok(behind) => behind,
            Err(err) => {
                tracing::debug!(error = %err, "repo sync check failed, staying on current revision");
                return false;
            }
        };

        if behind == 0 {
            return false;
        }

        tracing::info!(behind, branch = %branch, "local checkout behind upstream, requesting restart");
        if let Some(chat) = &self.chat {
            let _ = chat
                .send_message(&format!("local checkout is {behind} commit(s) behind {branch}, restarting"))
                .await;
        }
        true
    }

    async fn persist_memory_summary(&mut self) {
        let summary = format!(
            "beat={} evolutions={} pending_tasks={}",
            self.state.beat_count,
            self.state.evolution_count,
            self.engine.pending_count()
        );
        if let Err(err) = self.memory.write_memory("heartbeat-summary", &summary).await {
            tracing::warn!(error = %err, "failed to persist heartbeat summary to memory");
        }
    }

    async fn drain_chat_commands(&mut self) {
        let Some(chat) = &mut self.chat else { return };
        let updates = match chat.poll_updates().await {
            Ok(updates) => updates,
            Err(err) => {
                tracing::debug!(error = %err, "chat poll failed");
                return;
            }
        };

        for update in updates {
            match crate::chat::parse_command(&update.text) {
                Command::Start => {
                    let _ = chat.send_message("cradle is listening").await;
                }
                Command::Status => {
                    let text = format!(
                        "beat={} pending={} total={} evolutions={}",
                        self.state.beat_count,
                        self.engine.pending_count(),
                        self.engine.total_count(),
                        self.state.evolution_count
                    );
                    let _ = chat.send_message(&text).await;
                }
                Command::Cost => {
                    let _ = chat.send_message("cost tracking is reported via the LLM router stats").await;
                }
                Command::Evolve => {
                    if self.evolver.is_some() {
                        let summary = self.evolver.as_mut().unwrap().evolve().await;
                        let _ = chat.send_message(&summary).await;
                    } else {
                        let _ = chat.send_message("self-evolution is not configured").await;
                    }
                }
                Command::Task(text) if !text.is_empty() => {
                    self.engine.add_task(truncate_title(&text), text.clone(), None, TaskSource::User);
                    let _ = chat.send_message(&format!("queued task: {text}")).await;
                }
                Command::Task(_) => {}
            }
        }
    }
}

fn truncate_title(text: &str) -> String {
    if text.len() <= 60 {
        text.to_string()
    } else {
        format!("{}...", &text[..60])
    }
}
