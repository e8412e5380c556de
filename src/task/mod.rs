//! Task Engine: a ReAct (Think -> Act -> Execute -> Reflect) loop over a
//! FIFo task queue, owned exclusively by this module. See Component
//! Design §4.3 and Data Model's Task section.

pub mod plan;
pub mod skills;

use crate::llm::router::LLMRouter;
use crate::memory::MemoryPort;
use crate::sandbox::SandboxDriver;
use plan::Plan;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

pub const MAX_ATTEMPTS: u32 = 3;
const SELF_UPDATE_SENTINEL: &str = "SELF_UPDATE_PUSHED";
const CODE_SANDBOX_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Thinking,
    Acting,
    Executing,
    Reflecting,
    Completed,
    Failed,
    Blocked,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskSource {
    User,
    #[serde(rename = "self")]
    SelfSeed,
    SelfHealing,
    SelfImprovement,
    Bootstrap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub parent_id: Option<String>,
    pub children: Vec<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub reflection: Option<String>,
    pub source: TaskSource,
}

fn new_task_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

impl Task {
    fn new(title: String, description: String, parent_id: Option<String>, source: TaskSource) -> Self {
        Self {
            id: new_task_id(),
            title,
            description,
            status: TaskStatus::Pending,
            parent_id,
            children: Vec::new(),
            result: None,
            error: None,
            attempts: 0,
            max_attempts: MAX_ATTEMPTS,
            created_at: chrono::Utc::now(),
            completed_at: None,
            reflection: None,
            source,
        }
    }
}

/// What the evolver or heartbeat should do after a ReAct pass reported
/// success whose stdout carried the self-update sentinel.
pub struct ProcessOutcome {
    pub task: Task,
    pub requested_restart: bool,
}

pub struct TaskEngine {
    queue: VecDeque<String>,
    tasks: HashMap<String, Task>,
    router: Arc<LLMRouter>,
    sandbox: Arc<SandboxDriver>,
    memory: Arc<dyn MemoryPort>,
}

impl TaskEngine {
    pub fn new(router: Arc<LLMRouter>, sandbox: Arc<SandboxDriver>, memory: Arc<dyn MemoryPort>) -> Self {
        Self { queue: VecDeque::new(), tasks: HashMap::new(), router, sandbox, memory }
    }

    pub fn add_task(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        parent_id: Option<String>,
        source: TaskSource,
    ) -> Task {
        let task = Task::new(title.into(), description.into(), parent_id.clone(), source);
        if let Some(parent_id) = &parent_id {
            if let Some(parent) = self.tasks.get_mut(parent_id) {
                parent.children.push(task.id.clone());
            }
        }
        self.queue.push_back(task.id.clone());
        self.tasks.insert(task.id.clone(), task.clone());
        task
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn total_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn snapshot(&self) -> &HashMap<String, Task> {
        &self.tasks
    }

    /// Dequeue one task id and run exactly one ReAct pass.
    pub async fn process_next(&mut self) -> Option<ProcessOutcome> {
        let id = self.queue.pop_front()?;
        let Some(mut task) = self.tasks.get(&id).cloned() else {
            return None;
        };
        if task.status.is_terminal() {
            return Some(ProcessOutcome { task, requested_restart: false });
        }

        task.attempts += 1;
        task.status = TaskStatus::Thinking;

        let system_prompt = build_system_prompt(&task);
        let requested_restart = match self
            .router
            .complete(&format!("{}\n\n{}", task.title, task.description), Some(&system_prompt), None, 0.7, 4096)
            .await
        {
            Ok(response) => self.run_plan(&mut task, &response.content).await,
            Err(err) => {
                tracing::warn!(task = %task.id, error = %err, "think step failed, degrading to failure");
                fail_task(&mut task, &err.to_string());
                false
            }
        };

        if task.status == TaskStatus::Pending {
            self.queue.push_back(task.id.clone());
        }

        self.tasks.insert(task.id.clone(), task.clone());
        Some(ProcessOutcome { task, requested_restart })
    }

    async fn run_plan(&mut self, task: &mut Task, raw_response: &str) -> bool {
        match plan::extract_plan(raw_response) {
            Plan::DirectAnswer { answer } => {
                task.result = Some(answer);
                complete_task(task);
                false
            }
            Plan::Decompose { subtasks } => {
                for subtask in subtasks {
                    let child = self.add_task(
                        subtask.title,
                        subtask.description,
                        Some(task.id.clone()),
                        TaskSource::SelfSeed,
                    );
                    task.children.push(child.id);
                }
                task.status = TaskStatus::Blocked;
                false
            }
            Plan::Code { language, code, packages, needs_network } => {
                self.run_code_plan(task, &language, &code, &packages, needs_network).await
            }
            Plan::Invalid { reason } => {
                fail_task(task, &format!("think phase produced a malformed plan: {reason}"));
                false
            }
        }
    }

    async fn run_code_plan(
        &mut self,
        task: &mut Task,
        language: &str,
        code: &str,
        packages: &[String],
        needs_network: bool,
    ) -> bool {
        task.status = TaskStatus::Executing;

        let sandbox_result = if language.eq_ignore_ascii_case("shell")
            || language.eq_ignore_ascii_case("sh")
            || language.eq_ignore_ascii_case("bash")
        {
            self.sandbox
                .run_shell(code, "alpine:3", CODE_SANDBOX_TIMEOUT, needs_network)
                .await
        } else {
            self.sandbox
                .run_code(code, CODE_SANDBOX_TIMEOUT, packages, needs_network)
                .await
        };

        let result = match sandbox_result {
            Ok(r) => r,
            Err(err) => {
                fail_or_retry(task, &err.to_string(), false);
                return false;
            }
        };

        task.status = TaskStatus::Reflecting;
        let reflection_prompt = format!(
            "Task: {}\nCode:\n{}\nExit code: {}\nSuccess: {}\nDuration: {}ms\nStdout: {}\nStderr: {}\n\n\
             Respond with JSON: {{\"reflection\":str,\"summary\":str,\"should_retry\":bool,\"learnings\":[str]}}",
            task.title,
            truncate(code, 2000),
            result.exit_code,
            result.success,
            result.duration_ms,
            truncate(&result.stdout, 1000),
            truncate(&result.stderr, 1000),
        );

        let reflection = self
            .router
            .complete(&reflection_prompt, None, Some("gemini"), 0.3, 1024)
            .await
            .ok();

        let should_retry = reflection
            .as_ref()
            .and_then(|r| serde_json::from_str::<Reflection>(&r.content).ok())
            .map(|r| {
                task.reflection = Some(r.reflection);
                if let Some(mem) = r.summary_for_memory() {
                    let memory = Arc::clone(&self.memory);
                    tokio::spawn(async move {
                        if let Err(err) = memory.write_memory("task-reflection", &mem).await {
                            tracing::warn!(error = %err, "failed to persist reflection memory");
                        }
                    });
                }
                r.should_retry
            })
            .unwrap_or(false);

        if result.success {
            let requested_restart = result.stdout.contains(SELF_UPDATE_SENTINEL);
            task.result = Some(if result.stdout.trim().is_empty() {
                task.reflection.clone().unwrap_or_default()
            } else {
                result.stdout.clone()
            });
            complete_task(task);
            requested_restart
        } else {
            fail_or_retry(task, &result.stderr, should_retry);
            false
        }
    }
}

#[derive(Deserialize)]
struct Reflection {
    reflection: String,
    #[allow(dead_code)]
    summary: String,
    should_retry: bool,
    #[serde(default)]
    learnings: Vec<String>,
}

impl Reflection {
    fn summary_for_memory(&self) -> Option<String> {
        if self.learnings.is_empty() {
            None
        } else {
            Some(self.learnings.join("\n"))
        }
    }
}

fn complete_task(task: &mut Task) {
    task.status = TaskStatus::Completed;
    task.error = None;
    task.completed_at = Some(chrono::Utc::now());
}

fn fail_task(task: &mut Task, error: &str) {
    task.status = TaskStatus::Failed;
    task.error = Some(error.to_string());
    task.completed_at = Some(chrono::Utc::now());
}

/// On failure, retry if attempts remain and the reflection asked for it;
/// otherwise transition to failed permanently.
fn fail_or_retry(task: &mut Task, error: &str, should_retry: bool) {
    task.error = Some(error.to_string());
    if task.attempts < task.max_attempts && should_retry {
        task.status = TaskStatus::Pending;
    } else {
        fail_task(task, error);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}

const PERSONA_FALLBACK: &str = "You are a focused autonomous engineering agent. Be terse, \
    correct, and prefer acting over asking.";

const RESPONSE_FORMAT_CONTRACT: &str = "Respond with exactly one JSON object, one of:\n\
    {\"type\":\"direct_answer\",\"answer\":str}\n\
    {\"type\":\"decompose\",\"subtasks\":[{\"title\":str,\"description\":str}]}\n\
    {\"type\":\"code\",\"language\":str,\"code\":str,\"packages\":[str]?,\"needs_network\":bool?}\n\
    No prose outside the JSON object.";

const SANDBOX_ENV_CONTRACT: &str = "Code runs in an isolated container with no network unless \
    needs_network is set, a 256-512MiB memory cap, and a 50000-byte-per-stream output cap. \
    Only explicitly allowlisted environment variables are visible to your code.";

fn build_system_prompt(task: &Task) -> String {
    let mut prompt = format!("{PERSONA_FALLBACK}\n\n{RESPONSE_FORMAT_CONTRACT}\n\n{SANDBOX_ENV_CONTRACT}");
    let haystack = format!("{} {}", task.title, task.description);
    for skill_text in skills::matching_skill_text(&haystack) {
        prompt.push_str("\n\n");
        prompt.push_str(skill_text);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMProvider, LLMResponse, Message, ProviderOutput};
    use crate::memory::NullMemoryPort;
    use async_trait::async_trait;

    struct ScriptedProvider {
        response: String,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn model(&self) -> &str {
            "scripted-model"
        }
        fn is_local(&self) -> bool {
            true
        }
        fn cost_per_1k_tokens(&self) -> f64 {
            0.0
        }
        async fn generate(
            &self,
            _messages: &[Message],
            _temperature: f32,
            _max_tokens: u32,
        ) -> crate::llm::Result<ProviderOutput> {
            Ok(ProviderOutput { content: self.response.clone(), input_tokens: 1, output_tokens: 1 })
        }
    }

    fn router_with_response(response: &str) -> Arc<LLMRouter> {
        let cfg = crate::config::ProviderConfig {
            name: "scripted".to_string(),
            credential: crate::secrets::SecretString::new("x"),
            base_url: "http://localhost".to_string(),
            model: "scripted-model".to_string(),
            priority: 0,
            max_requests_per_minute: 60,
            cost_per_1k_tokens: 0.0,
            is_local: true,
        };
        Arc::new(LLMRouter::new(vec![(
            cfg,
            Box::new(ScriptedProvider { response: response.to_string() }),
        )]))
    }

    fn engine_with_response(response: &str) -> TaskEngine {
        TaskEngine::new(
            router_with_response(response),
            Arc::new(SandboxDriver::new(std::env::temp_dir())),
            Arc::new(NullMemoryPort),
        )
    }

    struct SequencedProvider {
        responses: std::sync::Mutex<std::collections::VecDeque<String>>,
    }

    #[async_trait]
    impl LLMProvider for SequencedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn model(&self) -> &str {
            "scripted-model"
        }
        fn is_local(&self) -> bool {
            true
        }
        fn cost_per_1k_tokens(&self) -> f64 {
            0.0
        }
        async fn generate(
            &self,
            _messages: &[Message],
            _temperature: f32,
            _max_tokens: u32,
        ) -> crate::llm::Result<ProviderOutput> {
            let content = self.responses.lock().unwrap().pop_front().unwrap_or_default();
            Ok(ProviderOutput { content, input_tokens: 1, output_tokens: 1 })
        }
    }

    fn engine_with_sequence(responses: &[&str]) -> TaskEngine {
        let cfg = crate::config::ProviderConfig {
            name: "scripted".to_string(),
            credential: crate::secrets::SecretString::new("x"),
            base_url: "http://localhost".to_string(),
            model: "scripted-model".to_string(),
            priority: 0,
            max_requests_per_minute: 60,
            cost_per_1k_tokens: 0.0,
            is_local: true,
        };
        let provider = SequencedProvider {
            responses: std::sync::Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        };
        let router = Arc::new(LLMRouter::new(vec![(cfg, Box::new(provider))]));
        TaskEngine::new(router, Arc::new(SandboxDriver::new(std::env::temp_dir())), Arc::new(NullMemoryPort))
    }

    #[tokio::test]
    async fn happy_path_direct_answer() {
        let mut engine = engine_with_response(r#"{"type":"direct_answer","answer":"hi"}"#);
        engine.add_task("say hi", "", None, TaskSource::User);

        let outcome = engine.process_next().await.unwrap();
        assert_eq!(outcome.task.status, TaskStatus::Completed);
        assert_eq!(outcome.task.result.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn queue_discipline_is_fifo() {
        let mut engine = engine_with_response(r#"{"type":"direct_answer","answer":"x"}"#);
        let first = engine.add_task("first", "", None, TaskSource::User);
        let second = engine.add_task("second", "", None, TaskSource::User);

        let outcome1 = engine.process_next().await.unwrap();
        let outcome2 = engine.process_next().await.unwrap();
        assert_eq!(outcome1.task.id, first.id);
        assert_eq!(outcome2.task.id, second.id);
    }

    #[tokio::test]
    async fn failed_code_task_with_retry_advice_is_re_enqueued() {
        let mut engine = engine_with_sequence(&[
            r#"{"type":"code","language":"shell","code":"exit 1","packages":[]}"#,
            r#"{"reflection":"transient failure","summary":"retry","should_retry":true}"#,
        ]);
        engine.add_task("flaky", "", None, TaskSource::User);

        let outcome = engine.process_next().await.unwrap();
        assert_eq!(outcome.task.status, TaskStatus::Pending);
        assert_eq!(outcome.task.attempts, 1);
        assert_eq!(
            engine.pending_count(),
            1,
            "a task sent back to pending must be re-queued for its next attempt"
        );
    }

    #[tokio::test]
    async fn code_plan_missing_code_field_fails_task_not_direct_answer() {
        let mut engine = engine_with_response(r#"{"type":"code","language":"python","packages":[]}"#);
        engine.add_task("broken plan", "", None, TaskSource::User);

        let outcome = engine.process_next().await.unwrap();
        assert_eq!(outcome.task.status, TaskStatus::Failed);
        assert!(outcome.task.error.as_deref().unwrap_or("").contains("malformed plan"));
    }

    #[tokio::test]
    async fn decompose_blocks_parent_and_spawns_children() {
        let mut engine = engine_with_response(
            r#"{"type":"decompose","subtasks":[{"title":"a","description":"d"}]}"#,
        );
        engine.add_task("parent", "", None, TaskSource::User);

        let outcome = engine.process_next().await.unwrap();
        assert_eq!(outcome.task.status, TaskStatus::Blocked);
        assert_eq!(outcome.task.children.len(), 1);
        assert_eq!(engine.pending_count(), 1);
    }

    #[tokio::test]
    async fn terminal_status_is_monotonic() {
        let mut engine = engine_with_response(r#"{"type":"direct_answer","answer":"done"}"#);
        engine.add_task("once", "", None, TaskSource::User);
        let outcome = engine.process_next().await.unwrap();
        assert!(outcome.task.status.is_terminal());
        // Re-inserting into the queue should not happen for terminal tasks;
        // process_next on an empty queue returns None.
        assert!(engine.process_next().await.is_none());
    }
}
