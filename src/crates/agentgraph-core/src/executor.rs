//! The graph executor
//!
//! Drives one run of a thread through a fixed three-node state machine:
//!
//! ```text
//!              ┌──────────── action ◄──────────┐
//!              │   (tool invoker, one batch)   │
//!              ↓                               │ latest ai message
//!   input ──► agent ───────────────────────────┤ has pending calls
//!          (step fn, one                       │
//!           model call)                        │ no pending calls
//!                                              └──────► end
//! ```
//!
//! # Run lifecycle
//!
//! 1. **Input.** Supplied input is merged into the latest transcript and an
//!    `input` checkpoint with `next = ["agent"]` is written before any step.
//!    Calls left unanswered by an interrupted turn are answered with
//!    cancellation errors first. Without input, the run resumes at the
//!    `next` recorded in the latest checkpoint.
//! 2. **Steps.** Every node execution is one step and is followed by a
//!    `loop` checkpoint recording the node that comes next.
//! 3. **Limits.** Before each step the step count and the wall-clock
//!    deadline are checked. Hitting either appends the stop message, writes
//!    a checkpoint carrying `stop_reason` and ends the run with status
//!    `stopped`. A node still running when the deadline passes is dropped.
//! 4. **Interrupts.** With `action` in `interrupt_before` the run pauses
//!    before invoking tools. The checkpoint already points at `action`, so
//!    the next invocation without input resumes there and does not pause
//!    again before it.
//! 5. **Cancellation.** When the event consumer goes away no further step is
//!    scheduled.
//!
//! Errors from the model or the checkpoint store end the run; whatever was
//! durably written last remains the resumable state.

use agentgraph_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSaver, CheckpointSource};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{RunConfig, Verbosity};
use crate::error::{AgentError, Result};
use crate::examples::{Example, ExampleSource};
use crate::llm::{ModelError, ModelRegistry};
use crate::messages::{AiMessage, Message, MessageInput, ToolResultMessage, Transcript};
use crate::state::{AgentState, ThreadStore};
use crate::step::{AgentStep, StepContext, StepFactory};
use crate::stream::{Event, EventEmitter};
use crate::tool::{ToolContext, ToolInvoker, ToolRegistry, ToolSet};

/// Appended as the final ai message when a run hits its step or time budget
pub const STOP_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";

pub const STOP_REASON_MAX_STEPS: &str = "max_steps";
pub const STOP_REASON_MAX_TIME: &str = "max_time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Agent,
    Action,
    End,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Agent => "agent",
            Node::Action => "action",
            Node::End => "end",
        }
    }
}

impl FromStr for Node {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "agent" => Ok(Node::Agent),
            "action" => Ok(Node::Action),
            "end" => Ok(Node::End),
            other => Err(AgentError::InvalidState(format!("unknown node '{}'", other))),
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition taken after `node` ran
pub fn route_after(node: Node, transcript: &Transcript) -> Node {
    match node {
        Node::Agent => {
            let pending = transcript
                .last()
                .and_then(Message::as_ai)
                .is_some_and(AiMessage::has_pending_calls);
            if pending {
                Node::Action
            } else {
                Node::End
            }
        }
        Node::Action => Node::Agent,
        Node::End => Node::End,
    }
}

fn pending_names(next: Node) -> Vec<String> {
    match next {
        Node::End => Vec::new(),
        node => vec![node.as_str().to_string()],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Reached `end`
    Completed,
    /// Paused at an interrupt point
    Interrupted,
    /// Cut short by the step or time budget
    Stopped,
    /// The event consumer went away
    Cancelled,
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub thread_id: String,
    pub status: RunStatus,
    /// Node executions performed by this run
    pub steps: usize,
    /// Latest durable checkpoint
    pub checkpoint_id: String,
    pub next: Vec<String>,
    pub messages: Transcript,
}

/// A validated request, ready to execute
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: String,
    pub config: Arc<RunConfig>,
    pub input: Option<Vec<Message>>,
    pub latest: Option<Checkpoint>,
}

impl RunRequest {
    pub fn thread_id(&self) -> &str {
        &self.config.thread_id
    }
}

/// Everything a node needs while the run is in progress
struct RunScope {
    run_id: String,
    config: Arc<RunConfig>,
    step: Arc<dyn AgentStep>,
    tools: ToolSet,
    tool_ctx: ToolContext,
    step_ctx: StepContext,
    emitter: Option<EventEmitter>,
    deadline: Option<Instant>,
}

impl RunScope {
    fn consumer_gone(&self) -> bool {
        self.emitter.as_ref().is_some_and(EventEmitter::is_closed)
    }

    fn budget_exhausted(&self, steps: usize) -> Option<&'static str> {
        if steps >= self.config.max_steps {
            Some(STOP_REASON_MAX_STEPS)
        } else if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(STOP_REASON_MAX_TIME)
        } else {
            None
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(event).await;
        }
    }
}

/// Runs the agent/action/end loop against a checkpoint store
#[derive(Clone)]
pub struct GraphExecutor {
    checkpointer: Arc<dyn CheckpointSaver>,
    models: Arc<ModelRegistry>,
    tools: Arc<ToolRegistry>,
    steps: Arc<dyn StepFactory>,
    examples: Option<Arc<dyn ExampleSource>>,
    invoker: ToolInvoker,
}

impl GraphExecutor {
    /// Executor resolving models through [`ModelRegistry::global`] with no tools registered
    pub fn new(checkpointer: Arc<dyn CheckpointSaver>, steps: Arc<dyn StepFactory>) -> Self {
        Self {
            checkpointer,
            models: ModelRegistry::global(),
            tools: Arc::new(ToolRegistry::new()),
            steps,
            examples: None,
            invoker: ToolInvoker::new(),
        }
    }

    pub fn with_models(mut self, models: Arc<ModelRegistry>) -> Self {
        self.models = models;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_example_source(mut self, source: Arc<dyn ExampleSource>) -> Self {
        self.examples = Some(source);
        self
    }

    pub fn checkpointer(&self) -> &Arc<dyn CheckpointSaver> {
        &self.checkpointer
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    /// State operations over the same store
    pub fn threads(&self) -> ThreadStore {
        ThreadStore::new(self.checkpointer.clone())
    }

    /// Check a request before anything runs.
    ///
    /// Rejects malformed configuration, uncoercible input and resumption of
    /// a thread that has no checkpoint.
    pub async fn validate_request(
        &self,
        config: RunConfig,
        input: Option<MessageInput>,
    ) -> Result<RunRequest> {
        config.validate()?;
        let input = input
            .map(MessageInput::into_messages)
            .transpose()?
            .filter(|messages| !messages.is_empty());

        let latest = self.checkpointer.get_latest(&config.thread_id).await?;
        if input.is_none() && latest.is_none() {
            return Err(AgentError::ThreadNotFound(config.thread_id.clone()));
        }

        Ok(RunRequest {
            run_id: Uuid::new_v4().to_string(),
            config: Arc::new(config),
            input,
            latest,
        })
    }

    /// Validate and run to completion without streaming.
    pub async fn invoke(&self, config: RunConfig, input: Option<MessageInput>) -> Result<RunOutcome> {
        let request = self.validate_request(config, input).await?;
        self.execute(request, None).await
    }

    /// Run a validated request.
    pub async fn execute(&self, request: RunRequest, emitter: Option<EventEmitter>) -> Result<RunOutcome> {
        let RunRequest {
            run_id,
            config,
            input,
            latest,
        } = request;
        let thread_id = config.thread_id.clone();
        info!(run_id = %run_id, thread_id = %thread_id, model = %config.model, "Run started");

        let scope = self.prepare(&run_id, config, emitter).await?;

        let (mut head, mut state, mut node) = match input {
            Some(messages) => {
                let (head, state) = self.apply_input(&scope, latest, messages).await?;
                (head, state, Node::Agent)
            }
            None => {
                let head = latest.ok_or_else(|| AgentError::ThreadNotFound(thread_id.clone()))?;
                let state = AgentState::from_checkpoint(&head)?;
                let node = match head.metadata.next.first() {
                    Some(name) => name.parse::<Node>()?,
                    None => Node::End,
                };
                (head, state, node)
            }
        };
        let resumed_at = node;
        let mut steps = 0usize;

        loop {
            if node == Node::End {
                return Ok(self.finish(&scope, RunStatus::Completed, steps, &head, state));
            }

            if scope.consumer_gone() {
                info!(run_id = %run_id, thread_id = %thread_id, steps, "Consumer disconnected, run cancelled");
                return Ok(self.finish(&scope, RunStatus::Cancelled, steps, &head, state));
            }

            if let Some(reason) = scope.budget_exhausted(steps) {
                return self.stop(&scope, reason, steps, head, state).await;
            }

            let just_resumed = steps == 0 && node == resumed_at;
            if scope.config.interrupts_before(node) && !just_resumed {
                info!(run_id = %run_id, thread_id = %thread_id, node = %node, "Run interrupted");
                return Ok(self.finish(&scope, RunStatus::Interrupted, steps, &head, state));
            }

            debug!(run_id = %run_id, thread_id = %thread_id, step = steps + 1, node = %node, "Executing node");
            let produced = {
                let running = self.run_node(&scope, node, &state);
                match scope.deadline {
                    Some(deadline) => tokio::time::timeout_at(deadline, running).await.ok(),
                    None => Some(running.await),
                }
            };
            let produced = match produced {
                Some(produced) => produced?,
                None => {
                    warn!(run_id = %run_id, thread_id = %thread_id, node = %node, "Time budget exceeded mid-step");
                    return self.stop(&scope, STOP_REASON_MAX_TIME, steps, head, state).await;
                }
            };

            let previous = state.clone();
            state.messages.merge(produced.clone());
            steps += 1;
            let next = route_after(node, &state.messages);

            let mut checkpoint = head.child(CheckpointSource::Loop);
            checkpoint.metadata = CheckpointMetadata::new(CheckpointSource::Loop, checkpoint.metadata.step)
                .with_next(pending_names(next))
                .with_extra("run_id", json!(run_id));
            state.write_into(&mut checkpoint, &previous)?;
            self.checkpointer.put(checkpoint.clone()).await?;
            debug!(
                run_id = %run_id,
                thread_id = %thread_id,
                step = steps,
                node = %node,
                next = %next,
                checkpoint_id = %checkpoint.id,
                "Step complete"
            );

            let messages = match scope.config.verbosity {
                Verbosity::Full => state.messages.messages(),
                Verbosity::Delta => produced.as_slice(),
            };
            scope
                .emit(Event::step_complete(
                    &run_id,
                    steps,
                    node,
                    Some(next),
                    &checkpoint.id,
                    scope.config.verbosity,
                    messages,
                ))
                .await;

            head = checkpoint;
            node = next;
        }
    }

    async fn prepare(
        &self,
        run_id: &str,
        config: Arc<RunConfig>,
        emitter: Option<EventEmitter>,
    ) -> Result<RunScope> {
        let model = self.models.get(&config.model).await.map_err(|e| match e {
            ModelError::NotRegistered(id) => {
                AgentError::invalid_config(format!("model '{}' is not registered", id))
            }
            other => AgentError::Model(other),
        })?;
        let tools = self.tools.select(&config.tools)?;
        let step = self.steps.build(&config, model, &tools)?;
        debug!(run_id = %run_id, strategy = step.name(), tools = tools.len(), "Run prepared");

        let tool_ctx = ToolContext::new(config.thread_id.clone())
            .with_assistant_id(config.assistant_id.clone())
            .with_scope(config.scope.clone())
            .with_run_id(run_id);
        let step_ctx = StepContext::new(config.clone(), run_id).with_emitter(emitter.clone());
        let deadline = config.max_time.map(|budget| Instant::now() + budget);

        Ok(RunScope {
            run_id: run_id.to_string(),
            config,
            step,
            tools,
            tool_ctx,
            step_ctx,
            emitter,
            deadline,
        })
    }

    /// Merge input and write the `input` checkpoint.
    async fn apply_input(
        &self,
        scope: &RunScope,
        latest: Option<Checkpoint>,
        input: Vec<Message>,
    ) -> Result<(Checkpoint, AgentState)> {
        let (mut checkpoint, previous) = match &latest {
            Some(latest) => (latest.child(CheckpointSource::Input), AgentState::from_checkpoint(latest)?),
            None => (Checkpoint::root(scope.config.thread_id.clone()), AgentState::default()),
        };

        let mut state = previous.clone();
        let cancelled = cancel_pending(&state.messages, "new input arrived before the call ran");
        if !cancelled.is_empty() {
            info!(
                run_id = %scope.run_id,
                thread_id = %scope.config.thread_id,
                calls = cancelled.len(),
                "Cancelling pending tool calls"
            );
        }
        state.messages.merge(cancelled);
        state.messages.merge(input);
        state.examples = self.load_examples(&scope.config).await;

        checkpoint.metadata = CheckpointMetadata::new(CheckpointSource::Input, checkpoint.metadata.step)
            .with_next(pending_names(Node::Agent))
            .with_extra("run_id", json!(scope.run_id));
        state.write_into(&mut checkpoint, &previous)?;
        self.checkpointer.put(checkpoint.clone()).await?;

        Ok((checkpoint, state))
    }

    async fn load_examples(&self, config: &RunConfig) -> Vec<Example> {
        let (Some(policy), Some(source)) = (config.examples, &self.examples) else {
            return Vec::new();
        };
        match source
            .fetch(config.assistant_id.as_deref(), config.scope.as_deref())
            .await
        {
            Ok(candidates) => policy.select(candidates),
            Err(e) => {
                warn!(thread_id = %config.thread_id, error = %e, "Example source failed, continuing without examples");
                Vec::new()
            }
        }
    }

    async fn run_node(&self, scope: &RunScope, node: Node, state: &AgentState) -> Result<Vec<Message>> {
        match node {
            Node::Agent => {
                let reply = scope.step.step(&state.messages, state, &scope.step_ctx).await?;
                Ok(vec![Message::Ai(reply)])
            }
            Node::Action => {
                let (calls, invalid) = state.messages.pending_calls();
                let mut results = self
                    .invoker
                    .invoke_many(&calls, &scope.tools, &scope.tool_ctx)
                    .await;
                results.extend(self.invoker.reject_invalid(&invalid));
                Ok(results.into_iter().map(Message::ToolResult).collect())
            }
            Node::End => Ok(Vec::new()),
        }
    }

    /// End the run at its budget: answer pending calls, append the stop
    /// message and checkpoint.
    async fn stop(
        &self,
        scope: &RunScope,
        reason: &str,
        steps: usize,
        head: Checkpoint,
        mut state: AgentState,
    ) -> Result<RunOutcome> {
        info!(run_id = %scope.run_id, thread_id = %scope.config.thread_id, steps, reason, "Run stopped");
        let previous = state.clone();
        let cancelled = cancel_pending(&state.messages, "the agent was stopped");
        state.messages.merge(cancelled);
        state.messages.merge(vec![Message::ai(STOP_MESSAGE)]);

        let mut checkpoint = head.child(CheckpointSource::Loop);
        checkpoint.metadata = CheckpointMetadata::new(CheckpointSource::Loop, checkpoint.metadata.step)
            .with_stop_reason(reason)
            .with_extra("run_id", json!(scope.run_id));
        state.write_into(&mut checkpoint, &previous)?;
        self.checkpointer.put(checkpoint.clone()).await?;

        Ok(self.finish(scope, RunStatus::Stopped, steps, &checkpoint, state))
    }

    fn finish(
        &self,
        scope: &RunScope,
        status: RunStatus,
        steps: usize,
        head: &Checkpoint,
        state: AgentState,
    ) -> RunOutcome {
        info!(
            run_id = %scope.run_id,
            thread_id = %scope.config.thread_id,
            status = ?status,
            steps,
            checkpoint_id = %head.id,
            "Run finished"
        );
        RunOutcome {
            run_id: scope.run_id.clone(),
            thread_id: scope.config.thread_id.clone(),
            status,
            steps,
            checkpoint_id: head.id.clone(),
            next: head.metadata.next.clone(),
            messages: state.messages,
        }
    }
}

impl std::fmt::Debug for GraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphExecutor")
            .field("models", &self.models)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

/// Error results for every call of the latest ai message still unanswered
pub(crate) fn cancel_pending(transcript: &Transcript, why: &str) -> Vec<Message> {
    let (calls, invalid) = transcript.pending_calls();
    let detail = format!("tool call cancelled: {}", why);
    calls
        .into_iter()
        .map(|call| ToolResultMessage::error(call.id, Some(call.name), &detail))
        .chain(
            invalid
                .into_iter()
                .map(|call| ToolResultMessage::error(call.id, call.name, &detail)),
        )
        .map(Message::ToolResult)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ToolCall;
    use crate::testing::{echo_tool, PassthroughStepFactory, ScriptedModel};
    use agentgraph_checkpoint::InMemoryCheckpointSaver;
    use serde_json::json;

    fn executor(model: ScriptedModel) -> GraphExecutor {
        let models = Arc::new(ModelRegistry::new());
        models.register_instance("scripted", Arc::new(model));
        let mut tools = ToolRegistry::new();
        tools.register(echo_tool());
        GraphExecutor::new(Arc::new(InMemoryCheckpointSaver::new()), Arc::new(PassthroughStepFactory))
            .with_models(models)
            .with_tools(tools)
    }

    fn config(thread_id: &str) -> RunConfig {
        RunConfig::new(thread_id, "scripted").with_tools(["echo"])
    }

    fn call(id: &str) -> AiMessage {
        AiMessage::new("").with_tool_calls(vec![ToolCall::new(id, "echo", json!({"v": id}))])
    }

    #[test]
    fn test_routing() {
        let with_call = Transcript::from(vec![Message::Ai(call("c1"))]);
        let plain = Transcript::from(vec![Message::ai("done")]);

        assert_eq!(route_after(Node::Agent, &with_call), Node::Action);
        assert_eq!(route_after(Node::Agent, &plain), Node::End);
        assert_eq!(route_after(Node::Action, &plain), Node::Agent);
        assert_eq!("action".parse::<Node>().unwrap(), Node::Action);
        assert!("tools".parse::<Node>().is_err());
    }

    #[tokio::test]
    async fn test_resume_unknown_thread_is_rejected() {
        let executor = executor(ScriptedModel::new(vec![]));
        let err = executor.validate_request(config("ghost"), None).await.unwrap_err();
        assert!(matches!(err, AgentError::ThreadNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_unknown_model_fails_the_run() {
        let executor = executor(ScriptedModel::new(vec![]));
        let err = executor
            .invoke(RunConfig::new("t1", "missing"), Some("hi".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_one_tool_round_trip() {
        let executor = executor(ScriptedModel::new(vec![call("c1"), AiMessage::new("done")]));
        let outcome = executor.invoke(config("t1"), Some("go".into())).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.messages.len(), 4);
        assert!(outcome.next.is_empty());
        assert!(outcome.messages.unanswered_calls().is_empty());

        let history = executor.threads().get_history("t1", None).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[3].metadata.source, CheckpointSource::Input);
        assert_eq!(history[3].next, vec!["agent".to_string()]);
        assert_eq!(history[0].checkpoint_id, outcome.checkpoint_id);
    }

    #[tokio::test]
    async fn test_step_limit_stops_run() {
        let script = (0..5).map(|i| call(&format!("c{}", i))).collect();
        let executor = executor(ScriptedModel::new(script));
        let outcome = executor
            .invoke(config("t1").with_max_steps(2), Some("loop".into()))
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Stopped);
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.messages.last().unwrap().text(), STOP_MESSAGE);

        let state = executor.threads().get_state("t1").await.unwrap().unwrap();
        assert_eq!(state.metadata.stop_reason.as_deref(), Some(STOP_REASON_MAX_STEPS));
        assert!(state.is_finished());
    }

    #[tokio::test]
    async fn test_finished_thread_resumes_to_nothing() {
        let executor = executor(ScriptedModel::new(vec![AiMessage::new("hi")]));
        executor.invoke(config("t1"), Some("hello".into())).await.unwrap();

        let outcome = executor.invoke(config("t1"), None).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.steps, 0);
    }

    #[tokio::test]
    async fn test_new_input_cancels_paused_calls() {
        let executor = executor(ScriptedModel::new(vec![call("c1"), AiMessage::new("ok")]));
        let paused = executor
            .invoke(config("t1").with_interrupt_before([Node::Action]), Some("first".into()))
            .await
            .unwrap();
        assert_eq!(paused.status, RunStatus::Interrupted);
        assert_eq!(paused.next, vec!["action".to_string()]);

        let outcome = executor.invoke(config("t1"), Some("never mind".into())).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert!(outcome.messages.unanswered_calls().is_empty());

        let cancelled = outcome
            .messages
            .iter()
            .find_map(|m| match m {
                Message::ToolResult(r) if r.tool_call_id == "c1" => Some(r),
                _ => None,
            })
            .unwrap();
        assert!(cancelled.is_error);
        assert!(cancelled.text().contains("cancelled"));
    }
}
