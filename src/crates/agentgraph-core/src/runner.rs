//! Run entry points
//!
//! [`Runner::create_run`] starts a run in the background and hands back a
//! [`Run`] handle. [`Runner::stream_run`] starts one and returns its events.
//! Both validate the request first; caller errors are returned directly and
//! nothing is spawned.

use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use crate::config::RunConfig;
use crate::error::{AgentError, Result};
use crate::executor::{GraphExecutor, RunOutcome, RunRequest, RunStatus};
use crate::messages::MessageInput;
use crate::stream::{Event, EventEmitter, EventStream};

/// Observable progress of a background run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunProgress {
    Running,
    Finished { status: RunStatus },
    Failed { error: String },
}

impl RunProgress {
    pub fn is_done(&self) -> bool {
        !matches!(self, RunProgress::Running)
    }
}

/// Handle to a run started with [`Runner::create_run`]
#[derive(Debug)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    progress: watch::Receiver<RunProgress>,
    handle: JoinHandle<Result<RunOutcome>>,
}

impl Run {
    pub fn progress(&self) -> RunProgress {
        self.progress.borrow().clone()
    }

    /// Subscribe to progress changes
    pub fn watch(&self) -> watch::Receiver<RunProgress> {
        self.progress.clone()
    }

    /// Wait for the run to finish
    pub async fn wait(self) -> Result<RunOutcome> {
        self.handle
            .await
            .map_err(|e| AgentError::Execution(format!("run task failed: {}", e)))?
    }
}

/// Starts runs on a shared executor
#[derive(Debug, Clone)]
pub struct Runner {
    executor: GraphExecutor,
}

impl Runner {
    pub fn new(executor: GraphExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &GraphExecutor {
        &self.executor
    }

    async fn validate(
        &self,
        thread_id: impl Into<String>,
        assistant_id: Option<String>,
        input: Option<MessageInput>,
        mut config: RunConfig,
    ) -> Result<RunRequest> {
        config.thread_id = thread_id.into();
        if assistant_id.is_some() {
            config.assistant_id = assistant_id;
        }
        self.executor.validate_request(config, input).await
    }

    /// Start a run in the background.
    pub async fn create_run(
        &self,
        thread_id: impl Into<String>,
        assistant_id: Option<String>,
        input: Option<MessageInput>,
        config: RunConfig,
    ) -> Result<Run> {
        let request = self.validate(thread_id, assistant_id, input, config).await?;
        let id = request.run_id.clone();
        let thread_id = request.thread_id().to_string();
        let (progress_tx, progress) = watch::channel(RunProgress::Running);

        let executor = self.executor.clone();
        let run_id = id.clone();
        let handle = tokio::spawn(async move {
            let running = executor.execute(request, None);
            let result = match AssertUnwindSafe(running).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    error!(run_id = %run_id, "Run task panicked");
                    Err(AgentError::Execution("run task panicked".to_string()))
                }
            };
            let progress = match &result {
                Ok(outcome) => RunProgress::Finished {
                    status: outcome.status,
                },
                Err(e) => {
                    error!(run_id = %run_id, error = %e, "Run failed");
                    RunProgress::Failed {
                        error: e.to_string(),
                    }
                }
            };
            let _ = progress_tx.send(progress);
            result
        });

        Ok(Run {
            id,
            thread_id,
            progress,
            handle,
        })
    }

    /// Start a run and stream its events.
    ///
    /// The stream ends with exactly one `run_complete` or `run_error` event.
    /// Dropping it cancels the run before its next step.
    pub async fn stream_run(
        &self,
        thread_id: impl Into<String>,
        assistant_id: Option<String>,
        input: Option<MessageInput>,
        config: RunConfig,
    ) -> Result<EventStream> {
        let request = self.validate(thread_id, assistant_id, input, config).await?;
        let run_id = request.run_id.clone();
        let thread_id = request.thread_id().to_string();
        let (emitter, stream) = EventEmitter::channel(run_id.clone());

        let executor = self.executor.clone();
        tokio::spawn(async move {
            let running = executor.execute(request, Some(emitter.clone()));
            let terminal = match AssertUnwindSafe(running).catch_unwind().await {
                Ok(Ok(outcome)) => Event::run_complete(&outcome),
                Ok(Err(e)) => {
                    error!(run_id = %run_id, thread_id = %thread_id, error = %e, "Run failed");
                    Event::run_error(&run_id, &thread_id, &e)
                }
                Err(_) => {
                    let e = AgentError::Execution("run task panicked".to_string());
                    error!(run_id = %run_id, thread_id = %thread_id, "Run task panicked");
                    Event::run_error(&run_id, &thread_id, &e)
                }
            };
            emitter.emit(terminal).await;
        });

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatModel, ModelRegistry};
    use crate::messages::{AiMessage, Transcript};
    use crate::state::AgentState;
    use crate::step::{AgentStep, StepContext, StepFactory};
    use crate::stream::EventKind;
    use crate::testing::{PassthroughStepFactory, ScriptedModel};
    use crate::tool::ToolSet;
    use agentgraph_checkpoint::InMemoryCheckpointSaver;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Arc;

    struct PanickingStep;

    #[async_trait]
    impl AgentStep for PanickingStep {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn step(&self, _: &Transcript, _: &AgentState, _: &StepContext) -> Result<AiMessage> {
            panic!("step blew up")
        }
    }

    struct PanickingStepFactory;

    impl StepFactory for PanickingStepFactory {
        fn build(&self, _: &RunConfig, _: Arc<dyn ChatModel>, _: &ToolSet) -> Result<Arc<dyn AgentStep>> {
            Ok(Arc::new(PanickingStep))
        }
    }

    fn runner_with(script: Vec<AiMessage>, steps: Arc<dyn StepFactory>) -> Runner {
        let models = Arc::new(ModelRegistry::new());
        models.register_instance("scripted", Arc::new(ScriptedModel::new(script)));
        Runner::new(GraphExecutor::new(Arc::new(InMemoryCheckpointSaver::new()), steps).with_models(models))
    }

    fn runner(script: Vec<AiMessage>) -> Runner {
        runner_with(script, Arc::new(PassthroughStepFactory))
    }

    #[tokio::test]
    async fn test_create_run_wait() {
        let runner = runner(vec![AiMessage::new("4")]);
        let run = runner
            .create_run("t1", Some("asst".into()), Some("2+2?".into()), RunConfig::new("", "scripted"))
            .await
            .unwrap();
        assert_eq!(run.thread_id, "t1");

        let mut watch = run.watch();
        let outcome = run.wait().await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.steps, 1);

        watch.wait_for(RunProgress::is_done).await.unwrap();
        assert_eq!(
            *watch.borrow(),
            RunProgress::Finished {
                status: RunStatus::Completed
            }
        );
    }

    #[tokio::test]
    async fn test_caller_errors_are_not_spawned() {
        let runner = runner(vec![]);
        let err = runner
            .stream_run("t1", None, None, RunConfig::new("", "scripted"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ThreadNotFound(_)));

        let err = runner
            .create_run("t1", None, Some("x".into()), RunConfig::new("", "scripted").with_max_steps(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_model_failure_becomes_run_error() {
        // empty script: the first model call fails
        let runner = runner(vec![]);
        let events: Vec<_> = runner
            .stream_run("t1", None, Some("hi".into()), RunConfig::new("", "scripted"))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::RunError);
        assert_eq!(events[0].data["kind"], "model");
    }

    #[tokio::test]
    async fn test_panicking_run_reports_failure() {
        let runner = runner_with(vec![], Arc::new(PanickingStepFactory));
        let run = runner
            .create_run("t1", None, Some("hi".into()), RunConfig::new("", "scripted"))
            .await
            .unwrap();

        let mut watch = run.watch();
        let err = run.wait().await.unwrap_err();
        assert!(matches!(err, AgentError::Execution(_)));

        watch.wait_for(RunProgress::is_done).await.unwrap();
        assert_eq!(
            *watch.borrow(),
            RunProgress::Failed {
                error: err.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_panicking_stream_ends_with_run_error() {
        let runner = runner_with(vec![], Arc::new(PanickingStepFactory));
        let events: Vec<_> = runner
            .stream_run("t1", None, Some("hi".into()), RunConfig::new("", "scripted"))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.last().map(|e| e.kind), Some(EventKind::RunError));
    }
}
