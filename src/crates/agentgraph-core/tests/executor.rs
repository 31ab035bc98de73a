//! Executor and streaming behaviour against scripted collaborators

use agentgraph_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
use agentgraph_core::testing::{
    echo_tool, failing_tool, panicking_tool, sleeping_tool, PassthroughStepFactory, ScriptedModel,
};
use agentgraph_core::{
    AiMessage, EventKind, GraphExecutor, Message, MessageKind, ModelRegistry, Node, RunConfig, RunStatus, Runner,
    ToolCall, ToolRegistry, Transcript, Verbosity, STOP_MESSAGE,
};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Harness {
    saver: Arc<InMemoryCheckpointSaver>,
    model: Arc<ScriptedModel>,
    executor: GraphExecutor,
}

fn harness(model: ScriptedModel) -> Harness {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let model = Arc::new(model);
    let models = Arc::new(ModelRegistry::new());
    models.register_instance("scripted", model.clone());

    let mut tools = ToolRegistry::new();
    tools
        .register(echo_tool())
        .register(failing_tool())
        .register(panicking_tool())
        .register(sleeping_tool("slow", Duration::from_millis(500)));

    let executor = GraphExecutor::new(saver.clone(), Arc::new(PassthroughStepFactory))
        .with_models(models)
        .with_tools(tools);
    Harness { saver, model, executor }
}

fn config(thread_id: &str) -> RunConfig {
    RunConfig::new(thread_id, "scripted").with_tools(["echo", "fail", "explode", "slow"])
}

fn calls(id: &str, names: &[&str]) -> AiMessage {
    let calls = names
        .iter()
        .enumerate()
        .map(|(i, name)| ToolCall::new(format!("{}-{}", id, i), *name, json!({"n": i})))
        .collect();
    AiMessage::new("").with_id(id).with_tool_calls(calls)
}

fn looping_script(n: usize) -> Vec<AiMessage> {
    (0..n).map(|i| calls(&format!("a{}", i), &["echo"])).collect()
}

/// Transcript without generated ids
fn shape(transcript: &Transcript) -> Vec<(MessageKind, String, Option<String>)> {
    transcript
        .iter()
        .map(|m| {
            let call_id = match m {
                Message::ToolResult(r) => Some(r.tool_call_id.clone()),
                _ => None,
            };
            (m.kind(), m.text(), call_id)
        })
        .collect()
}

#[tokio::test]
async fn simple_question_takes_one_step() {
    let h = harness(ScriptedModel::new(vec![AiMessage::new("4")]));
    let outcome = h.executor.invoke(config("qa"), Some("2+2?".into())).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.steps, 1);
    assert_eq!(h.saver.checkpoint_count().await, 2);
    assert_eq!(
        shape(&outcome.messages),
        vec![
            (MessageKind::Human, "2+2?".to_string(), None),
            (MessageKind::Ai, "4".to_string(), None),
        ]
    );

    // system message first, then the transcript
    let request = &h.model.requests()[0];
    assert_eq!(request.messages[0].kind(), MessageKind::System);
    assert_eq!(request.messages[1].text(), "2+2?");
}

#[tokio::test]
async fn step_limit_boundary() {
    for max_steps in 1..=4 {
        let h = harness(ScriptedModel::new(looping_script(10)));
        let outcome = h
            .executor
            .invoke(config("limit").with_max_steps(max_steps), Some("go".into()))
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Stopped);
        assert_eq!(outcome.steps, max_steps);
        assert_eq!(outcome.messages.last().unwrap().text(), STOP_MESSAGE);
        assert!(outcome.messages.unanswered_calls().is_empty());
        // input + one per step + the stop checkpoint
        assert_eq!(h.saver.checkpoint_count().await, max_steps + 2);
    }
}

#[tokio::test]
async fn run_that_fits_the_limit_completes() {
    let h = harness(ScriptedModel::new(vec![calls("a0", &["echo"]), AiMessage::new("done")]));
    let outcome = h
        .executor
        .invoke(config("fits").with_max_steps(3), Some("go".into()))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.steps, 3);
    assert_ne!(outcome.messages.last().unwrap().text(), STOP_MESSAGE);
}

#[tokio::test]
async fn tool_failures_stay_in_their_call() {
    let h = harness(ScriptedModel::new(vec![
        calls("a0", &["echo", "fail", "explode", "missing"]),
        AiMessage::new("recovered"),
    ]));
    let outcome = h.executor.invoke(config("batch"), Some("go".into())).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    let results: Vec<_> = outcome
        .messages
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult(r) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 4);
    let errors: Vec<_> = results.iter().map(|r| r.is_error).collect();
    assert_eq!(errors, vec![false, true, true, true]);
    assert_eq!(results[0].content, json!({"n": 0}));
    assert!(results[3].text().contains("Tool 'missing' not found"));
    assert_eq!(outcome.messages.last().unwrap().text(), "recovered");
}

#[tokio::test]
async fn interrupt_and_resume_is_transparent() {
    let script = || {
        vec![
            calls("a0", &["echo"]),
            calls("a1", &["echo", "echo"]),
            AiMessage::new("done").with_id("a2"),
        ]
    };

    let straight = harness(ScriptedModel::new(script()));
    let expected = straight.executor.invoke(config("t"), Some(Message::human("go").with_id("h0").into())).await.unwrap();

    let paused = harness(ScriptedModel::new(script()));
    let interrupting = config("t").with_interrupt_before([Node::Action]);
    let mut outcome = paused
        .executor
        .invoke(interrupting.clone(), Some(Message::human("go").with_id("h0").into()))
        .await
        .unwrap();

    let mut pauses = 0;
    while outcome.status == RunStatus::Interrupted {
        pauses += 1;
        assert_eq!(outcome.next, vec!["action".to_string()]);
        outcome = paused.executor.invoke(interrupting.clone(), None).await.unwrap();
    }

    assert_eq!(pauses, 2);
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(shape(&outcome.messages), shape(&expected.messages));
    assert_eq!(paused.model.remaining(), 0);
}

#[tokio::test]
async fn time_budget_stops_mid_step() {
    let h = harness(ScriptedModel::new(vec![calls("a0", &["slow"])]));
    let started = Instant::now();
    let outcome = h
        .executor
        .invoke(
            config("slow").with_max_time(Duration::from_millis(100)),
            Some("go".into()),
        )
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(450));
    assert_eq!(outcome.status, RunStatus::Stopped);
    assert_eq!(outcome.messages.last().unwrap().text(), STOP_MESSAGE);
    // the dropped call is answered so the transcript stays well-formed
    assert!(outcome.messages.unanswered_calls().is_empty());

    let latest = h.saver.get_latest("slow").await.unwrap().unwrap();
    assert_eq!(latest.metadata.stop_reason.as_deref(), Some("max_time"));
}

#[tokio::test]
async fn stream_emits_events_in_order() {
    let h = harness(ScriptedModel::new(vec![
        calls("a0", &["echo"]),
        AiMessage::new("It is four"),
    ]));
    let runner = Runner::new(h.executor.clone());

    let events: Vec<_> = runner
        .stream_run("s1", None, Some("2+2?".into()), config("").with_verbosity(Verbosity::Delta))
        .await
        .unwrap()
        .collect()
        .await;

    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::MessageDelta, // tool call fragments of a0
            EventKind::StepComplete, // agent
            EventKind::StepComplete, // action
            EventKind::MessageDelta,
            EventKind::MessageDelta,
            EventKind::MessageDelta,
            EventKind::StepComplete, // agent
            EventKind::RunComplete,
        ]
    );

    let steps: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::StepComplete)
        .map(|e| (e.data["step"].as_u64().unwrap(), e.data["node"].clone(), e.data["next"].clone()))
        .collect();
    assert_eq!(
        steps,
        vec![
            (1, json!("agent"), json!("action")),
            (2, json!("action"), json!("agent")),
            (3, json!("agent"), json!("end")),
        ]
    );

    // delta verbosity: only the messages each step added
    assert_eq!(events[2].data["messages"].as_array().unwrap().len(), 1);
    assert_eq!(events[7].data["status"], "completed");
    assert_eq!(events[7].data["steps"], 3);
    assert!(events[7].to_sse().starts_with("event: run_complete\ndata: "));
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_run() {
    let h = harness(ScriptedModel::new(looping_script(10)).with_latency(Duration::from_millis(50)));
    let runner = Runner::new(h.executor.clone());

    let mut stream = runner
        .stream_run("c1", None, Some("go".into()), config(""))
        .await
        .unwrap();
    while let Some(event) = stream.next().await {
        if event.kind == EventKind::StepComplete {
            break;
        }
    }
    drop(stream);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(h.model.remaining() >= 7);
    let latest = h.saver.get_latest("c1").await.unwrap().unwrap();
    assert!(!latest.metadata.next.is_empty());

    // the thread stays resumable from its last checkpoint
    let resumed = h.executor.invoke(config("c1").with_max_steps(1), None).await.unwrap();
    assert_eq!(resumed.steps, 1);
}

#[tokio::test]
async fn threads_run_independently() {
    let h = harness(ScriptedModel::new(vec![AiMessage::new("x"), AiMessage::new("y")]));
    let (a, b) = tokio::join!(
        h.executor.invoke(config("left"), Some("hi".into())),
        h.executor.invoke(config("right"), Some("hi".into())),
    );

    assert_eq!(a.unwrap().steps, 1);
    assert_eq!(b.unwrap().steps, 1);
    assert_eq!(h.saver.thread_count().await, 2);
}
