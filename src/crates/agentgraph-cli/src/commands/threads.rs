//! Thread inspection and editing: `threads`, `state`, `history`, `show`, `append`

use agentgraph_checkpoint::{CheckpointConfig, CheckpointSaver};
use agentgraph_core::{Message, MessageInput, StateSnapshot};
use colored::Colorize;
use tabled::{Table, Tabled};

use super::{join_or_dash, source_label, Database};
use crate::error::{CliError, Result};

#[derive(Tabled)]
struct ThreadRow {
    #[tabled(rename = "Thread")]
    thread_id: String,
    #[tabled(rename = "Step")]
    step: i64,
    #[tabled(rename = "Messages")]
    messages: usize,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Checkpoint")]
    checkpoint_id: String,
    #[tabled(rename = "Step")]
    step: i64,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Next")]
    next: String,
    #[tabled(rename = "Messages")]
    messages: usize,
    #[tabled(rename = "Created")]
    created: String,
}

fn status_of(snapshot: &StateSnapshot) -> String {
    match (&snapshot.metadata.stop_reason, snapshot.is_finished()) {
        (Some(reason), _) => format!("stopped ({})", reason),
        (None, true) => "finished".to_string(),
        (None, false) => format!("waiting at {}", join_or_dash(&snapshot.next)),
    }
}

async fn snapshot(db: &Database, thread_id: &str, checkpoint_id: Option<&str>) -> Result<StateSnapshot> {
    let mut config = CheckpointConfig::new(thread_id);
    if let Some(id) = checkpoint_id {
        config = config.with_checkpoint_id(id);
    }
    match db.threads().get_state_at(&config).await? {
        Some(snapshot) => Ok(snapshot),
        None => Err(match checkpoint_id {
            Some(id) => CliError::UnknownCheckpoint {
                thread_id: thread_id.to_string(),
                checkpoint_id: id.to_string(),
            },
            None => CliError::UnknownThread(thread_id.to_string()),
        }),
    }
}

/// `threads`: one row per stored thread
pub async fn list_threads(db: &Database) -> Result<String> {
    let store = db.threads();
    let mut rows = Vec::new();
    for thread_id in db.saver().thread_ids().await? {
        let Some(snapshot) = store.get_state(&thread_id).await? else {
            continue;
        };
        rows.push(ThreadRow {
            step: snapshot.metadata.step,
            messages: snapshot.messages().len(),
            status: status_of(&snapshot),
            updated: snapshot.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            thread_id,
        });
    }

    if rows.is_empty() {
        return Ok("No threads found".yellow().to_string());
    }
    let count = rows.len();
    Ok(format!("{}\n{} thread(s)", Table::new(rows), count))
}

/// `state`: latest (or given) checkpoint of a thread as JSON
pub async fn show_state(db: &Database, thread_id: &str, checkpoint_id: Option<&str>) -> Result<String> {
    let snapshot = snapshot(db, thread_id, checkpoint_id).await?;
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

/// `history`: most recent checkpoints first
pub async fn show_history(db: &Database, thread_id: &str, limit: usize) -> Result<String> {
    let history = db.threads().get_history(thread_id, Some(limit)).await?;
    if history.is_empty() {
        return Err(CliError::UnknownThread(thread_id.to_string()));
    }

    let rows: Vec<HistoryRow> = history
        .iter()
        .map(|snapshot| HistoryRow {
            checkpoint_id: snapshot.checkpoint_id.clone(),
            step: snapshot.metadata.step,
            source: source_label(snapshot.metadata.source).to_string(),
            next: join_or_dash(&snapshot.next),
            messages: snapshot.messages().len(),
            created: snapshot.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();
    Ok(Table::new(rows).to_string())
}

/// `show`: the transcript, one block per message
pub async fn show_transcript(db: &Database, thread_id: &str, checkpoint_id: Option<&str>) -> Result<String> {
    let snapshot = snapshot(db, thread_id, checkpoint_id).await?;

    let mut out = Vec::new();
    for message in snapshot.messages().iter() {
        out.push(render_message(message));
    }
    out.push(format!("{} {}", "status:".dimmed(), status_of(&snapshot)));
    Ok(out.join("\n"))
}

fn render_message(message: &Message) -> String {
    match message {
        Message::Human(m) => format!("{} {}", "[human]".cyan().bold(), m.content),
        Message::System(m) => format!("{} {}", "[system]".dimmed(), m.content),
        Message::Ai(m) => {
            let mut lines = vec![format!("{} {}", "[ai]".green().bold(), m.content)];
            for call in &m.tool_calls {
                lines.push(format!("  -> {}({}) [{}]", call.name, call.args, call.id));
            }
            for invalid in &m.invalid_tool_calls {
                lines.push(format!("  -> {} [{}]", "invalid call".red(), invalid.error));
            }
            lines.join("\n")
        }
        Message::ToolResult(m) => {
            let label = format!("[tool {}]", m.name.as_deref().unwrap_or("?"));
            let label = if m.is_error { label.red().bold() } else { label.magenta().bold() };
            format!("{} {}", label, m.text())
        }
    }
}

/// `append`: add a human message outside of a run
pub async fn append_message(db: &Database, thread_id: &str, text: &str) -> Result<String> {
    let config = db
        .threads()
        .update_state(thread_id, MessageInput::from(Message::human(text)))
        .await?;
    let latest = db.saver().get_latest(thread_id).await?;
    let next = latest.map(|cp| join_or_dash(&cp.metadata.next)).unwrap_or_default();
    Ok(format!(
        "{} checkpoint {} (next: {})",
        "✓ Appended message,".green(),
        config.checkpoint_id.unwrap_or_default(),
        next
    ))
}
