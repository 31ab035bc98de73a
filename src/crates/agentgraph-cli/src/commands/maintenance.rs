//! Database maintenance: `verify`, `migrate`, `delete`

use agentgraph_checkpoint::{verify_chain, ChainReport};
use colored::Colorize;
use tracing::warn;

use super::Database;
use crate::error::{CliError, Result};

/// Outcome of `verify`
#[derive(Debug)]
pub struct VerifySummary {
    pub reports: Vec<ChainReport>,
    /// Threads whose chain could not be walked, with the reason
    pub broken: Vec<(String, String)>,
}

impl VerifySummary {
    /// No broken chains and no forks
    pub fn is_healthy(&self) -> bool {
        self.broken.is_empty() && self.reports.iter().all(ChainReport::is_linear)
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for report in &self.reports {
            let line = format!(
                "{}: {} of {} checkpoints on the head chain",
                report.thread_id, report.length, report.total
            );
            lines.push(if report.is_linear() {
                format!("{} {}", "✓".green(), line)
            } else {
                format!("{} {} (forked)", "⚠".yellow(), line)
            });
        }
        for (thread_id, reason) in &self.broken {
            lines.push(format!("{} {}: {}", "✗".red(), thread_id, reason));
        }
        if lines.is_empty() {
            lines.push("No threads found".yellow().to_string());
        }
        lines.join("\n")
    }
}

/// `verify`: walk parent links of one thread, or of every thread
pub async fn verify(db: &Database, thread_id: Option<&str>) -> Result<VerifySummary> {
    let thread_ids = match thread_id {
        Some(id) => vec![id.to_string()],
        None => db.saver().thread_ids().await?,
    };

    let mut summary = VerifySummary {
        reports: Vec::new(),
        broken: Vec::new(),
    };
    for thread_id in thread_ids {
        match verify_chain(db.saver().as_ref(), &thread_id).await {
            Ok(report) if report.head.is_none() => return Err(CliError::UnknownThread(thread_id)),
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "Checkpoint chain is broken");
                summary.broken.push((thread_id, e.to_string()));
            }
        }
    }
    Ok(summary)
}

/// `migrate`: rewrite checkpoints stored in older layouts
pub async fn migrate(db: &Database) -> Result<String> {
    let upgraded = db.saver().migrate_legacy().await?;
    Ok(if upgraded == 0 {
        "All checkpoints already use the current layout".to_string()
    } else {
        format!("{} Upgraded {} checkpoint(s)", "✓".green(), upgraded)
    })
}

/// `delete`: drop every checkpoint of a thread
pub async fn delete_thread(db: &Database, thread_id: &str) -> Result<String> {
    if db.threads().get_state(thread_id).await?.is_none() {
        return Err(CliError::UnknownThread(thread_id.to_string()));
    }
    db.threads().delete_thread(thread_id).await?;
    Ok(format!("{} Deleted thread {}", "✓".green(), thread_id))
}
