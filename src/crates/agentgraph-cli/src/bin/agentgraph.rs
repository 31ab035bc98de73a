//! agentgraph - checkpoint database tool
//!
//! Main entry point for the agentgraph command-line tool.

use agentgraph_cli::commands::{maintenance, threads};
use agentgraph_cli::{logging, ConfigLoader, Database};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agentgraph")]
#[command(about = "agentgraph - inspect and maintain agent checkpoint databases", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Checkpoint database, overrides the configured path
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Log level or filter directive, overrides the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List threads with their latest step and status
    Threads,

    /// Print a thread's state as JSON
    State {
        /// Thread ID
        thread_id: String,
        /// Checkpoint ID (defaults to the latest)
        #[arg(short, long)]
        checkpoint: Option<String>,
    },

    /// List a thread's checkpoints, most recent first
    History {
        /// Thread ID
        thread_id: String,
        /// Maximum number of checkpoints (defaults to history.limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print a thread's transcript
    Show {
        /// Thread ID
        thread_id: String,
        /// Checkpoint ID (defaults to the latest)
        #[arg(short, long)]
        checkpoint: Option<String>,
    },

    /// Append a human message to a thread
    Append {
        /// Thread ID
        thread_id: String,
        /// Message text
        text: String,
    },

    /// Check that every checkpoint chain is intact
    Verify {
        /// Thread ID
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        thread_id: Option<String>,
        /// Verify every thread in the database
        #[arg(long)]
        all: bool,
    },

    /// Upgrade checkpoints stored in older layouts
    Migrate,

    /// Delete a thread and all of its checkpoints
    Delete {
        /// Thread ID
        thread_id: String,
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::new().load()?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    logging::init(&config.logging.level);

    let path = cli.database.unwrap_or_else(|| config.database_path());
    let db = Database::open(&path).await?;

    let output = match cli.command {
        Commands::Threads => threads::list_threads(&db).await?,
        Commands::State { thread_id, checkpoint } => {
            threads::show_state(&db, &thread_id, checkpoint.as_deref()).await?
        }
        Commands::History { thread_id, limit } => {
            threads::show_history(&db, &thread_id, limit.unwrap_or(config.history.limit)).await?
        }
        Commands::Show { thread_id, checkpoint } => {
            threads::show_transcript(&db, &thread_id, checkpoint.as_deref()).await?
        }
        Commands::Append { thread_id, text } => threads::append_message(&db, &thread_id, &text).await?,
        Commands::Verify { thread_id, all: _ } => {
            let summary = maintenance::verify(&db, thread_id.as_deref()).await?;
            println!("{}", summary.render());
            if !summary.is_healthy() {
                anyhow::bail!("checkpoint verification failed");
            }
            return Ok(());
        }
        Commands::Migrate => maintenance::migrate(&db).await?,
        Commands::Delete { thread_id, yes } => {
            if !yes {
                anyhow::bail!("refusing to delete thread '{}' without --yes", thread_id);
            }
            maintenance::delete_thread(&db, &thread_id).await?
        }
    };

    println!("{}", output);
    Ok(())
}
