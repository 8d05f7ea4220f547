//! offq - ファイルに保存したオフラインキューを操作するデモ CLI
//!
//! キューは `--data-dir` 以下の JSON ファイルに保存される。`replay` 以外の
//! コマンドはオフラインのまま動くので、キューの中身を確認・編集するだけで
//! handler は呼ばれない。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use offq_core::impls::{FileStore, ManualConnectivity};
use offq_core::typed::DynHandler;
use offq_core::{
    ActionType, Enqueued, HandlerError, MutationId, MutationQueue, NewMutation, QueueConfig,
    QueueEvent,
};

const DEFAULT_DATA_DIR: &str = ".offq";

#[derive(Parser)]
#[command(name = "offq")]
#[command(about = "Inspect and replay a file-backed offline mutation queue")]
struct Cli {
    /// TOML config file (`data_dir` and a `[queue]` table)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the queue file (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue a mutation
    Enqueue {
        /// Handler action identifier
        #[arg(long)]
        action: String,

        /// Mutation id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// JSON payload passed to the handler
        #[arg(long, default_value = "{}")]
        payload: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// List mutations waiting for replay
    List {
        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show queue counts
    Status,

    /// Go online and run one replay pass with the demo handlers
    #[command(after_help = "Examples:\n  \
        offq replay                          Every action succeeds\n  \
        offq replay --fail-action notes.sync Mutations for notes.sync fail")]
    Replay {
        /// Actions whose handler should fail (repeatable)
        #[arg(long = "fail-action")]
        fail_actions: Vec<String>,
    },

    /// Remove one mutation by id
    Remove { id: String },

    /// Remove every mutation
    Clear,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    queue: QueueConfig,
}

fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Demo handler: logs the payload and succeeds.
struct EchoHandler {
    action: ActionType,
}

#[async_trait]
impl DynHandler for EchoHandler {
    async fn handle_dyn(&self, payload: &serde_json::Value) -> Result<(), HandlerError> {
        tracing::info!(action = %self.action, %payload, "echo");
        Ok(())
    }
}

/// Demo handler for `--fail-action`.
struct RejectHandler;

#[async_trait]
impl DynHandler for RejectHandler {
    async fn handle_dyn(&self, _payload: &serde_json::Value) -> Result<(), HandlerError> {
        Err(HandlerError::new("rejected by --fail-action"))
    }
}

fn print_event(event: &QueueEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!(error = %e, "failed to encode event"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    let file_config = load_config(cli.config.as_deref())?;
    let data_dir = cli
        .data_dir
        .or(file_config.data_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    // replay でだけオンラインに切り替える
    let net = Arc::new(ManualConnectivity::offline());
    let queue = MutationQueue::builder()
        .config(file_config.queue)
        .store(FileStore::new(&data_dir))
        .connectivity(Arc::clone(&net))
        .build()
        .context("failed to build queue")?;
    queue.initialize().await;

    let result = run(&queue, &net, cli.command).await;
    queue.destroy();
    result
}

async fn run(queue: &MutationQueue, net: &ManualConnectivity, command: Command) -> Result<()> {
    match command {
        Command::Enqueue {
            action,
            id,
            payload,
            description,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("--payload is not valid JSON")?;
            let id = id.map(MutationId::from).unwrap_or_else(MutationId::generate);
            let mutation = NewMutation::new(id.clone(), action, payload).with_description(description);
            match queue.enqueue(mutation).await? {
                Enqueued::Accepted => println!("queued {id}"),
                Enqueued::Duplicate => println!("{id} is already queued"),
            }
        }

        Command::List { json } => {
            let pending = queue.get_pending_mutations();
            if json {
                println!("{}", serde_json::to_string_pretty(&pending)?);
            } else if pending.is_empty() {
                println!("queue is empty");
            } else {
                for m in pending {
                    let error = m.last_error.as_deref().unwrap_or("-");
                    println!(
                        "{}\t{}\t{}\tretries={}\t{}\t{:?}\tlast_error={}",
                        m.id,
                        m.queued_at.to_rfc3339(),
                        m.status,
                        m.retry_count,
                        m.action,
                        m.description,
                        error,
                    );
                }
            }
        }

        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&queue.status())?);
        }

        Command::Replay { fail_actions } => {
            let fail: BTreeSet<String> = fail_actions.into_iter().collect();
            let actions: BTreeSet<ActionType> = queue
                .get_pending_mutations()
                .into_iter()
                .map(|m| m.action)
                .collect();
            for action in actions {
                let handler: Arc<dyn DynHandler> = if fail.contains(action.as_str()) {
                    Arc::new(RejectHandler)
                } else {
                    Arc::new(EchoHandler {
                        action: action.clone(),
                    })
                };
                queue.register_handler(action, handler);
            }

            let _events = queue.add_event_listener(print_event);
            net.go_online();
            queue.settle().await;

            let status = queue.status();
            tracing::info!(
                remaining = status.pending_count(),
                exhausted = status.exhausted,
                "replay finished"
            );
        }

        Command::Remove { id } => {
            if queue.remove_mutation(&MutationId::new(id.as_str())).await? {
                println!("removed {id}");
            } else {
                println!("{id} not found");
            }
        }

        Command::Clear => {
            let removed = queue.clear_all().await?;
            println!("removed {removed} mutation(s)");
        }
    }
    Ok(())
}
