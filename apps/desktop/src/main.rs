use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{HttpComicApi, ScanHistory, ScanOutcome, ViewController};
use shared::domain::HistoryEntryId;
use storage::Storage;
use tracing_subscriber::EnvFilter;

mod interactive;
mod render;

#[derive(Parser, Debug)]
#[command(name = "scan-comic", about = "Turn dependency scans into security comics")]
struct Cli {
    #[arg(long, env = "SCAN_COMIC_SERVER_URL", default_value = "http://localhost:8000")]
    server_url: String,
    /// SQLite file (or `sqlite:` url) holding local scan history.
    #[arg(long, env = "SCAN_COMIC_HISTORY_DB", default_value = "./data/history.db")]
    history_db: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Upload, browse stories and generate comics from a prompt (default).
    Interactive,
    /// Scan one manifest and print its stories.
    Scan { path: PathBuf },
    /// List past scans, or show one entry.
    History {
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let database_url = history_database_url(&cli.history_db);
    let storage = Storage::new(&database_url)
        .await
        .with_context(|| format!("failed to open history database '{database_url}'"))?;
    let history: Arc<dyn ScanHistory> = Arc::new(storage);

    match cli.command.unwrap_or(Command::Interactive) {
        Command::Interactive => {
            let controller = ViewController::new(api(&cli.server_url)?, history);
            interactive::run(controller).await
        }
        Command::Scan { path } => {
            let controller = ViewController::new(api(&cli.server_url)?, history);
            scan_once(&controller, &path).await
        }
        Command::History { id: Some(id) } => {
            let Some(entry) = history.load_entry(&HistoryEntryId::from(id.as_str())).await? else {
                bail!("no history entry '{id}'");
            };
            print!("{}", render::history_entry(&entry));
            Ok(())
        }
        Command::History { id: None } => {
            print!("{}", render::history_list(&history.list_entries().await?));
            Ok(())
        }
    }
}

/// Quiet by default so log lines do not interleave with the screens.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn api(server_url: &str) -> Result<Arc<HttpComicApi>> {
    let api = HttpComicApi::new(server_url)
        .with_context(|| format!("failed to build http client for '{server_url}'"))?;
    Ok(Arc::new(api))
}

fn history_database_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("sqlite:") {
        return raw.to_string();
    }
    format!("sqlite://{}", raw.replace('\\', "/"))
}

async fn scan_once(controller: &ViewController, path: &Path) -> Result<()> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let outcome = controller.upload(&filename, content).await?;
    let snapshot = controller.snapshot().await;
    print!("{}", render::screen(&snapshot));
    match outcome {
        ScanOutcome::Completed {
            history_entry: Some(entry_id),
        } => println!("saved to history as {entry_id}"),
        ScanOutcome::Failed(message) => bail!(message),
        _ => {}
    }
    Ok(())
}
