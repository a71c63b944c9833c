//! iLoved marketplace node.
//!
//! Hosts the document store and blob store in memory and serves the
//! marketplace over HTTP, with a WebSocket feed per open conversation.
//! State is loaded from a JSON file on startup, saved whenever the store
//! has changed since the last save, and saved once more on shutdown.
//!
//! `iloved-node migrate` folds legacy conversation records into the
//! canonical layout and exits.

mod api;
mod persist;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use iloved_docstore::{MemoryBlobStore, MemoryStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::AppState;
use crate::persist::{default_state_path, load_state, save_state, PersistedState};

/// Compile-time override for the public blob URL prefix.
const BLOB_BASE_URL: Option<&str> = option_env!("ILOVED_BLOB_BASE_URL");

#[derive(Parser)]
#[command(name = "iloved-node", about = "iLoved marketplace node")]
struct Cli {
    /// HTTP port to listen on.
    #[arg(long, default_value_t = 8640)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// State file (default: <data dir>/iloved/state.json).
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Public prefix for blob URLs (default: http://<bind>:<port>/blobs).
    #[arg(long)]
    blob_base_url: Option<String>,

    /// Seconds between state saves.
    #[arg(long, default_value_t = 5)]
    save_interval: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Migrate legacy conversation records, save, and exit.
    Migrate,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// ─── State ──────────────────────────────────────────────────────────────────

struct Node {
    store: Arc<MemoryStore>,
    blobs: Arc<MemoryBlobStore>,
    state_path: PathBuf,
}

impl Node {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let state_path = cli.state_file.clone().unwrap_or_else(default_state_path);
        let blob_base_url = cli
            .blob_base_url
            .clone()
            .or_else(|| BLOB_BASE_URL.map(str::to_string))
            .unwrap_or_else(|| format!("http://{}:{}/blobs", cli.bind, cli.port));

        let (store, blobs) = match load_state(&state_path)? {
            Some(state) => state.restore(&blob_base_url)?,
            None => {
                tracing::info!(path = %state_path.display(), "no saved state, starting empty");
                (MemoryStore::new(), MemoryBlobStore::new(blob_base_url))
            }
        };
        Ok(Self {
            store: Arc::new(store),
            blobs: Arc::new(blobs),
            state_path,
        })
    }

    fn save(&self) -> anyhow::Result<u64> {
        let state = PersistedState::capture(&self.store, &self.blobs)?;
        let revision = state.store.revision;
        save_state(&self.state_path, &state)?;
        Ok(revision)
    }
}

/// Save whenever the store revision has moved. Blob uploads always come
/// with a document write, so the revision covers them too.
async fn autosave(node: Arc<Node>, every: Duration) {
    let mut saved = node.store.revision();
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        if node.store.revision() == saved {
            continue;
        }
        match node.save() {
            Ok(revision) => saved = revision,
            Err(e) => tracing::warn!(error = %e, "autosave failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

// ─── Commands ───────────────────────────────────────────────────────────────

async fn serve(cli: &Cli, node: Arc<Node>) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        store: node.store.clone(),
        blobs: node.blobs.clone(),
    });
    let app = api::router(state);

    let saver = tokio::spawn(autosave(node.clone(), Duration::from_secs(cli.save_interval.max(1))));

    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, state = %node.state_path.display(), "node listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    saver.abort();
    node.save()?;
    Ok(())
}

async fn migrate(node: &Node) -> anyhow::Result<()> {
    let report = iloved_inbox::migrate_legacy(&*node.store).await?;
    node.save()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let node = Arc::new(Node::open(&cli)?);

    match &cli.command {
        None | Some(Command::Serve) => serve(&cli, node).await,
        Some(Command::Migrate) => migrate(&node).await,
    }
}
