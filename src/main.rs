//! driftkv - A Durable In-Memory Key-Value Server
//!
//! This is the main entry point for the driftkv server.
//! It replays the append log, starts the expiry sweeper, and serves clients
//! until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use driftkv::commands::CommandHandler;
use driftkv::config::Config;
use driftkv::connection::{handle_connection, ConnectionStats};
use driftkv::persistence::{needs_replay, replay_log, AppendLog};
use driftkv::storage::{ExpirySweeper, StorageEngine};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

fn print_banner(config: &Config) {
    let persistence = match config.aof() {
        Some(path) => format!("append log at {}", path.display()),
        None => "in-memory only".to_string(),
    };

    println!(
        r#"
driftkv v{} - Durable In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Server started on {}
Persistence: {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        driftkv::VERSION,
        config.bind_address(),
        persistence
    );
}

fn open_log(path: &Path) -> anyhow::Result<Option<Arc<AppendLog>>> {
    let log = AppendLog::open(path)
        .with_context(|| format!("failed to open append log {}", path.display()))?;
    Ok(Some(Arc::new(log)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(&config);

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());
    info!("Storage engine initialized with 64 shards");

    // Rebuild state from the log before anyone can connect
    let log = match config.aof() {
        Some(path) if needs_replay(path) => {
            let report = replay_log(path, Arc::clone(&storage))
                .with_context(|| format!("failed to replay {}", path.display()))?;
            if report.discarded_bytes > 0 {
                warn!(
                    discarded_bytes = report.discarded_bytes,
                    "Append log had an incomplete trailing record"
                );
            }
            info!(records = report.records, keys = storage.len(), "State restored");
            open_log(path)?
        }
        Some(path) => {
            info!(path = %path.display(), "No append log to replay, starting empty");
            open_log(path)?
        }
        None => {
            info!("Append log disabled, running in memory only");
            None
        }
    };

    let handler = match log {
        Some(log) => CommandHandler::with_log(Arc::clone(&storage), log),
        None => CommandHandler::new(Arc::clone(&storage)),
    };

    let _sweeper = ExpirySweeper::start(Arc::clone(&storage), config.expiry());

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Listening");

    print_banner(&config);

    let permits = Arc::new(Semaphore::new(config.max_connections as usize));

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, handler, stats, permits) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Accepts connections while a permit is free, one task per client.
async fn accept_loop(
    listener: TcpListener,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    permits: Arc<Semaphore>,
) {
    loop {
        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = handler.clone();
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats).await;
                    drop(permit);
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
