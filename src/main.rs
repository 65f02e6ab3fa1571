//! signspell-daemon: commits hand-sign classifications into typed text
//!
//! The daemon consumes one classifier result per camera frame and turns
//! the noisy stream into committed letters and control actions:
//! - Classification feed on stdin (one JSON frame per line)
//! - Debounced majority-vote commit state machine
//! - IPC server for status queries, frame submission and event push
//!
//! Landmark extraction, classifier inference and rendering live outside
//! this process.

mod alphabet;
mod config;
mod events;
mod feed;
mod ipc;
mod lifecycle;
mod output;
mod state;

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::CommitEvent;
use crate::feed::ClassificationFeed;
use crate::ipc::{Server, ServerContext};
use crate::lifecycle::ShutdownSignal;
use crate::output::TextBuffer;
use crate::state::CommitStateMachine;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "signspell-daemon starting"
    );

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        threshold = config.commit.confidence_threshold,
        dwell_ms = config.commit.dwell_duration_ms,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    // Feed and IPC -> state machine
    let (input_tx, input_rx) = mpsc::channel(64);
    // State machine -> IPC subscribers
    let (event_tx, _event_rx) = broadcast::channel::<CommitEvent>(64);

    let mut state_machine = CommitStateMachine::new(
        config.commit,
        Duration::from_millis(config.poll_interval_ms),
        TextBuffer::new(),
        event_tx.clone(),
    );

    // Start the classification feed (runs on dedicated thread)
    let feed = ClassificationFeed::new(input_tx.clone());
    match feed.start() {
        Ok(()) => {
            info!("classification feed started");
        }
        Err(e) => {
            error!(?e, "failed to start classification feed");
            warn!("continuing with IPC frame submission only");
        }
    }

    let context = ServerContext::new(state_machine.status(), input_tx, event_tx.clone());
    let server = Server::new(&config.socket_path, context)?;

    // Log committed output for operators watching the daemon
    let mut log_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the state machine (processes frames and poll ticks)
        _ = state_machine.run(input_rx) => {
            info!("state machine exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(CommitEvent::OutputChanged { text }) => {
                        info!(%text, "output");
                    }
                    Ok(CommitEvent::SearchRequested { url, .. }) => {
                        info!(%url, "search");
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "commit event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("commit event logger exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    if feed.is_running() {
        feed.stop();
    }
    server.shutdown().await;

    info!("signspell-daemon stopped");

    Ok(())
}
