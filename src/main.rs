//! Chatroom console - interactive command-line client for the chat server.
//!
//! Parses configuration, sets up file logging so the console stays clean,
//! connects, and runs the command loop. Ctrl-C and SIGTERM release the
//! connection and exit cleanly.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatroom_console::app::{self, App, Output};
use chatroom_console::config::{Cli, ClientConfig};
use chatroom_console::net::ChatClient;

/// Log to `path` rather than the terminal the operator is typing into.
fn init_logging(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "chatroom=info,chatroom_console=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}

/// Resolves on Ctrl-C or (unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to set up SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Release the connection and exit as soon as a shutdown signal arrives.
fn spawn_signal_handler(client: Arc<ChatClient>, out: Output) {
    tokio::spawn(async move {
        app::release_on_shutdown(shutdown_signal(), client, out).await;
        std::process::exit(0);
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ClientConfig::from_cli(&cli)?;

    init_logging(&config.log_file)?;
    info!(
        "Starting chatroom console v{} (server {})",
        env!("CARGO_PKG_VERSION"),
        config.endpoint
    );

    let client = Arc::new(ChatClient::from_config(&config));
    let out = Output::stdout();

    spawn_signal_handler(Arc::clone(&client), out.clone());
    if let Some(notifications) = client.take_notifications() {
        app::spawn_notification_printer(&client, notifications, out.clone());
    }

    let mut console = App::new(Arc::clone(&client), tokio::io::stdin(), out);
    console.connect().await?;

    if let Err(e) = console.run().await {
        client.release();
        tracing::error!("Console error: {:#}", e);
        eprintln!("Error: {:#}", e);
        return Err(e);
    }

    info!("Chatroom console exited cleanly");
    Ok(())
}
