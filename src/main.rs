// courier server binary

use anyhow::{Context, Result};
use clap::Parser;
use courier::{Cli, MessageStore, Server};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config();

    let store = Arc::new(
        MessageStore::open(&config.db_path)
            .with_context(|| format!("failed to open store at {}", config.db_path.display()))?,
    );

    let server = Server::bind(config, store).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_shutdown_listeners(shutdown_tx);

    tracing::info!("press 'q' then enter (or Ctrl-C) to shut down");
    server.run(shutdown_rx).await
}

/// Wire the external shutdown triggers into the watch signal: Ctrl-C and a
/// console line reading "q".
fn spawn_shutdown_listeners(shutdown_tx: watch::Sender<bool>) {
    let tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            let _ = tx.send(true);
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().eq_ignore_ascii_case("q") {
                tracing::info!("console shutdown requested");
                let _ = shutdown_tx.send(true);
                break;
            }
        }
    });
}
