//! Items Indexer
//!
//! Keeps the `items` search index in sync with the item store.
//!
//! ## Architecture
//!
//! ```text
//! Item Service (OutboxMirror)
//!   ↓ (appends mirror events)
//! MongoDB (item_index_outbox)
//!   ↓ (polled in id order)
//! IndexMirrorRelay
//!   ↓ (upsert / delete, retried with backoff)
//! Meilisearch (items)
//! ```
//!
//! ## Commands
//!
//! - `relay` (default): drain the outbox until SIGINT/SIGTERM
//! - `reindex`: push every stored item into the index and exit

pub mod config;

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use database::mongodb::{check_health_detailed, connect_from_config_with_retry};
use domain_items::{
    IndexMirrorRelay, ItemRepository, MongoItemRepository, MongoOutboxRepository,
    OutboxRepository,
};
use domain_search::{ITEMS_INDEX, MeiliSearchClient, SearchIndex};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use config::IndexerConfig;

#[derive(Debug, Parser)]
#[command(name = "items-indexer")]
#[command(about = "Mirror marketplace items into the search index")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Apply pending outbox events until shut down
    Relay,

    /// Push every stored item into the index, then exit
    Reindex,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Relay)
    }
}

/// Run the indexer
///
/// Startup order:
/// 1. color-eyre and tracing (JSON for prod, pretty for dev)
/// 2. Configuration from the environment
/// 3. MongoDB connection with retry
/// 4. Meilisearch health check and `items` index creation
///
/// Both clients are released before returning, whatever the command outcome.
pub async fn run(cli: Cli) -> Result<()> {
    install_color_eyre();
    let environment = Environment::from_env();
    init_tracing(&environment);

    let command = cli.command();
    info!(?command, "Starting items indexer");

    let config = IndexerConfig::from_env().wrap_err("Failed to load indexer configuration")?;

    info!("Connecting to MongoDB...");
    let client = connect_from_config_with_retry(&config.mongo, None)
        .await
        .wrap_err("Failed to connect to MongoDB")?;
    let db = client.database(config.mongo.database());
    let health = check_health_detailed(&db).await;
    if !health.healthy {
        eyre::bail!(
            "MongoDB health check failed: {}",
            health.message.unwrap_or_default()
        );
    }
    info!(
        database = %config.mongo.database(),
        response_time_ms = health.response_time_ms,
        "Connected to MongoDB successfully"
    );

    info!(host = %config.meili.host, "Connecting to Meilisearch...");
    let search = MeiliSearchClient::connect(&config.meili)
        .await
        .wrap_err("Failed to connect to Meilisearch")?;
    search
        .ensure_index(ITEMS_INDEX, "id")
        .await
        .wrap_err_with(|| format!("Failed to initialize the '{ITEMS_INDEX}' index"))?;

    let relay = IndexMirrorRelay::new(
        Arc::new(MongoOutboxRepository::new(db.clone())),
        Arc::new(MongoItemRepository::new(db)),
        Arc::new(search.clone()),
        config.relay.clone(),
    );

    let outcome = match command {
        Command::Relay => run_relay(&relay).await,
        Command::Reindex => relay
            .reindex_all()
            .await
            .map(|count| info!(count, "Reindex complete"))
            .wrap_err("Reindex failed"),
    };

    // Collection handles must be gone before the client shuts down
    drop(relay);
    search.shutdown();
    client.shutdown().await;

    info!("Items indexer stopped");
    outcome
}

async fn run_relay<O, R>(relay: &IndexMirrorRelay<O, R>) -> Result<()>
where
    O: OutboxRepository,
    R: ItemRepository,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    relay.run(shutdown_rx).await.wrap_err("Outbox relay failed")
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to install Ctrl+C handler")?;
                info!("Received Ctrl+C, initiating shutdown...");
            },
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            },
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .wrap_err("Failed to install Ctrl+C handler")?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}
