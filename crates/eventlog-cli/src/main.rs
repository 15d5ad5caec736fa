//! CLI entry point for eventlog.
//!
//! Provides the `eventlog` command: migrate a database, ingest a JSON
//! batch of events, and inspect what has been stored.

mod cli;
mod config;
mod helpers;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use eventlog_store::{Database, Event, EventFilter, EventStore};
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config::{load_config, AppConfig};
use crate::helpers::{init_tracing, resolve_db_path};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing("info");

    let mut config = load_config(&cli.config);
    config.database_path = resolve_db_path(
        cli.db,
        std::env::var("EVENTLOG_DB").ok(),
        &config.database_path,
    );

    match cli.command {
        Commands::Migrate => cmd_migrate(&config).await,
        Commands::Record { file } => cmd_record(&config, &file).await,
        Commands::EventTypes => cmd_event_types(&config).await,
        Commands::TraitTypes { event_type } => cmd_trait_types(&config, &event_type).await,
        Commands::Events {
            event_type,
            start,
            end,
        } => {
            let filter = EventFilter {
                start,
                end,
                event_type,
                traits: Vec::new(),
            };
            cmd_events(&config, &filter).await
        }
    }
}

async fn open_store(config: &AppConfig) -> Result<EventStore> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("failed to create data directory")?;
        }
    }
    EventStore::open(config.database_path.clone(), config.store.clone())
        .await
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

// ---------------------------------------------------------------------------
// Subcommand: migrate
// ---------------------------------------------------------------------------

async fn cmd_migrate(config: &AppConfig) -> Result<()> {
    let db = Database::open_and_migrate(config.database_path.clone())
        .await
        .with_context(|| format!("failed to migrate {}", config.database_path.display()))?;
    let version = db
        .execute(|conn| eventlog_store::migration::current_version(conn))
        .await?;
    println!("schema at version {version} ({})", config.database_path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: record
// ---------------------------------------------------------------------------

async fn cmd_record(config: &AppConfig, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let events: Vec<Event> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of events", file.display()))?;

    let store = open_store(config).await?;
    info!(
        count = events.len(),
        concurrency = store.config().recorder_concurrency,
        file = %file.display(),
        "recording events"
    );
    let report = store.record_events(&events).await;

    println!("recorded {}/{} events", report.succeeded(), report.attempted);
    for failure in &report.failures {
        println!("  {}: {}", failure.kind, failure.event.message_id);
    }
    if !report.is_complete() {
        warn!(failed = report.failures.len(), "batch recorded with failures");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands: inspection
// ---------------------------------------------------------------------------

async fn cmd_event_types(config: &AppConfig) -> Result<()> {
    let store = open_store(config).await?;
    for name in store.get_event_types().await? {
        println!("{name}");
    }
    Ok(())
}

async fn cmd_trait_types(config: &AppConfig, event_type: &str) -> Result<()> {
    let store = open_store(config).await?;
    for (name, data_type) in store.get_trait_types(event_type).await? {
        println!("{name}\t{data_type}");
    }
    Ok(())
}

async fn cmd_events(config: &AppConfig, filter: &EventFilter) -> Result<()> {
    let store = open_store(config).await?;
    for event in store.get_events(filter).await? {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}
