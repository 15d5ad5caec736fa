//! CLI argument definitions for eventlog.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

/// eventlog -- telemetry event storage.
#[derive(Parser)]
#[command(
    name = "eventlog",
    version,
    about = "eventlog -- telemetry event storage",
    long_about = "Records batches of typed telemetry events into SQLite and queries them back."
)]
pub struct Cli {
    /// Database file (overrides config and EVENTLOG_DB).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Configuration file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database if needed and apply pending migrations.
    Migrate,

    /// Record a JSON array of events from a file.
    Record {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// List known event types.
    EventTypes,

    /// List the trait names and data types seen on an event type.
    TraitTypes {
        /// Event type name.
        event_type: String,
    },

    /// Print stored events as JSON lines.
    Events {
        /// Only events of this type.
        #[arg(long)]
        event_type: Option<String>,

        /// Inclusive lower bound (RFC 3339).
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Exclusive upper bound (RFC 3339).
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
}
