//! Shared helper functions used across CLI subcommands.

use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the given default log level.
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Pick the database path: `--db`, then `EVENTLOG_DB`, then the config file.
pub fn resolve_db_path(flag: Option<PathBuf>, env: Option<String>, configured: &Path) -> PathBuf {
    flag.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| configured.to_path_buf())
}
