//! CLI configuration.
//!
//! Reads the `[store]` section of `config/default.toml` (or the file given
//! with `--config`). Every field falls back to its default when the file,
//! the section or the key is missing or malformed.

use std::path::{Path, PathBuf};

use eventlog_store::StoreConfig;

/// Settings resolved for one CLI run.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub store: StoreConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/eventlog.db"),
            store: StoreConfig::default(),
        }
    }
}

/// Load configuration from `path`, falling back to defaults.
pub fn load_config(path: &Path) -> AppConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(_) => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            AppConfig::default()
        }
    }
}

fn parse_config(content: &str) -> AppConfig {
    let defaults = AppConfig::default();

    let table: toml::Table = match content.parse() {
        Ok(t) => t,
        Err(err) => {
            tracing::warn!(%err, "config file is not valid TOML, using defaults");
            return defaults;
        }
    };

    let store = match table.get("store") {
        Some(toml::Value::Table(s)) => s,
        _ => return defaults,
    };

    AppConfig {
        database_path: store
            .get("database_path")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path),
        store: StoreConfig {
            cache_size: store
                .get("cache_size")
                .and_then(|v| v.as_integer())
                .map(|v| v.max(1) as usize)
                .unwrap_or(defaults.store.cache_size),
            recorder_concurrency: store
                .get("recorder_concurrency")
                .and_then(|v| v.as_integer())
                .map(|v| v.max(1) as usize)
                .unwrap_or(defaults.store.recorder_concurrency),
        },
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_section() {
        let config = parse_config(
            r#"
            [store]
            database_path = "/var/lib/eventlog/events.db"
            cache_size = 5000
            recorder_concurrency = 8
            "#,
        );
        assert_eq!(config.database_path, PathBuf::from("/var/lib/eventlog/events.db"));
        assert_eq!(config.store.cache_size, 5000);
        assert_eq!(config.store.recorder_concurrency, 8);
    }

    #[test]
    fn missing_keys_fall_back() {
        let config = parse_config("[store]\ncache_size = 10\n");
        assert_eq!(config.store.cache_size, 10);
        assert_eq!(config.store.recorder_concurrency, 1);
        assert_eq!(config.database_path, AppConfig::default().database_path);
    }

    #[test]
    fn nonpositive_sizes_are_clamped() {
        let config = parse_config("[store]\ncache_size = 0\nrecorder_concurrency = -3\n");
        assert_eq!(config.store.cache_size, 1);
        assert_eq!(config.store.recorder_concurrency, 1);
    }

    #[test]
    fn invalid_toml_uses_defaults() {
        assert_eq!(parse_config("[store"), AppConfig::default());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(&dir.path().join("absent.toml")), AppConfig::default());
    }
}
