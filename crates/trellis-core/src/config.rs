//! Configuration management for Trellis.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (TRELLIS__ prefix, e.g. `TRELLIS__STORE__PATH`)
//! 2. Config file (trellis.toml)
//! 3. Defaults

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrellisConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Where and how the graph database is opened.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file (default: "./trellis.db").
    #[serde(default = "default_store_path")]
    pub path: String,

    /// How long a blocked statement waits on a locked database.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Use write-ahead logging so readers are not blocked during a write.
    #[serde(default = "default_true")]
    pub wal: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_store_path() -> String {
    "./trellis.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            wal: default_true(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl TrellisConfig {
    /// Load configuration from `{file_prefix}.toml` (optional) and the environment.
    pub fn load(file_prefix: &str) -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("TRELLIS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: TrellisConfig = cfg.try_deserialize()?;
        tracing::debug!(store_path = %loaded.store.path, "Configuration loaded");
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrellisConfig::default();
        assert_eq!(config.store.path, "./trellis.db");
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert!(config.store.wal);
        assert_eq!(config.log.level, "info");
        assert!(!config.log.json);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = TrellisConfig::load("definitely-not-a-trellis-config").unwrap();
        assert_eq!(config.store.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_partial_section_uses_field_defaults() {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(
                "[store]\npath = \"/tmp/graph.db\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let loaded: TrellisConfig = cfg.try_deserialize().unwrap();
        assert_eq!(loaded.store.path, "/tmp/graph.db");
        assert!(loaded.store.wal);
        assert_eq!(loaded.log.level, "info");
    }
}
