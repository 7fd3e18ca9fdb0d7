//! Ground-service configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) gives a working server. Command-line flags override the
//! file.
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//!
//! [storage]
//! backend = "redb"
//! data_dir = "/var/lib/dronepost"
//!
//! [retention]
//! telemetry_days = 30
//! sweep_interval_secs = 3600
//!
//! [queries]
//! history_limit = 50
//! correlation_window_ms = 5000
//! ```

use dronepost_shared::limits;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the redb database inside `data_dir`
pub const DATABASE_FILE: &str = "dronepost.redb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Ephemeral, lost on restart
    Memory,
    /// redb file under `data_dir`
    Redb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub storage: StorageConfig,
    pub retention: RetentionConfig,
    pub queries: QueryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Telemetry older than this many days is purged; 0 disables the sweep
    pub telemetry_days: u32,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub history_limit: usize,
    pub telemetry_list_limit: usize,
    pub stats_window_hours: f64,
    pub correlation_window_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            storage: StorageConfig::default(),
            retention: RetentionConfig::default(),
            queries: QueryConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Redb,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            telemetry_days: limits::DEFAULT_RETENTION_DAYS,
            sweep_interval_secs: 3600,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            history_limit: limits::DEFAULT_HISTORY_LIMIT,
            telemetry_list_limit: limits::DEFAULT_TELEMETRY_LIST_LIMIT,
            stats_window_hours: limits::DEFAULT_STATS_WINDOW_HOURS,
            correlation_window_ms: limits::CORRELATION_WINDOW_MS,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the services cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        let q = &self.queries;
        anyhow::ensure!(q.history_limit > 0, "queries.history_limit must be positive");
        anyhow::ensure!(
            q.telemetry_list_limit > 0,
            "queries.telemetry_list_limit must be positive"
        );
        anyhow::ensure!(
            q.stats_window_hours.is_finite() && q.stats_window_hours > 0.0,
            "queries.stats_window_hours must be positive"
        );
        anyhow::ensure!(
            self.retention.sweep_interval_secs > 0,
            "retention.sweep_interval_secs must be positive"
        );
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join(DATABASE_FILE)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.queries.correlation_window_ms, 5000);
        assert_eq!(config.storage.backend, StorageBackend::Redb);
    }

    #[test]
    fn test_partial_sections() {
        let config = ServerConfig::from_toml(
            r#"
            listen = "127.0.0.1:9000"

            [storage]
            backend = "memory"

            [queries]
            history_limit = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
        assert_eq!(config.queries.history_limit, 10);
        assert_eq!(config.queries.telemetry_list_limit, 100);
        assert_eq!(config.retention.telemetry_days, 30);
    }

    #[test]
    fn test_rejects_unusable_values() {
        assert!(ServerConfig::from_toml("[queries]\nhistory_limit = 0").is_err());
        assert!(ServerConfig::from_toml("[queries]\nstats_window_hours = -1.0").is_err());
        assert!(ServerConfig::from_toml("[storage]\nbackend = \"sqlite\"").is_err());
    }

    #[test]
    fn test_database_path() {
        let mut config = ServerConfig::default();
        config.storage.data_dir = PathBuf::from("/var/lib/dronepost");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/dronepost/dronepost.redb")
        );
    }
}
