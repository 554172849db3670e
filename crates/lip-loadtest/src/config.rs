use std::path::{Path, PathBuf};
use std::time::Duration;

use lip_stream::StreamConfig;
use lip_types::{LedgerRange, NetworkId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a [`ReplayConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid replay config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize replay config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Settings for a paced replay run, loadable from TOML.
///
/// ```toml
/// network_passphrase = "Test LIP Network ; October 2026"
/// source_path = "network.lips"
/// ledgers_path = "fixtures.lips"
/// entries_path = "fixture-entries.lips"
/// start_ledger = 100
/// ledger_close_duration_ms = 1000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub network_passphrase: String,
    /// Ledger stream the replayed ledgers are read from.
    pub source_path: PathBuf,
    /// Fixture ledgers appended to every ledger after the first.
    pub ledgers_path: PathBuf,
    /// Fixture entries created by the first ledger.
    pub entries_path: PathBuf,
    pub start_ledger: u32,
    /// Last ledger to replay; defaults to the end of the fixture window.
    pub end_ledger: Option<u32>,
    /// Minimum time between handing out two ledgers.
    pub ledger_close_duration_ms: u64,
    pub stream: StreamConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            network_passphrase: NetworkId::TESTNET_PASSPHRASE.to_string(),
            source_path: PathBuf::from("ledgers.lips"),
            ledgers_path: PathBuf::from("fixtures.lips"),
            entries_path: PathBuf::from("fixture-entries.lips"),
            start_ledger: 2,
            end_ledger: None,
            ledger_close_duration_ms: 5_000,
            stream: StreamConfig::default(),
        }
    }
}

impl ReplayConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn network(&self) -> NetworkId {
        NetworkId::from_passphrase(self.network_passphrase.as_str())
    }

    pub fn ledger_close_duration(&self) -> Duration {
        Duration::from_millis(self.ledger_close_duration_ms)
    }

    pub fn range(&self) -> LedgerRange {
        match self.end_ledger {
            Some(end) => LedgerRange::bounded(self.start_ledger, end),
            None => LedgerRange::unbounded(self.start_ledger),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_fills_defaults() {
        let config = ReplayConfig::from_toml_str(
            r#"
            start_ledger = 40
            end_ledger = 45
            ledger_close_duration_ms = 250

            [stream]
            compression_level = 9
            "#,
        )
        .unwrap();
        assert_eq!(config.range(), LedgerRange::bounded(40, 45));
        assert_eq!(config.ledger_close_duration(), Duration::from_millis(250));
        assert_eq!(config.stream.compression_level, 9);
        assert_eq!(config.stream.max_frame_size, StreamConfig::default().max_frame_size);
        assert_eq!(config.network(), NetworkId::testnet());
    }

    #[test]
    fn serializes_back_to_same_config() {
        let config = ReplayConfig {
            end_ledger: Some(9),
            ..ReplayConfig::default()
        };
        let text = config.to_toml().unwrap();
        assert_eq!(ReplayConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn unknown_types_are_rejected() {
        let err = ReplayConfig::from_toml_str("start_ledger = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ReplayConfig::load(Path::new("/nonexistent/replay.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/replay.toml"));
    }
}
