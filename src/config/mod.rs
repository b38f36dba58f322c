//! Typed configuration from environment variables or a TOML file.
//!
//! Every field has a default, so an empty environment yields a working
//! in-memory setup. Malformed values fail fast.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::telemetry::TelemetryConfig;

const DEFAULT_LEASE_MS: u64 = 30_000;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding one database per queue. `None` keeps queues in memory.
    pub data_dir: Option<PathBuf>,
    /// Lease used by `Queue::lease_next` and friends.
    pub default_lease: Duration,
    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_lease: Duration::from_millis(DEFAULT_LEASE_MS),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            otel_endpoint: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// On-disk shape of the TOML config.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    default_lease_ms: Option<u64>,
    busy_timeout_ms: Option<u64>,
    otel_endpoint: Option<String>,
    log_level: Option<String>,
}

impl Config {
    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables.
    ///
    /// `LEASEQ_DATA_DIR`, `LEASEQ_DEFAULT_LEASE_MS`, `LEASEQ_BUSY_TIMEOUT_MS`,
    /// `OTEL_ENDPOINT`, `LOG_LEVEL`.
    pub fn from_env() -> Result<Self> {
        let file = ConfigFile {
            data_dir: optional_var("LEASEQ_DATA_DIR").map(PathBuf::from),
            default_lease_ms: millis_var("LEASEQ_DEFAULT_LEASE_MS")?,
            busy_timeout_ms: millis_var("LEASEQ_BUSY_TIMEOUT_MS")?,
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL"),
        };
        Self::from_parts(file)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(source).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        Self::from_parts(file)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Telemetry settings derived from this config.
    pub fn telemetry(&self, service_name: impl Into<String>) -> TelemetryConfig {
        TelemetryConfig {
            endpoint: self.otel_endpoint.clone(),
            service_name: service_name.into(),
            log_level: self.log_level.clone(),
        }
    }

    fn from_parts(file: ConfigFile) -> Result<Self> {
        let default_lease_ms = file.default_lease_ms.unwrap_or(DEFAULT_LEASE_MS);
        if default_lease_ms == 0 {
            return Err(Error::Config(
                "default lease must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            data_dir: file.data_dir,
            default_lease: Duration::from_millis(default_lease_ms),
            busy_timeout: Duration::from_millis(
                file.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
            ),
            otel_endpoint: file.otel_endpoint,
            log_level: file
                .log_level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn millis_var(name: &str) -> Result<Option<u64>> {
    optional_var(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("{name} must be a whole number of milliseconds, got {raw:?}"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn toml_fields_map_onto_config() {
        let config = Config::from_toml_str(
            r#"
            data_dir = "/var/lib/leaseq"
            default_lease_ms = 1500
            busy_timeout_ms = 250
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/leaseq")));
        assert_eq!(config.default_lease, Duration::from_millis(1500));
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.log_level, "debug");
        assert!(config.otel_endpoint.is_none());
    }

    #[test]
    fn zero_lease_is_rejected() {
        let err = Config::from_toml_str("default_lease_ms = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml_str("lease = 10").is_err());
    }
}
