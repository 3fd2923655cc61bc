//! Configuration management for ConnBench
//!
//! Settings are resolved in layers:
//! - built-in defaults
//! - an optional TOML file
//! - `CONNBENCH_*` environment overrides
//!
//! Command-line flags are applied last by the binary.

pub mod params;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use params::{
    ConnectionParameters, CredentialBundle, DriverMode, PoolingMode, Secret, DEFAULT_WALLET_PASSPHRASE,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub benchmark: BenchmarkConfig,
    pub wallet: WalletConfig,
    pub tls: TlsConfig,
    pub logging: LoggingConfig,
}

/// Benchmark scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Number of simultaneous connection attempts
    pub concurrency: usize,
    /// Upper bound on a single attempt; unbounded when absent
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Option<Duration>,
    pub worker_threads: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            attempt_timeout: None,
            worker_threads: num_cpus::get(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Leave the extracted wallet directory in place after the run
    pub keep_workdir: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Minimum protocol version, "1.2" or "1.3"
    pub min_version: String,
    pub server_dn_match: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: "1.2".to_string(),
            server_dn_match: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub debug_file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug_file: PathBuf::from("debug.log"),
        }
    }
}

impl BenchConfig {
    /// Load configuration from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.override_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Override configuration with environment variables
    fn override_from_env(&mut self) -> Result<()> {
        if let Ok(val) = env::var("CONNBENCH_CONCURRENCY") {
            self.benchmark.concurrency = val
                .parse()
                .map_err(|_| Error::Config("Invalid concurrency".to_string()))?;
        }

        if let Ok(val) = env::var("CONNBENCH_ATTEMPT_TIMEOUT") {
            let timeout = humantime_serde::re::humantime::parse_duration(&val)
                .map_err(|e| Error::Config(format!("Invalid attempt timeout: {}", e)))?;
            self.benchmark.attempt_timeout = Some(timeout);
        }

        if let Ok(val) = env::var("CONNBENCH_WORKER_THREADS") {
            self.benchmark.worker_threads = val
                .parse()
                .map_err(|_| Error::Config("Invalid worker threads".to_string()))?;
        }

        if let Ok(val) = env::var("CONNBENCH_KEEP_WORKDIR") {
            self.wallet.keep_workdir = val
                .parse()
                .map_err(|_| Error::Config("Invalid keep workdir flag".to_string()))?;
        }

        if let Ok(val) = env::var("CONNBENCH_TLS_MIN_VERSION") {
            self.tls.min_version = val;
        }

        if let Ok(val) = env::var("CONNBENCH_LOG_LEVEL") {
            self.logging.level = val;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.benchmark.concurrency == 0 {
            return Err(Error::Config("Concurrency must be > 0".to_string()));
        }

        if self.benchmark.worker_threads == 0 {
            return Err(Error::Config("Worker threads must be > 0".to_string()));
        }

        if let Some(timeout) = self.benchmark.attempt_timeout {
            if timeout.is_zero() {
                return Err(Error::Config("Attempt timeout must be > 0".to_string()));
            }
        }

        if !matches!(self.tls.min_version.as_str(), "1.2" | "1.3") {
            return Err(Error::Config(format!(
                "Unsupported minimum TLS version '{}'",
                self.tls.min_version
            )));
        }

        if self.logging.level.trim().is_empty() {
            return Err(Error::Config("Log level cannot be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BenchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.benchmark.concurrency, 1);
        assert!(config.benchmark.attempt_timeout.is_none());
        assert!(config.tls.server_dn_match);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BenchConfig::from_toml(
            r#"
            [benchmark]
            concurrency = 32
            attempt_timeout = "5s"

            [tls]
            min_version = "1.3"
            "#,
        )
        .unwrap();

        assert_eq!(config.benchmark.concurrency, 32);
        assert_eq!(config.benchmark.attempt_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.tls.min_version, "1.3");
        assert_eq!(config.logging.level, "info");
        assert!(!config.wallet.keep_workdir);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = BenchConfig::default();
        config.benchmark.concurrency = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = BenchConfig::default();
        config.tls.min_version = "1.0".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        fs::write(&path, "[wallet]\nkeep_workdir = true\n").unwrap();

        let config = BenchConfig::load_from_file(&path).unwrap();
        assert!(config.wallet.keep_workdir);

        let missing = BenchConfig::load_from_file(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let result = BenchConfig::from_toml("[benchmark\nconcurrency = ");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
