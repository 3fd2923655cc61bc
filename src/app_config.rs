//! Command-line interface definition and argument handling
//!
//! Flags are applied on top of the layered [`BenchConfig`], so a flag
//! always beats the config file and the environment.

use clap::Parser;
use connbench::config::{
    BenchConfig, ConnectionParameters, CredentialBundle, DriverMode, PoolingMode, Secret,
    DEFAULT_WALLET_PASSPHRASE,
};
use connbench::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line interface definition for ConnBench
#[derive(Parser, Debug)]
#[command(name = "connbench", version)]
#[command(about = "Measure how long it takes to open many database connections at once")]
pub struct Cli {
    /// Database user
    #[arg(short, long)]
    pub username: String,

    /// Database password
    #[arg(short, long, default_value = "", hide_default_value = true)]
    pub password: String,

    /// host[:port][/service] URL, or an alias from the wallet's tnsnames.ora
    #[arg(long = "connect-string", visible_alias = "cs")]
    pub connect_string: String,

    /// How each attempt obtains its connection
    #[arg(long = "connection-type", visible_alias = "ct", value_enum, default_value_t = PoolingMode::Direct)]
    pub connection_type: PoolingMode,

    /// Number of simultaneous connection attempts
    #[arg(long = "thread-count", visible_alias = "tc")]
    pub thread_count: Option<usize>,

    /// Zip wallet holding the client credentials
    #[arg(long = "credentials-file", visible_alias = "cf")]
    pub credentials_file: Option<PathBuf>,

    /// Passphrase protecting the wallet
    #[arg(
        long,
        env = "CONNBENCH_WALLET_PASSWORD",
        default_value = DEFAULT_WALLET_PASSPHRASE,
        hide_default_value = true,
        hide_env_values = true
    )]
    pub wallet_password: String,

    /// Driver transport
    #[arg(long = "driver-type", visible_alias = "dt", value_enum, default_value_t = DriverMode::Thin)]
    pub driver_type: DriverMode,

    /// Log at debug level and mirror the log into the debug file
    #[arg(long)]
    pub debug: bool,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Leave the extracted wallet directory in place
    #[arg(long)]
    pub keep_workdir: bool,

    /// Give up on an attempt after this long, e.g. "5s" or "1500ms"
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    pub attempt_timeout: Option<Duration>,
}

impl Cli {
    /// Apply flag overrides to the layered configuration
    pub fn apply(&self, config: &mut BenchConfig) {
        if let Some(thread_count) = self.thread_count {
            config.benchmark.concurrency = thread_count;
        }
        if self.attempt_timeout.is_some() {
            config.benchmark.attempt_timeout = self.attempt_timeout;
        }
        if self.keep_workdir {
            config.wallet.keep_workdir = true;
        }
    }

    pub fn connection_parameters(&self) -> Result<ConnectionParameters> {
        ConnectionParameters::new(
            self.connect_string.as_str(),
            self.username.as_str(),
            Secret::new(self.password.as_str()),
            self.connection_type,
            self.driver_type,
        )
    }

    /// The wallet to provision, if one was given
    pub fn credential_bundle(&self, config: &BenchConfig) -> Result<Option<CredentialBundle>> {
        self.credentials_file
            .as_ref()
            .map(|archive| {
                CredentialBundle::new(
                    archive.clone(),
                    Secret::new(self.wallet_password.as_str()),
                    !config.wallet.keep_workdir,
                )
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [&str; 5] = ["connbench", "-u", "admin", "--cs", "db.example.com:5432/bench"];

    fn parse(extra: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(BASE.iter().chain(extra.iter()))
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.connection_type, PoolingMode::Direct);
        assert_eq!(cli.driver_type, DriverMode::Thin);
        assert!(cli.thread_count.is_none());
        assert!(cli.credentials_file.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn test_short_aliases() {
        let cli = parse(&["--ct", "pds", "--dt", "oci", "--tc", "16", "--cf", "/tmp/wallet.zip"]).unwrap();
        assert_eq!(cli.connection_type, PoolingMode::Pooled);
        assert_eq!(cli.driver_type, DriverMode::Native);
        assert_eq!(cli.thread_count, Some(16));
        assert_eq!(cli.credentials_file, Some(PathBuf::from("/tmp/wallet.zip")));

        let cli = parse(&["--connection-type", "ods"]).unwrap();
        assert_eq!(cli.connection_type, PoolingMode::Direct);
    }

    #[test]
    fn test_usage_errors() {
        assert!(Cli::try_parse_from(["connbench", "-u", "admin"]).is_err());
        assert!(parse(&["--ct", "bogus"]).is_err());
        assert!(parse(&["--tc", "many"]).is_err());
        assert!(parse(&["--attempt-timeout", "soon"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&["--tc", "8", "--attempt-timeout", "1500ms", "--keep-workdir"]).unwrap();
        let mut config = BenchConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.benchmark.concurrency, 8);
        assert_eq!(config.benchmark.attempt_timeout, Some(Duration::from_millis(1500)));
        assert!(config.wallet.keep_workdir);
    }

    #[test]
    fn test_credential_bundle_follows_keep_workdir() {
        let cli = parse(&["--cf", "wallet.zip", "--wallet-password", "s3cret"]).unwrap();
        let mut config = BenchConfig::default();

        let bundle = cli.credential_bundle(&config).unwrap().unwrap();
        assert!(bundle.delete_on_exit());
        assert_eq!(bundle.passphrase().expose(), "s3cret");

        config.wallet.keep_workdir = true;
        let bundle = cli.credential_bundle(&config).unwrap().unwrap();
        assert!(!bundle.delete_on_exit());
    }

    #[test]
    fn test_no_wallet_means_no_bundle() {
        let cli = parse(&[]).unwrap();
        assert!(cli.credential_bundle(&BenchConfig::default()).unwrap().is_none());
        let params = cli.connection_parameters().unwrap();
        assert_eq!(params.endpoint(), "db.example.com:5432/bench");
        assert_eq!(params.principal(), "admin");
    }
}
