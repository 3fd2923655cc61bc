//! Logging initialisation
//!
//! Console output always goes to stderr so the report on stdout stays
//! clean. Debug runs additionally mirror every event into a plain-text
//! file that is truncated at startup.

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use std::fs::File;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Build the event filter for a configured level.
///
/// Accepts anything `RUST_LOG` accepts, e.g. `info,connbench::bench=debug`.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| Error::Config(format!("Invalid log level '{}': {}", level, e)))
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level; `debug` forces debug level and enables the log file.
pub fn init(config: &LoggingConfig, debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { config.level.as_str() };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(level)?,
    };

    let console = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    let debug_file = if debug {
        let file = File::create(&config.debug_file).map_err(|e| {
            Error::Config(format!(
                "Failed to create debug log {}: {}",
                config.debug_file.display(),
                e
            ))
        })?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_writer(Mutex::new(file)),
        )
    } else {
        None
    };

    Registry::default()
        .with(filter)
        .with(console)
        .with(debug_file)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialise logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        assert!(build_filter("info").is_ok());
        assert!(build_filter("warn,connbench::bench=debug").is_ok());
    }

    #[test]
    fn test_build_filter_rejects_garbage() {
        assert!(matches!(build_filter("connbench=loud"), Err(Error::Config(_))));
    }
}
