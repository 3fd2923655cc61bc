//! ConnBench - database connection latency benchmark
//!
//! Two halves:
//! - wallet: turns an encrypted credential archive into key/trust stores
//!   and registers the resulting network settings for the process
//! - bench: opens `k` connections at once through a [`connection::Driver`]
//!   and reports how long each took
//!
//! The binary in `main.rs` wires them together; everything here is usable
//! as a library with a custom driver.

pub mod bench;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod net;
pub mod wallet;

// Re-export commonly used types for easy access
pub use bench::{AttemptResult, BenchmarkEngine, BenchmarkReport, ResultAggregator};
pub use config::{
    BenchConfig, ConnectionParameters, CredentialBundle, DriverMode, PoolingMode, Secret,
};
pub use connection::{Connection, ConnectionFactory, Driver};
pub use error::{Error, Result};
pub use net::{NetworkRegistry, NetworkSettings, TlsPolicy};
pub use wallet::{CredentialProvisioner, ProvisionedStore};
