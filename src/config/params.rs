//! Immutable run parameters
//!
//! Everything here is validated once at construction and never mutated
//! afterwards; both the provisioner and the benchmark engine receive
//! their own copies.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Passphrase used to open the wallet when none is supplied
pub const DEFAULT_WALLET_PASSPHRASE: &str = "DummyPassw0rd!";

/// How a single attempt obtains its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PoolingMode {
    /// One unpooled connection per attempt
    #[value(alias = "ods")]
    Direct,
    /// Connections drawn from a pool keyed by endpoint and principal
    #[value(alias = "pds")]
    Pooled,
}

impl fmt::Display for PoolingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolingMode::Direct => write!(f, "direct"),
            PoolingMode::Pooled => write!(f, "pooled"),
        }
    }
}

/// Driver transport flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverMode {
    /// Pure async client running on the benchmark runtime
    Thin,
    /// Blocking client driven from the blocking thread pool
    #[value(alias = "oci")]
    Native,
}

impl fmt::Display for DriverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverMode::Thin => write!(f, "thin"),
            DriverMode::Native => write!(f, "native"),
        }
    }
}

/// A password or passphrase that is wiped on drop and never printed
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

/// Endpoint, credentials and connection modes for one benchmark run
#[derive(Debug, Clone)]
pub struct ConnectionParameters {
    endpoint: String,
    principal: String,
    secret: Secret,
    pooling: PoolingMode,
    driver: DriverMode,
}

impl ConnectionParameters {
    /// Validate and build the parameters.
    ///
    /// `endpoint` is either `host[:port][/service]` or an alias from the
    /// wallet's network configuration.
    pub fn new(
        endpoint: impl Into<String>,
        principal: impl Into<String>,
        secret: Secret,
        pooling: PoolingMode,
        driver: DriverMode,
    ) -> Result<Self> {
        let endpoint = endpoint.into().trim().to_string();
        let principal = principal.into().trim().to_string();

        if endpoint.is_empty() {
            return Err(Error::InvalidInput("Endpoint cannot be empty".to_string()));
        }
        if endpoint.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput(format!(
                "Endpoint '{}' must not contain whitespace",
                endpoint
            )));
        }
        if principal.is_empty() {
            return Err(Error::InvalidInput("Username cannot be empty".to_string()));
        }

        Ok(Self {
            endpoint,
            principal,
            secret,
            pooling,
            driver,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn pooling(&self) -> PoolingMode {
        self.pooling
    }

    pub fn driver(&self) -> DriverMode {
        self.driver
    }
}

/// A zip wallet to provision before benchmarking. Consumed by provisioning.
#[derive(Debug)]
pub struct CredentialBundle {
    archive: PathBuf,
    passphrase: Secret,
    delete_on_exit: bool,
}

impl CredentialBundle {
    pub fn new(archive: impl Into<PathBuf>, passphrase: Secret, delete_on_exit: bool) -> Result<Self> {
        let archive = archive.into();
        if archive.as_os_str().is_empty() {
            return Err(Error::InvalidInput("Credentials file cannot be empty".to_string()));
        }
        if passphrase.is_empty() {
            return Err(Error::InvalidInput("Wallet passphrase cannot be empty".to_string()));
        }
        Ok(Self {
            archive,
            passphrase,
            delete_on_exit,
        })
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    pub fn passphrase(&self) -> &Secret {
        &self.passphrase
    }

    pub fn delete_on_exit(&self) -> bool {
        self.delete_on_exit
    }
}
