//! Process-wide network settings
//!
//! Provisioning publishes the store locations and TLS policy here exactly
//! once; every connection attempt reads them back. Writers and readers
//! never overlap: registration completes before the benchmark starts.

pub mod tls;
pub mod tnsnames;

use crate::config::{Secret, TlsConfig};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use tnsnames::{Endpoint, Protocol};

static GLOBAL_REGISTRY: Lazy<NetworkRegistry> = Lazy::new(NetworkRegistry::new);

/// Minimum TLS protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    V1_2,
    V1_3,
}

impl FromStr for TlsVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches("TLSv") {
            "1.2" => Ok(TlsVersion::V1_2),
            "1.3" => Ok(TlsVersion::V1_3),
            other => Err(Error::Config(format!("Unsupported TLS version '{}'", other))),
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsVersion::V1_2 => write!(f, "1.2"),
            TlsVersion::V1_3 => write!(f, "1.3"),
        }
    }
}

/// Connectivity rules applied to every TLS session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsPolicy {
    pub min_version: TlsVersion,
    pub server_dn_match: bool,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            min_version: TlsVersion::V1_2,
            server_dn_match: true,
        }
    }
}

impl TlsPolicy {
    pub fn from_config(config: &TlsConfig) -> Result<Self> {
        Ok(Self {
            min_version: config.min_version.parse()?,
            server_dn_match: config.server_dn_match,
        })
    }
}

/// Store locations, store passwords and connectivity settings
#[derive(Debug, Clone)]
pub struct NetworkSettings {
    pub trust_store: PathBuf,
    pub trust_store_password: Secret,
    pub key_store: PathBuf,
    pub key_store_password: Secret,
    /// Directory holding the wallet's network configuration files
    pub config_dir: PathBuf,
    pub tls: TlsPolicy,
}

impl NetworkSettings {
    /// Name/value pairs for display. Passwords are masked.
    pub fn properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("net.config_dir", self.config_dir.display().to_string()),
            ("net.ssl_server_dn_match", self.tls.server_dn_match.to_string()),
            ("net.ssl_version", self.tls.min_version.to_string()),
            ("tls.trustStore", self.trust_store.display().to_string()),
            ("tls.trustStorePassword", self.trust_store_password.to_string()),
            ("tls.keyStore", self.key_store.display().to_string()),
            ("tls.keyStorePassword", self.key_store_password.to_string()),
        ]
    }
}

/// Single-registration holder for [`NetworkSettings`]
pub struct NetworkRegistry {
    registered: AtomicBool,
    settings: RwLock<Option<Arc<NetworkSettings>>>,
}

impl fmt::Debug for NetworkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkRegistry")
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self {
            registered: AtomicBool::new(false),
            settings: RwLock::new(None),
        }
    }

    /// The registry shared by the whole process
    pub fn global() -> &'static NetworkRegistry {
        &GLOBAL_REGISTRY
    }

    /// Publish settings. A registry accepts exactly one registration for
    /// its lifetime, even after the settings have been withdrawn.
    pub fn register(&self, settings: NetworkSettings) -> Result<Arc<NetworkSettings>> {
        if self.registered.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidState(
                "Network settings were already registered in this process".to_string(),
            ));
        }
        let settings = Arc::new(settings);
        *self.settings.write() = Some(Arc::clone(&settings));
        Ok(settings)
    }

    pub fn get(&self) -> Option<Arc<NetworkSettings>> {
        self.settings.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Drop the published settings once their backing files are gone
    pub(crate) fn withdraw(&self) {
        self.settings.write().take();
    }
}
