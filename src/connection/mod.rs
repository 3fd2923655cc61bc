//! Connection factory
//!
//! The factory turns [`ConnectionParameters`] into one live connection
//! through an opaque [`Driver`]. `direct` mode asks the driver for a fresh
//! connection every time; `pooled` mode draws from a pool keyed by
//! endpoint, principal and driver mode. Failures are reported once as
//! `ConnectFailure` and never retried here.

pub mod pool;
#[cfg(feature = "postgres")]
pub mod postgres;

use crate::config::{ConnectionParameters, DriverMode, PoolingMode, Secret};
use crate::error::{Error, Result};
use crate::net::tnsnames::{self, Endpoint};
use crate::net::{tls, NetworkSettings};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustls::ClientConfig;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use pool::{ConnectionPool, PooledConnection};

/// Session behaviour requested from the driver on every path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionProperties {
    pub auto_commit: bool,
    /// Driver-level health checks and event fan-out (keepalives and the like)
    pub health_events: bool,
}

impl SessionProperties {
    /// Raw connect cost only: no auto-commit, no background health traffic
    pub const BENCHMARK: SessionProperties = SessionProperties {
        auto_commit: false,
        health_events: false,
    };
}

/// Everything a driver needs to open one connection
#[derive(Clone)]
pub struct ConnectRequest {
    pub endpoint: Endpoint,
    pub principal: String,
    pub secret: Secret,
    pub mode: DriverMode,
    pub tls: Option<Arc<ClientConfig>>,
    pub session: SessionProperties,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("endpoint", &self.endpoint)
            .field("principal", &self.principal)
            .field("secret", &self.secret)
            .field("mode", &self.mode)
            .field("tls", &self.tls.is_some())
            .field("session", &self.session)
            .finish()
    }
}

/// A live database connection
#[async_trait]
pub trait Connection: Send {
    fn is_closed(&self) -> bool;

    /// Close the connection and release its resources
    async fn close(self: Box<Self>) -> Result<()>;
}

/// The opaque `Connect` capability of a database driver
#[async_trait]
pub trait Driver: Send + Sync {
    /// Human-readable driver name and version
    fn describe(&self) -> String;

    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Connection>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    endpoint: Endpoint,
    principal: String,
    /// SHA-256 of the password, so differing credentials never share a pool
    secret_digest: [u8; 32],
    mode: DriverMode,
}

/// Produces one connection per [`ConnectionFactory::open`] call
pub struct ConnectionFactory {
    driver: Arc<dyn Driver>,
    network: Option<Arc<NetworkSettings>>,
    tls: Option<Arc<ClientConfig>>,
    pools: DashMap<PoolKey, ConnectionPool>,
    pool_size: usize,
}

impl ConnectionFactory {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            network: None,
            tls: None,
            pools: DashMap::new(),
            pool_size: 1,
        }
    }

    /// Use provisioned network settings for alias resolution and TLS
    pub fn with_network(mut self, settings: Arc<NetworkSettings>) -> Result<Self> {
        self.tls = Some(tls::client_config(&settings)?);
        self.network = Some(settings);
        Ok(self)
    }

    /// Maximum size of each connection pool
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Let the pool behind `params` hand out `capacity` connections at once.
    ///
    /// Pooled attempts hold their connection until released, so a pool
    /// smaller than the number of simultaneous attempts would block the
    /// surplus forever. No-op in direct mode; resolution errors are left
    /// for `open` to report per attempt.
    pub fn reserve(&self, params: &ConnectionParameters, capacity: usize) {
        if params.pooling() != PoolingMode::Pooled {
            return;
        }
        let pool = match self.request_for(params).and_then(|request| self.pool_for(request)) {
            Ok(pool) => pool,
            Err(e) => {
                debug!("Not reserving pool capacity: {}", e);
                return;
            }
        };
        let max_size = pool.status().max_size;
        if max_size < capacity {
            debug!("Growing pool for {} from {} to {}", params.endpoint(), max_size, capacity);
            pool.resize(capacity);
        }
    }

    /// Open one connection. Any failure is a `ConnectFailure` (or the
    /// driver's own `Timeout`).
    pub async fn open(&self, params: &ConnectionParameters) -> Result<Box<dyn Connection>> {
        let result = match self.request_for(params) {
            Ok(request) => match params.pooling() {
                PoolingMode::Direct => self.driver.connect(&request).await,
                PoolingMode::Pooled => self.open_pooled(request).await,
            },
            Err(e) => Err(e),
        };
        result.map_err(into_connect_failure)
    }

    async fn open_pooled(&self, request: ConnectRequest) -> Result<Box<dyn Connection>> {
        let pool = self.pool_for(request)?;
        let connection = pool::checkout(&pool).await?;
        Ok(Box::new(connection))
    }

    fn pool_for(&self, request: ConnectRequest) -> Result<ConnectionPool> {
        let key = PoolKey {
            endpoint: request.endpoint.clone(),
            principal: request.principal.clone(),
            secret_digest: Sha256::digest(request.secret.expose().as_bytes()).into(),
            mode: request.mode,
        };
        let pool = match self.pools.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                debug!(
                    "Creating pool of {} for {}@{}",
                    self.pool_size, request.principal, request.endpoint
                );
                let pool = pool::build(Arc::clone(&self.driver), request, self.pool_size)?;
                entry.insert(pool.clone());
                pool
            }
        };
        Ok(pool)
    }

    fn request_for(&self, params: &ConnectionParameters) -> Result<ConnectRequest> {
        let config_dir = self.network.as_ref().map(|settings| settings.config_dir.as_path());
        let endpoint = tnsnames::resolve(params.endpoint(), config_dir)?;
        if endpoint.requires_tls() && self.tls.is_none() {
            return Err(Error::ConnectFailure(format!(
                "{} requires TLS but no credentials were provisioned",
                endpoint
            )));
        }

        Ok(ConnectRequest {
            endpoint,
            principal: params.principal().to_string(),
            secret: params.secret().clone(),
            mode: params.driver(),
            tls: self.tls.clone(),
            session: SessionProperties::BENCHMARK,
        })
    }
}

fn into_connect_failure(err: Error) -> Error {
    match err {
        Error::ConnectFailure(_) | Error::Timeout(_) => err,
        other => Error::ConnectFailure(other.to_string()),
    }
}
