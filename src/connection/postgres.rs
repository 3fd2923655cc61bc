//! PostgreSQL driver
//!
//! `thin` mode connects with tokio-postgres on the benchmark runtime.
//! `native` mode uses the blocking `postgres` client on the blocking
//! thread pool, so it occupies one OS thread per in-flight attempt.

use super::{ConnectRequest, Connection, Driver};
use crate::config::DriverMode;
use crate::error::{Error, Result};
use crate::net::tls::MakeRustlsConnect;
use async_trait::async_trait;
use rustls::ClientConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode;
use tracing::debug;

const APPLICATION_NAME: &str = "connbench";

#[derive(Debug, Default, Clone, Copy)]
pub struct PgDriver;

#[async_trait]
impl Driver for PgDriver {
    fn describe(&self) -> String {
        "PostgreSQL (tokio-postgres 0.7 / postgres 0.19)".to_string()
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Connection>> {
        let config = pg_config(request);
        match request.mode {
            DriverMode::Thin => connect_thin(config, request.tls.clone()).await,
            DriverMode::Native => connect_native(config, request.tls.clone()).await,
        }
    }
}

fn pg_config(request: &ConnectRequest) -> tokio_postgres::Config {
    let mut config = tokio_postgres::Config::new();
    config
        .host(request.endpoint.host.as_str())
        .port(request.endpoint.port)
        .user(request.principal.as_str())
        .application_name(APPLICATION_NAME)
        .keepalives(request.session.health_events)
        .ssl_mode(if request.tls.is_some() {
            SslMode::Require
        } else {
            SslMode::Disable
        });
    if !request.secret.is_empty() {
        config.password(request.secret.expose());
    }
    if let Some(service) = &request.endpoint.service {
        config.dbname(service.as_str());
    }
    config
}

fn connect_error(e: tokio_postgres::Error) -> Error {
    Error::ConnectFailure(e.to_string())
}

async fn connect_thin(config: tokio_postgres::Config, tls: Option<Arc<ClientConfig>>) -> Result<Box<dyn Connection>> {
    let (client, driver) = match tls {
        Some(tls) => {
            let (client, connection) = config
                .connect(MakeRustlsConnect::new(tls))
                .await
                .map_err(connect_error)?;
            (client, tokio::spawn(drive(connection)))
        }
        None => {
            let (client, connection) = config.connect(tokio_postgres::NoTls).await.map_err(connect_error)?;
            (client, tokio::spawn(drive(connection)))
        }
    };
    Ok(Box::new(ThinConnection { client, driver }))
}

async fn drive<F>(connection: F)
where
    F: std::future::Future<Output = std::result::Result<(), tokio_postgres::Error>>,
{
    if let Err(e) = connection.await {
        debug!("Connection closed with error: {}", e);
    }
}

struct ThinConnection {
    client: tokio_postgres::Client,
    driver: JoinHandle<()>,
}

#[async_trait]
impl Connection for ThinConnection {
    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ThinConnection { client, driver } = *self;
        // dropping the client sends Terminate and ends the connection task
        drop(client);
        driver
            .await
            .map_err(|e| Error::ConnectFailure(format!("Connection task failed: {}", e)))
    }
}

async fn connect_native(config: tokio_postgres::Config, tls: Option<Arc<ClientConfig>>) -> Result<Box<dyn Connection>> {
    let config = postgres::Config::from(config);
    let client = tokio::task::spawn_blocking(move || match tls {
        Some(tls) => config.connect(MakeRustlsConnect::new(tls)),
        None => config.connect(postgres::NoTls),
    })
    .await
    .map_err(|e| Error::ConnectFailure(format!("Connect task failed: {}", e)))?
    .map_err(connect_error)?;

    Ok(Box::new(NativeConnection { client: Some(client) }))
}

struct NativeConnection {
    client: Option<postgres::Client>,
}

#[async_trait]
impl Connection for NativeConnection {
    fn is_closed(&self) -> bool {
        self.client.as_ref().map_or(true, postgres::Client::is_closed)
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || client.close())
            .await
            .map_err(|e| Error::ConnectFailure(format!("Close task failed: {}", e)))?
            .map_err(connect_error)
    }
}

impl Drop for NativeConnection {
    // The blocking client runs its own runtime on drop, which must not
    // happen on an async worker thread
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(move || drop(client));
                }
                Err(_) => drop(client),
            }
        }
    }
}
