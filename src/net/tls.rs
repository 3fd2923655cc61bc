//! TLS client configuration built from the provisioned stores

use super::{NetworkSettings, TlsVersion};
use crate::error::{Error, Result};
use crate::wallet::truststore;
use rustls::{ClientConfig, RootCertStore, SupportedProtocolVersion};
use std::sync::Arc;
use tracing::{debug, warn};

/// Build a rustls client configuration from registered settings.
///
/// Trust anchors come from the trust store; the first private key chain
/// in the key store, if any, becomes the client identity.
pub fn client_config(settings: &NetworkSettings) -> Result<Arc<ClientConfig>> {
    let trust = truststore::open_trust_store(&settings.trust_store, &settings.trust_store_password)?;
    let mut roots = RootCertStore::empty();
    for cert in truststore::trusted_certificates(&trust) {
        roots
            .add(&rustls::Certificate(cert.as_der().to_vec()))
            .map_err(|e| Error::Tls(format!("Trust anchor '{}' rejected: {}", cert.subject(), e)))?;
    }
    if roots.is_empty() {
        return Err(Error::Tls(format!(
            "{} holds no trusted certificates",
            settings.trust_store.display()
        )));
    }

    let versions: &[&'static SupportedProtocolVersion] = match settings.tls.min_version {
        TlsVersion::V1_2 => &[&rustls::version::TLS13, &rustls::version::TLS12],
        TlsVersion::V1_3 => &[&rustls::version::TLS13],
    };

    if !settings.tls.server_dn_match {
        warn!("Server name verification cannot be relaxed, certificates are always matched against the host");
    }

    let builder = ClientConfig::builder()
        .with_safe_default_cipher_suites()
        .with_safe_default_kx_groups()
        .with_protocol_versions(versions)
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_root_certificates(roots);

    let keys = truststore::open_key_store(&settings.key_store, &settings.key_store_password)?;
    let config = match keys.private_key_chain() {
        Some((alias, chain)) => {
            debug!("Using client certificate '{}'", alias);
            let certs = chain
                .chain()
                .iter()
                .map(|cert| rustls::Certificate(cert.as_der().to_vec()))
                .collect();
            builder
                .with_client_auth_cert(certs, rustls::PrivateKey(chain.key().to_vec()))
                .map_err(|e| Error::Tls(format!("Client identity '{}' rejected: {}", alias, e)))?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

#[cfg(feature = "postgres")]
pub use self::postgres_tls::{MakeRustlsConnect, RustlsConnect, RustlsStream};

#[cfg(feature = "postgres")]
mod postgres_tls {
    use futures::future::BoxFuture;
    use rustls::{ClientConfig, ServerName};
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use tokio_postgres::tls::{ChannelBinding, MakeTlsConnect, TlsConnect, TlsStream};
    use tokio_rustls::TlsConnector;

    /// tokio-postgres TLS factory backed by a shared rustls configuration
    #[derive(Clone)]
    pub struct MakeRustlsConnect {
        config: Arc<ClientConfig>,
    }

    impl MakeRustlsConnect {
        pub fn new(config: Arc<ClientConfig>) -> Self {
            Self { config }
        }
    }

    impl<S> MakeTlsConnect<S> for MakeRustlsConnect
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        type Stream = RustlsStream<S>;
        type TlsConnect = RustlsConnect;
        type Error = io::Error;

        fn make_tls_connect(&mut self, domain: &str) -> io::Result<RustlsConnect> {
            let server_name = ServerName::try_from(domain)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            Ok(RustlsConnect {
                connector: TlsConnector::from(Arc::clone(&self.config)),
                server_name,
            })
        }
    }

    pub struct RustlsConnect {
        connector: TlsConnector,
        server_name: ServerName,
    }

    impl<S> TlsConnect<S> for RustlsConnect
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        type Stream = RustlsStream<S>;
        type Error = io::Error;
        type Future = BoxFuture<'static, io::Result<RustlsStream<S>>>;

        fn connect(self, stream: S) -> Self::Future {
            Box::pin(async move {
                let stream = self.connector.connect(self.server_name, stream).await?;
                Ok(RustlsStream(stream))
            })
        }
    }

    pub struct RustlsStream<S>(tokio_rustls::client::TlsStream<S>);

    impl<S> TlsStream for RustlsStream<S>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        fn channel_binding(&self) -> ChannelBinding {
            ChannelBinding::none()
        }
    }

    impl<S> AsyncRead for RustlsStream<S>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.0).poll_read(cx, buf)
        }
    }

    impl<S> AsyncWrite for RustlsStream<S>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.0).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.0).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.0).poll_shutdown(cx)
        }
    }
}
