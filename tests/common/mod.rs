//! Shared helpers for integration tests
//!
//! Wallets are assembled at test time from the DER fixtures; drivers are
//! in-process stubs, so no test needs a live database.

#![allow(dead_code)]

use async_trait::async_trait;
use connbench::connection::{ConnectRequest, Connection, Driver};
use connbench::{Error, Result};
use p12_keystore::{Certificate, KeyStore, KeyStoreEntry, PrivateKeyChain};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zip::write::FileOptions;
use zip::ZipWriter;

pub const WALLET_PASSPHRASE: &str = "DummyPassw0rd!";

const CA_DER: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/ca.der"));
const CLIENT_DER: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/client.der"));
const CLIENT_KEY_DER: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/client.key.der"));

pub const TNSNAMES: &str = "\
# bench service aliases
benchdb_high = (DESCRIPTION=
    (ADDRESS=(PROTOCOL=tcps)(HOST=db.example.com)(PORT=1522))
    (CONNECT_DATA=(SERVICE_NAME=bench_high)))
";

pub fn ca_der() -> &'static [u8] {
    CA_DER
}

/// PKCS#12 wallet holding the client key chain and the CA as a trusted entry
pub fn wallet_p12(passphrase: &str) -> Vec<u8> {
    let ca = Certificate::from_der(CA_DER).unwrap();
    let leaf = Certificate::from_der(CLIENT_DER).unwrap();

    let mut wallet = KeyStore::new();
    wallet.add_entry(
        "bench-client",
        KeyStoreEntry::PrivateKeyChain(PrivateKeyChain::new(CLIENT_KEY_DER, [9u8; 20], vec![leaf, ca.clone()])),
    );
    wallet.add_entry("bench-root", KeyStoreEntry::Certificate(ca));
    wallet.writer(passphrase).write().unwrap()
}

/// Zip wallet in `dir` with `ewallet.p12` and optionally a `tnsnames.ora`
pub fn wallet_zip(dir: &Path, passphrase: &str, tnsnames: Option<&str>) -> PathBuf {
    let path = dir.join("Wallet_bench.zip");
    let file = std::fs::File::create(&path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default();

    zip.start_file("ewallet.p12", options).unwrap();
    zip.write_all(&wallet_p12(passphrase)).unwrap();
    zip.start_file("sqlnet.ora", options).unwrap();
    zip.write_all(b"SSL_SERVER_DN_MATCH=yes\n").unwrap();
    if let Some(tnsnames) = tnsnames {
        zip.start_file("tnsnames.ora", options).unwrap();
        zip.write_all(tnsnames.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

/// Number of entries directly under `dir`
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

/// Connection that counts how often it was closed
pub struct StubConnection {
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for StubConnection {
    fn is_closed(&self) -> bool {
        false
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Driver that answers every connect after a fixed delay
#[derive(Default)]
pub struct StubDriver {
    pub delay: Duration,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
    pub requests: Mutex<Vec<ConnectRequest>>,
}

impl StubDriver {
    pub fn succeeding(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn failing(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail: true,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for StubDriver {
    fn describe(&self) -> String {
        "stub driver 1.0".to_string()
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Connection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(Error::ConnectFailure("connection refused".to_string()));
        }
        Ok(Box::new(StubConnection {
            closed: Arc::clone(&self.closed),
        }))
    }
}
