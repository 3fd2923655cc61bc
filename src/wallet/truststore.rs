//! Key and trust store migration
//!
//! The wallet container (`ewallet.p12`) mixes the client's signing
//! material with the CA certificates needed to verify the server. The
//! builder splits them into two PKCS#12 stores protected by a derived
//! store password so that the trust store never carries a private key.

use crate::config::Secret;
use crate::error::{Error, Result};
use p12_keystore::{Certificate, KeyStore, KeyStoreEntry, PrivateKeyChain};
use rustls::{BulkAlgorithm, RootCertStore, SupportedCipherSuite};
use sha2::Sha256;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroize;

/// Encrypted wallet container inside the extracted bundle
pub const WALLET_FILE: &str = "ewallet.p12";
/// Private key entries only
pub const KEY_STORE_FILE: &str = "bench_keystore.p12";
/// Trusted certificate entries only
pub const TRUST_STORE_FILE: &str = "bench_truststore.p12";

const STORE_SALT: &[u8] = b"connbench/store-password/v1";
const STORE_ROUNDS: u32 = 10_000;
const STORE_KEY_LEN: usize = 32;

/// Output of a successful migration
#[derive(Debug)]
pub struct BuiltStores {
    pub key_store: PathBuf,
    pub trust_store: PathBuf,
    pub store_password: Secret,
    pub key_entries: usize,
    pub trust_entries: usize,
}

/// Fail unless the TLS provider offers a cipher with keys longer than 128 bits
pub fn check_crypto_policy() -> Result<()> {
    check_cipher_suites(rustls::DEFAULT_CIPHER_SUITES)
}

pub(crate) fn check_cipher_suites(suites: &[SupportedCipherSuite]) -> Result<()> {
    let strongest = suites.iter().map(key_bits).max().unwrap_or(0);
    if strongest > 128 {
        Ok(())
    } else {
        Err(Error::CryptoPolicyUnsupported(format!(
            "strongest available cipher uses {}-bit keys, unrestricted key lengths are required",
            strongest
        )))
    }
}

fn key_bits(suite: &SupportedCipherSuite) -> u32 {
    let bulk = match suite {
        SupportedCipherSuite::Tls12(s) => &s.common.bulk,
        SupportedCipherSuite::Tls13(s) => &s.common.bulk,
    };
    match bulk {
        BulkAlgorithm::Aes128Gcm => 128,
        BulkAlgorithm::Aes256Gcm | BulkAlgorithm::Chacha20Poly1305 => 256,
    }
}

/// Derive the password protecting the written stores.
///
/// Deterministic for a given passphrase and never equal to it.
pub fn derive_store_password(passphrase: &Secret) -> Secret {
    let mut key = [0u8; STORE_KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.expose().as_bytes(), STORE_SALT, STORE_ROUNDS, &mut key);
    let password = Secret::new(hex::encode(key));
    key.zeroize();
    password
}

/// Open the wallet in `workdir` and write the key and trust stores next to it.
///
/// Both stores are fully serialized before either file is written.
pub fn build(workdir: &Path, passphrase: &Secret) -> Result<BuiltStores> {
    check_crypto_policy()?;

    let wallet_path = workdir.join(WALLET_FILE);
    let data = fs::read(&wallet_path)
        .map_err(|e| Error::IoFailure(format!("Cannot read {}: {}", wallet_path.display(), e)))?;
    let wallet = KeyStore::from_pkcs12(&data, passphrase.expose()).map_err(|e| {
        Error::InvalidCredentials(format!("Cannot open {}: {}", wallet_path.display(), e))
    })?;
    debug!("Opened wallet with {} entries", wallet.entries_count());

    let (key_store, trust_store) = split_entries(&wallet)?;
    if key_store.entries_count() == 0 && trust_store.entries_count() == 0 {
        return Err(Error::MigrationFailure(format!(
            "{} holds no key or certificate entries",
            wallet_path.display()
        )));
    }

    let store_password = derive_store_password(passphrase);
    let key_bytes = serialize(&key_store, &store_password, "key store")?;
    let trust_bytes = serialize(&trust_store, &store_password, "trust store")?;

    let key_path = workdir.join(KEY_STORE_FILE);
    let trust_path = workdir.join(TRUST_STORE_FILE);
    write_private(&key_path, &key_bytes)?;
    write_private(&trust_path, &trust_bytes)?;
    debug!(
        "Migrated {} key entries to {} and {} trusted certificates to {}",
        key_store.entries_count(),
        key_path.display(),
        trust_store.entries_count(),
        trust_path.display()
    );

    Ok(BuiltStores {
        key_store: key_path,
        trust_store: trust_path,
        store_password,
        key_entries: key_store.entries_count(),
        trust_entries: trust_store.entries_count(),
    })
}

/// Reopen a written key store
pub fn open_key_store(path: &Path, password: &Secret) -> Result<KeyStore> {
    load_store(path, password)
}

/// Reopen a written trust store
pub fn open_trust_store(path: &Path, password: &Secret) -> Result<KeyStore> {
    load_store(path, password)
}

fn load_store(path: &Path, password: &Secret) -> Result<KeyStore> {
    let data =
        fs::read(path).map_err(|e| Error::IoFailure(format!("Cannot read {}: {}", path.display(), e)))?;
    KeyStore::from_pkcs12(&data, password.expose())
        .map_err(|e| Error::InvalidCredentials(format!("Cannot open {}: {}", path.display(), e)))
}

/// Certificates from a trust store, in alias order
pub fn trusted_certificates(store: &KeyStore) -> Vec<&Certificate> {
    store
        .entries()
        .filter_map(|(_, entry)| match entry {
            KeyStoreEntry::Certificate(cert) => Some(cert),
            KeyStoreEntry::PrivateKeyChain(_) => None,
        })
        .collect()
}

fn split_entries(wallet: &KeyStore) -> Result<(KeyStore, KeyStore)> {
    let mut key_store = KeyStore::new();
    let mut anchors: Vec<(String, Certificate)> = Vec::new();

    for (alias, entry) in wallet.entries() {
        match entry {
            KeyStoreEntry::PrivateKeyChain(chain) => {
                migrate_key_chain(alias, chain)?;
                key_store.add_entry(alias, entry.clone());
                // CA certificates travel inside the chain when the wallet
                // does not flag them as trusted on their own
                for ca in chain.chain().iter().skip(1) {
                    push_anchor(&mut anchors, ca.subject(), ca);
                }
            }
            KeyStoreEntry::Certificate(cert) => push_anchor(&mut anchors, alias, cert),
        }
    }

    let mut roots = RootCertStore::empty();
    let mut trust_store = KeyStore::new();
    for (alias, cert) in anchors {
        roots
            .add(&rustls::Certificate(cert.as_der().to_vec()))
            .map_err(|e| {
                Error::MigrationFailure(format!("Trusted certificate '{}' is not a usable anchor: {}", alias, e))
            })?;
        let alias = unique_alias(&trust_store, &alias);
        trust_store.add_entry(&alias, KeyStoreEntry::Certificate(cert));
    }

    Ok((key_store, trust_store))
}

fn migrate_key_chain(alias: &str, chain: &PrivateKeyChain) -> Result<()> {
    if chain.chain().is_empty() {
        return Err(Error::MigrationFailure(format!(
            "Key entry '{}' has no certificate chain",
            alias
        )));
    }
    rustls::sign::any_supported_type(&rustls::PrivateKey(chain.key().to_vec()))
        .map_err(|e| Error::MigrationFailure(format!("Key entry '{}' cannot be converted: {}", alias, e)))?;
    Ok(())
}

fn push_anchor(anchors: &mut Vec<(String, Certificate)>, alias: &str, cert: &Certificate) {
    if !anchors.iter().any(|(_, known)| known == cert) {
        anchors.push((alias.to_string(), cert.clone()));
    }
}

fn unique_alias(store: &KeyStore, alias: &str) -> String {
    let mut candidate = alias.to_string();
    let mut n = 1;
    while store.entry(&candidate).is_some() {
        n += 1;
        candidate = format!("{}#{}", alias, n);
    }
    candidate
}

fn serialize(store: &KeyStore, password: &Secret, what: &str) -> Result<Vec<u8>> {
    store
        .writer(password.expose())
        .write()
        .map_err(|e| Error::MigrationFailure(format!("Cannot encode {}: {}", what, e)))
}

fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .map_err(|e| Error::IoFailure(format!("Cannot create {}: {}", path.display(), e)))?;
    file.write_all(data)
        .and_then(|_| file.sync_all())
        .map_err(|e| Error::IoFailure(format!("Cannot write {}: {}", path.display(), e)))
}
