//! Credential provisioning end to end: zip wallet in, registered stores out

mod common;

use common::{entry_count, wallet_zip, StubDriver, TNSNAMES, WALLET_PASSPHRASE};
use connbench::config::{ConnectionParameters, CredentialBundle, DriverMode, PoolingMode, Secret};
use connbench::wallet::{open_key_store, open_trust_store};
use connbench::{ConnectionFactory, CredentialProvisioner, Error, NetworkRegistry};
use std::time::Duration;

fn bundle(archive: &std::path::Path, passphrase: &str, delete_on_exit: bool) -> CredentialBundle {
    CredentialBundle::new(archive, Secret::new(passphrase), delete_on_exit).unwrap()
}

#[test]
fn test_provision_then_close_leaves_nothing_behind() {
    let source = tempfile::tempdir().unwrap();
    let work_root = tempfile::tempdir().unwrap();
    let archive = wallet_zip(source.path(), WALLET_PASSPHRASE, None);
    let registry = NetworkRegistry::new();

    let store = CredentialProvisioner::new(&registry)
        .with_work_root(work_root.path())
        .provision(bundle(&archive, WALLET_PASSPHRASE, true))
        .unwrap();

    let config_dir = store.config_dir().to_path_buf();
    assert!(store.key_store().is_file());
    assert!(store.trust_store().is_file());
    assert!(config_dir.join("wallet.zip").is_file());
    assert!(config_dir.join("sqlnet.ora").is_file());
    assert!(registry.get().is_some());

    store.close().unwrap();

    assert!(!config_dir.exists());
    assert_eq!(entry_count(work_root.path()), 0);
    assert!(registry.get().is_none());
    // the source archive is never touched
    assert!(archive.is_file());
}

#[test]
fn test_dropping_the_store_also_cleans_up() {
    let source = tempfile::tempdir().unwrap();
    let work_root = tempfile::tempdir().unwrap();
    let archive = wallet_zip(source.path(), WALLET_PASSPHRASE, None);
    let registry = NetworkRegistry::new();

    let store = CredentialProvisioner::new(&registry)
        .with_work_root(work_root.path())
        .provision(bundle(&archive, WALLET_PASSPHRASE, true))
        .unwrap();
    drop(store);

    assert_eq!(entry_count(work_root.path()), 0);
    assert!(registry.get().is_none());
}

#[test]
fn test_wrong_passphrase_fails_without_writing_stores() {
    let source = tempfile::tempdir().unwrap();
    let work_root = tempfile::tempdir().unwrap();
    let archive = wallet_zip(source.path(), WALLET_PASSPHRASE, None);
    let registry = NetworkRegistry::new();

    let result = CredentialProvisioner::new(&registry)
        .with_work_root(work_root.path())
        .provision(bundle(&archive, "WrongPassw0rd!", true));

    assert!(matches!(result, Err(Error::InvalidCredentials(_))));
    assert!(!registry.is_registered());
    // the half-built working directory is gone as well
    assert_eq!(entry_count(work_root.path()), 0);
}

#[test]
fn test_stores_use_a_derived_password() {
    let source = tempfile::tempdir().unwrap();
    let work_root = tempfile::tempdir().unwrap();
    let archive = wallet_zip(source.path(), WALLET_PASSPHRASE, None);
    let registry = NetworkRegistry::new();

    let store = CredentialProvisioner::new(&registry)
        .with_work_root(work_root.path())
        .provision(bundle(&archive, WALLET_PASSPHRASE, true))
        .unwrap();

    let password = store.store_password().clone();
    assert_ne!(password.expose(), WALLET_PASSPHRASE);

    let keys = open_key_store(store.key_store(), &password).unwrap();
    assert!(keys.private_key_chain().is_some());
    let trust = open_trust_store(store.trust_store(), &password).unwrap();
    assert!(trust.private_key_chain().is_none());
    assert_eq!(trust.entries_count(), 1);

    let original = Secret::new(WALLET_PASSPHRASE);
    assert!(matches!(
        open_key_store(store.key_store(), &original),
        Err(Error::InvalidCredentials(_))
    ));
    assert!(matches!(
        open_trust_store(store.trust_store(), &original),
        Err(Error::InvalidCredentials(_))
    ));

    store.close().unwrap();
}

#[test]
fn test_registered_properties_mask_passwords() {
    let source = tempfile::tempdir().unwrap();
    let work_root = tempfile::tempdir().unwrap();
    let archive = wallet_zip(source.path(), WALLET_PASSPHRASE, None);
    let registry = NetworkRegistry::new();

    let store = CredentialProvisioner::new(&registry)
        .with_work_root(work_root.path())
        .provision(bundle(&archive, WALLET_PASSPHRASE, true))
        .unwrap();

    let properties = store.settings().properties();
    assert_eq!(properties.len(), 7);
    let password = store.store_password().expose().to_string();
    assert!(properties.iter().all(|(_, value)| !value.contains(&password)));
    assert!(properties
        .iter()
        .any(|(name, value)| *name == "tls.keyStore" && value.ends_with("bench_keystore.p12")));

    store.close().unwrap();
}

#[test]
fn test_second_provision_is_rejected() {
    let source = tempfile::tempdir().unwrap();
    let work_root = tempfile::tempdir().unwrap();
    let archive = wallet_zip(source.path(), WALLET_PASSPHRASE, None);
    let registry = NetworkRegistry::new();
    let provisioner = CredentialProvisioner::new(&registry).with_work_root(work_root.path());

    let store = provisioner.provision(bundle(&archive, WALLET_PASSPHRASE, true)).unwrap();
    let again = provisioner.provision(bundle(&archive, WALLET_PASSPHRASE, true));
    assert!(matches!(again, Err(Error::InvalidState(_))));
    // only the first working directory survives the rejected attempt
    assert_eq!(entry_count(work_root.path()), 1);

    store.close().unwrap();
    let after_close = provisioner.provision(bundle(&archive, WALLET_PASSPHRASE, true));
    assert!(matches!(after_close, Err(Error::InvalidState(_))));
    assert_eq!(entry_count(work_root.path()), 0);
}

#[test]
fn test_keep_workdir_leaves_directory() {
    let source = tempfile::tempdir().unwrap();
    let work_root = tempfile::tempdir().unwrap();
    let archive = wallet_zip(source.path(), WALLET_PASSPHRASE, None);
    let registry = NetworkRegistry::new();

    let store = CredentialProvisioner::new(&registry)
        .with_work_root(work_root.path())
        .provision(bundle(&archive, WALLET_PASSPHRASE, false))
        .unwrap();
    let key_store = store.key_store().to_path_buf();
    store.close().unwrap();

    assert!(key_store.is_file());
    assert!(registry.get().is_none());
}

#[test]
fn test_missing_archive_is_io_failure() {
    let work_root = tempfile::tempdir().unwrap();
    let registry = NetworkRegistry::new();

    let result = CredentialProvisioner::new(&registry)
        .with_work_root(work_root.path())
        .provision(bundle(&work_root.path().join("absent.zip"), WALLET_PASSPHRASE, true));

    assert!(matches!(result, Err(Error::IoFailure(_))));
    assert_eq!(entry_count(work_root.path()), 0);
}

#[tokio::test]
async fn test_alias_resolves_through_provisioned_wallet() {
    let source = tempfile::tempdir().unwrap();
    let work_root = tempfile::tempdir().unwrap();
    let archive = wallet_zip(source.path(), WALLET_PASSPHRASE, Some(TNSNAMES));
    let registry = NetworkRegistry::new();

    let store = CredentialProvisioner::new(&registry)
        .with_work_root(work_root.path())
        .provision(bundle(&archive, WALLET_PASSPHRASE, true))
        .unwrap();

    let driver = StubDriver::succeeding(Duration::ZERO);
    let factory = ConnectionFactory::new(driver.clone())
        .with_network(store.settings())
        .unwrap();

    let params = ConnectionParameters::new(
        "BenchDB_High",
        "admin",
        Secret::new("pw"),
        PoolingMode::Direct,
        DriverMode::Thin,
    )
    .unwrap();
    let connection = factory.open(&params).await.unwrap();
    connection.close().await.unwrap();

    {
        let requests = driver.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].endpoint.host, "db.example.com");
        assert_eq!(requests[0].endpoint.port, 1522);
        assert_eq!(requests[0].endpoint.service.as_deref(), Some("bench_high"));
        assert!(requests[0].endpoint.requires_tls());
        assert!(requests[0].tls.is_some());
    }

    let unknown = ConnectionParameters::new(
        "nosuchalias",
        "admin",
        Secret::new("pw"),
        PoolingMode::Direct,
        DriverMode::Thin,
    )
    .unwrap();
    assert!(matches!(factory.open(&unknown).await, Err(Error::ConnectFailure(_))));
    assert_eq!(driver.calls(), 1);

    drop(factory);
    store.close().unwrap();
}
