//! Cloud wallet provisioning
//!
//! Turns a zip wallet into a key store and a trust store on disk and
//! publishes their locations to the [`NetworkRegistry`]. The resulting
//! [`ProvisionedStore`] owns the working directory: closing or dropping it
//! withdraws the registered settings and removes the directory.

pub mod archive;
pub mod cleanup;
pub mod truststore;

use crate::config::{CredentialBundle, Secret};
use crate::error::Result;
use crate::net::{NetworkRegistry, NetworkSettings, TlsPolicy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub use cleanup::{recursive_delete, WorkDir};
pub use truststore::{derive_store_password, open_key_store, open_trust_store, BuiltStores};

/// Orchestrates extraction, store migration and registration
pub struct CredentialProvisioner<'r> {
    registry: &'r NetworkRegistry,
    tls: TlsPolicy,
    work_root: PathBuf,
}

impl<'r> CredentialProvisioner<'r> {
    pub fn new(registry: &'r NetworkRegistry) -> Self {
        Self {
            registry,
            tls: TlsPolicy::default(),
            work_root: std::env::temp_dir(),
        }
    }

    pub fn with_tls_policy(mut self, tls: TlsPolicy) -> Self {
        self.tls = tls;
        self
    }

    /// Parent directory for the ephemeral working directory
    pub fn with_work_root(mut self, work_root: impl Into<PathBuf>) -> Self {
        self.work_root = work_root.into();
        self
    }

    /// Provision the bundle. Must run to completion before any connection
    /// attempt and at most once per registry.
    pub fn provision(&self, bundle: CredentialBundle) -> Result<ProvisionedStore<'r>> {
        info!("Provisioning credentials from {}", bundle.archive().display());

        truststore::check_crypto_policy()?;

        let mut workdir = archive::extract_in(bundle.archive(), &self.work_root)?;
        workdir.set_delete_on_exit(bundle.delete_on_exit());
        debug!("Extracted wallet to {}", workdir.path().display());

        let built = truststore::build(workdir.path(), bundle.passphrase())?;

        let settings = self.registry.register(NetworkSettings {
            trust_store: built.trust_store,
            trust_store_password: built.store_password.clone(),
            key_store: built.key_store,
            key_store_password: built.store_password,
            config_dir: workdir.path().to_path_buf(),
            tls: self.tls,
        })?;
        debug!("Registered network settings for {}", settings.config_dir.display());

        Ok(ProvisionedStore {
            settings,
            registry: self.registry,
            workdir: Some(workdir),
        })
    }
}

/// Provisioned key and trust stores backed by an ephemeral directory
#[derive(Debug)]
pub struct ProvisionedStore<'r> {
    settings: Arc<NetworkSettings>,
    registry: &'r NetworkRegistry,
    workdir: Option<WorkDir>,
}

impl ProvisionedStore<'_> {
    pub fn key_store(&self) -> &Path {
        &self.settings.key_store
    }

    pub fn trust_store(&self) -> &Path {
        &self.settings.trust_store
    }

    pub fn store_password(&self) -> &Secret {
        &self.settings.key_store_password
    }

    pub fn config_dir(&self) -> &Path {
        &self.settings.config_dir
    }

    pub fn settings(&self) -> Arc<NetworkSettings> {
        Arc::clone(&self.settings)
    }

    /// Withdraw the registered settings and tear the working directory down.
    ///
    /// Call only after every connection attempt has finished.
    pub fn close(mut self) -> Result<()> {
        self.registry.withdraw();
        match self.workdir.take() {
            Some(workdir) => workdir.close(),
            None => Ok(()),
        }
    }
}

impl Drop for ProvisionedStore<'_> {
    fn drop(&mut self) {
        if self.workdir.is_some() {
            self.registry.withdraw();
        }
    }
}
