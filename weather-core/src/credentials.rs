use std::{collections::HashMap, fmt::Debug, sync::Arc};

use anyhow::{Context, Result, bail};
use keyring::Entry;
use parking_lot::Mutex;

/// Keyring user name under which the API key is filed.
const API_KEY_USER: &str = "api-key";

/// Secret storage keyed by service identifier.
pub trait CredentialStore: Send + Sync + Debug {
    /// Returns the stored secret, or `None` when nothing is stored.
    fn get(&self, service: &str) -> Option<String>;

    fn set(&self, service: &str, secret: &str) -> Result<()>;

    /// Deleting an absent secret is not an error.
    fn delete(&self, service: &str) -> Result<()>;
}

/// OS keychain (macOS Keychain, Windows Credential Manager, Secret Service).
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl KeyringStore {
    fn entry(service: &str) -> Result<Entry> {
        Entry::new(service, API_KEY_USER)
            .with_context(|| format!("Failed to open keyring entry for {service}"))
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, service: &str) -> Option<String> {
        let entry = match Self::entry(service) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("{err:#}");
                return None;
            }
        };

        match entry.get_password() {
            Ok(secret) => Some(secret),
            Err(keyring::Error::NoEntry) => None,
            Err(err) => {
                tracing::warn!(service, "unable to read API key from keyring: {err}");
                None
            }
        }
    }

    fn set(&self, service: &str, secret: &str) -> Result<()> {
        Self::entry(service)?
            .set_password(secret)
            .with_context(|| format!("Failed to store API key for {service}"))?;
        tracing::info!(service, "stored API key in keyring");
        Ok(())
    }

    fn delete(&self, service: &str) -> Result<()> {
        match Self::entry(service)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                tracing::info!(service, "deleted API key from keyring");
                Ok(())
            }
            Err(err) => Err(err).with_context(|| format!("Failed to delete API key for {service}")),
        }
    }
}

/// Process-local store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn with_secret(service: &str, secret: &str) -> Self {
        let store = Self::default();
        store.secrets.lock().insert(service.to_owned(), secret.to_owned());
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, service: &str) -> Option<String> {
        self.secrets.lock().get(service).cloned()
    }

    fn set(&self, service: &str, secret: &str) -> Result<()> {
        self.secrets.lock().insert(service.to_owned(), secret.to_owned());
        Ok(())
    }

    fn delete(&self, service: &str) -> Result<()> {
        self.secrets.lock().remove(service);
        Ok(())
    }
}

/// The one secret slot this application uses: the API key for a service name.
#[derive(Debug, Clone)]
pub struct ApiKeySlot {
    store: Arc<dyn CredentialStore>,
    service: String,
}

impl ApiKeySlot {
    pub fn new(store: Arc<dyn CredentialStore>, service: impl Into<String>) -> Self {
        Self { store, service: service.into() }
    }

    pub fn get(&self) -> Option<String> {
        self.store.get(&self.service)
    }

    pub fn is_present(&self) -> bool {
        self.get().is_some()
    }

    /// Refuses empty keys; the API rejects them anyway.
    pub fn save(&self, api_key: &str) -> Result<()> {
        if api_key.trim().is_empty() {
            bail!("Refusing to store an empty API key");
        }
        self.store.set(&self.service, api_key)
    }

    pub fn delete(&self) -> Result<()> {
        self.store.delete(&self.service)
    }
}
