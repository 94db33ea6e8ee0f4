use async_trait::async_trait;
use keyring::Entry;
use tokio::task;

use super::{SessionStore, StoreError};

const SERVICE_NAME: &str = "assetdesk";

/// Session store backed by the OS keychain, one entry per key.
///
/// Keychain calls block (D-Bus, Keychain Services), so each operation runs
/// on tokio's blocking pool.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a different keychain service name, e.g. to keep test runs apart
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Run `op` against the entries of this service off the async worker
    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&str) -> Result<T, StoreError> + Send + 'static,
    {
        let service = self.service.clone();
        task::spawn_blocking(move || op(&service)).await?
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.blocking(move |service| match Entry::new(service, &key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        self.blocking(move |service| {
            Entry::new(service, &key)?.set_password(&value)?;
            Ok(())
        })
        .await
    }

    async fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.blocking(move |service| {
            for key in &keys {
                match Entry::new(service, key)?.delete_credential() {
                    Ok(()) | Err(keyring::Error::NoEntry) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })
        .await
    }
}
