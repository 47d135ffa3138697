// src/secrets/memory.rs

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::{CloudrefError, Result};
use crate::exec::BoxFuture;
use crate::secrets::SecretBackend;

/// In-process secret backend. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretBackend {
    secrets: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemorySecretBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.secrets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a raw value directly.
    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        self.lock().insert(name.into(), value.into());
    }

    pub fn raw(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl SecretBackend for MemorySecretBackend {
    fn get_secret<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>> {
        let found = self.raw(name);
        Box::pin(async move { found.ok_or_else(|| CloudrefError::NotFound(name.to_string())) })
    }

    fn create_secret<'a>(&'a self, name: &'a str, value: &'a str) -> BoxFuture<'a, Result<()>> {
        let result = {
            let mut secrets = self.lock();
            if secrets.contains_key(name) {
                Err(CloudrefError::SecretExists(name.to_string()))
            } else {
                secrets.insert(name.to_string(), value.to_string());
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn update_secret<'a>(&'a self, name: &'a str, value: &'a str) -> BoxFuture<'a, Result<()>> {
        let result = {
            let mut secrets = self.lock();
            match secrets.get_mut(name) {
                Some(slot) => {
                    *slot = value.to_string();
                    Ok(())
                }
                None => Err(CloudrefError::NotFound(name.to_string())),
            }
        };
        Box::pin(async move { result })
    }
}
