// src/secrets/mod.rs

//! Secret store client.
//!
//! Secrets are flat JSON objects of string values stored under hierarchical
//! names such as `openbao/cloud-native-ref/tokens/root`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{CloudrefError, Result};
use crate::exec::BoxFuture;

pub mod aws;
pub mod memory;

pub use aws::AwsSecretsManager;
pub use memory::MemorySecretBackend;

/// Decoded secret payload.
pub type SecretData = BTreeMap<String, String>;

/// Raw storage operations of a secret service. Values are opaque strings.
pub trait SecretBackend: Send + Sync {
    /// Fails with `NotFound(name)` when no secret has that name.
    fn get_secret<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Fails with `SecretExists(name)` when the name is already taken.
    fn create_secret<'a>(&'a self, name: &'a str, value: &'a str) -> BoxFuture<'a, Result<()>>;

    fn update_secret<'a>(&'a self, name: &'a str, value: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Typed access to a [`SecretBackend`].
#[derive(Clone)]
pub struct SecretClient {
    backend: Arc<dyn SecretBackend>,
}

impl SecretClient {
    pub fn new(backend: Arc<dyn SecretBackend>) -> Self {
        Self { backend }
    }

    pub async fn get(&self, name: &str) -> Result<SecretData> {
        let raw = self.backend.get_secret(name).await?;
        serde_json::from_str(&raw).map_err(|e| {
            CloudrefError::SecretStoreError(format!("secret '{name}' is not a flat JSON object: {e}"))
        })
    }

    /// Create the secret if absent, overwrite it otherwise.
    pub async fn put(&self, name: &str, data: &SecretData) -> Result<()> {
        let value = serde_json::to_string(data)?;

        match self.backend.get_secret(name).await {
            Ok(_) => {
                debug!(secret = %name, "secret exists; updating");
                self.backend.update_secret(name, &value).await?;
            }
            Err(CloudrefError::NotFound(_)) => {
                debug!(secret = %name, "secret missing; creating");
                match self.backend.create_secret(name, &value).await {
                    Ok(()) => {}
                    // Someone created it between our get and create.
                    Err(CloudrefError::SecretExists(_)) => {
                        debug!(secret = %name, "secret created concurrently; updating");
                        self.backend.update_secret(name, &value).await?;
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }

        info!(secret = %name, keys = data.len(), "secret stored");
        Ok(())
    }
}
