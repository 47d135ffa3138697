// src/secrets/aws.rs

use std::io::Write;

use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::cloud::{AwsCli, AwsFailure};
use crate::errors::{CloudrefError, Result};
use crate::exec::BoxFuture;
use crate::secrets::SecretBackend;

const NOT_FOUND: &str = "ResourceNotFoundException";
const EXISTS: &str = "ResourceExistsException";

/// AWS Secrets Manager through the AWS CLI.
pub struct AwsSecretsManager {
    cli: AwsCli,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecretValueResponse {
    #[serde(default)]
    secret_string: Option<String>,
}

impl AwsSecretsManager {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    fn map_failure(name: &str, operation: &str, failure: AwsFailure) -> CloudrefError {
        if failure.is(NOT_FOUND) {
            CloudrefError::NotFound(name.to_string())
        } else if failure.is(EXISTS) {
            CloudrefError::SecretExists(name.to_string())
        } else {
            CloudrefError::SecretStoreError(format!("{operation} '{name}': {}", failure.message))
        }
    }

    async fn get(&self, name: &str) -> Result<String> {
        let args = vec!["--secret-id".to_string(), name.to_string()];
        let resp: SecretValueResponse = self
            .cli
            .call("secretsmanager", "get-secret-value", &args, true)
            .await?
            .map_err(|f| Self::map_failure(name, "get-secret-value", f))?;

        resp.secret_string.ok_or_else(|| {
            CloudrefError::SecretStoreError(format!("secret '{name}' has no string value"))
        })
    }

    async fn create(&self, name: &str, value: &str) -> Result<()> {
        let payload = payload_file(value)?;
        let args = vec![
            "--name".to_string(),
            name.to_string(),
            "--secret-string".to_string(),
            file_arg(&payload),
        ];
        let _: serde_json::Value = self
            .cli
            .call("secretsmanager", "create-secret", &args, true)
            .await?
            .map_err(|f| Self::map_failure(name, "create-secret", f))?;
        Ok(())
    }

    async fn update(&self, name: &str, value: &str) -> Result<()> {
        let payload = payload_file(value)?;
        let args = vec![
            "--secret-id".to_string(),
            name.to_string(),
            "--secret-string".to_string(),
            file_arg(&payload),
        ];
        let _: serde_json::Value = self
            .cli
            .call("secretsmanager", "update-secret", &args, true)
            .await?
            .map_err(|f| Self::map_failure(name, "update-secret", f))?;
        Ok(())
    }
}

/// Secret values go through a private temp file (mode 0600 on unix) so they
/// never show up in the process list. The file is removed on drop.
fn payload_file(value: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("cloudref-secret-")
        .tempfile()?;
    file.write_all(value.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn file_arg(file: &NamedTempFile) -> String {
    format!("file://{}", file.path().display())
}

impl SecretBackend for AwsSecretsManager {
    fn get_secret<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.get(name))
    }

    fn create_secret<'a>(&'a self, name: &'a str, value: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.create(name, value))
    }

    fn update_secret<'a>(&'a self, name: &'a str, value: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.update(name, value))
    }
}
