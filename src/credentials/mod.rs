use crate::models::TrackedImage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("no credentials available for image")]
    NotAvailable,
    #[error("registry not supported by this helper")]
    UnsupportedRegistry,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Username/password pair for a registry
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Resolves registry credentials for a tracked image. Implementations are
/// queried in order; the first enabled helper with a match wins.
#[async_trait]
pub trait CredentialsHelper: Send + Sync {
    fn is_enabled(&self) -> bool;
    async fn get_credentials(&self, image: &TrackedImage) -> Result<Credentials, CredentialsError>;
}

/// Ordered chain of credential helpers
#[derive(Default)]
pub struct CredentialsRegistry {
    helpers: Vec<Arc<dyn CredentialsHelper>>,
}

impl CredentialsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, helper: Arc<dyn CredentialsHelper>) {
        self.helpers.push(helper);
    }

    /// Queries every enabled helper in registration order. Falls back to
    /// anonymous access (NotAvailable) when nothing matches.
    pub async fn get_credentials(
        &self,
        image: &TrackedImage,
    ) -> Result<Credentials, CredentialsError> {
        for helper in &self.helpers {
            if !helper.is_enabled() {
                continue;
            }
            match helper.get_credentials(image).await {
                Ok(creds) => return Ok(creds),
                Err(CredentialsError::NotAvailable | CredentialsError::UnsupportedRegistry) => {}
                Err(error) => {
                    warn!(image = %image.image.name(), %error, "credentials helper failed");
                }
            }
        }
        Err(CredentialsError::NotAvailable)
    }
}

/// Docker config.json structure
#[derive(Debug, Deserialize)]
struct DockerConfig {
    auths: HashMap<String, DockerAuthEntry>,
}

/// Auth entry in docker config
#[derive(Debug, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Credentials helper backed by a docker `config.json` file
pub struct DockerConfigHelper {
    path: Option<PathBuf>,
}

impl DockerConfigHelper {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    fn load(&self) -> Result<DockerConfig> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no docker config path configured"))?;
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read docker config at {}", path.display()))?;
        let config: DockerConfig =
            serde_json::from_slice(&raw).context("failed to parse docker config")?;
        Ok(config)
    }
}

#[async_trait]
impl CredentialsHelper for DockerConfigHelper {
    fn is_enabled(&self) -> bool {
        self.path.as_ref().is_some_and(|p| p.exists())
    }

    async fn get_credentials(&self, image: &TrackedImage) -> Result<Credentials, CredentialsError> {
        let config = self.load().map_err(CredentialsError::Other)?;
        let registry = image.image.registry();

        // exact match first, then https:// prefixed keys and hub aliases
        if let Some(entry) = config.auths.get(registry) {
            if let Some(creds) = parse_auth_entry(entry)? {
                return Ok(creds);
            }
        }
        for (key, entry) in &config.auths {
            if registry_matches(key, registry) {
                if let Some(creds) = parse_auth_entry(entry)? {
                    return Ok(creds);
                }
            }
        }

        debug!(registry, "no matching docker config entry");
        Err(CredentialsError::NotAvailable)
    }
}

fn parse_auth_entry(entry: &DockerAuthEntry) -> Result<Option<Credentials>, CredentialsError> {
    if !entry.username.is_empty() && !entry.password.is_empty() {
        return Ok(Some(Credentials {
            username: entry.username.clone(),
            password: entry.password.clone(),
        }));
    }

    // base64 encoded username:password
    if !entry.auth.is_empty() {
        let decoded = BASE64_STANDARD
            .decode(entry.auth.as_bytes())
            .context("failed to decode auth token")?;
        let auth_str = String::from_utf8(decoded).context("auth token is not valid UTF-8")?;
        if let Some((username, password)) = auth_str.split_once(':') {
            return Ok(Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }));
        }
    }

    Ok(None)
}

/// Check if a docker config key matches the target registry
fn registry_matches(key: &str, target: &str) -> bool {
    let key_clean = key
        .trim_start_matches("https://")
        .trim_start_matches("http://");

    if key_clean == target {
        return true;
    }

    // Docker Hub aliases
    if target == "index.docker.io" {
        return key_clean == "docker.io"
            || key_clean == "registry-1.docker.io"
            || key_clean == "index.docker.io/v1/"
            || key_clean == "registry-1.docker.io/v1/";
    }

    false
}
