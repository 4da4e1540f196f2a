use async_trait::async_trait;
use oci_distribution::{Client as OciClient, Reference, secrets::RegistryAuth};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),
    #[error("registry request failed: {0}")]
    Request(String),
}

/// Request parameters for a registry operation
#[derive(Debug, Clone, Default)]
pub struct Opts {
    /// Registry hostname, optionally with a scheme prefix
    pub registry: String,
    /// Repository name, ie: `library/nginx`
    pub name: String,
    pub tag: String,
    pub username: String,
    pub password: String,
}

impl Opts {
    fn auth(&self) -> RegistryAuth {
        if self.username.is_empty() {
            RegistryAuth::Anonymous
        } else {
            RegistryAuth::Basic(self.username.clone(), self.password.clone())
        }
    }

    fn reference(&self) -> Result<Reference, RegistryError> {
        let host = self
            .registry
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let raw = format!("{}/{}:{}", host, self.name, self.tag);
        Reference::try_from(raw.as_str()).map_err(|e| RegistryError::InvalidReference(e.to_string()))
    }
}

/// Tag listing for a repository
#[derive(Debug, Clone)]
pub struct Repository {
    pub name: String,
    pub tags: Vec<String>,
}

/// Remote registry operations needed by the watcher
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the manifest digest for a specific tag
    async fn digest(&self, opts: Opts) -> Result<String, RegistryError>;
    /// List all tags in a repository
    async fn get(&self, opts: Opts) -> Result<Repository, RegistryError>;
}

/// Registry client backed by the OCI distribution API
pub struct OciRegistryClient;

impl OciRegistryClient {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OciRegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryClient for OciRegistryClient {
    async fn digest(&self, opts: Opts) -> Result<String, RegistryError> {
        let reference = opts.reference()?;
        let auth = opts.auth();

        debug!(registry = %opts.registry, image = %opts.name, tag = %opts.tag, "fetching digest");

        let client = OciClient::new(Default::default());
        let digest = client
            .fetch_manifest_digest(&reference, &auth)
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;

        Ok(digest)
    }

    async fn get(&self, opts: Opts) -> Result<Repository, RegistryError> {
        let reference = opts.reference()?;
        let auth = opts.auth();

        debug!(registry = %opts.registry, image = %opts.name, "listing tags");

        let client = OciClient::new(Default::default());
        let response = client
            .list_tags(&reference, &auth, None, None)
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;

        Ok(Repository {
            name: response.name,
            tags: response.tags,
        })
    }
}
