//! Firmware artifact store access
//!
//! The artifact store is owned by a separate collaborator; the registry only
//! ever checks that a location resolves, it never reads or writes binaries.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::errors::OtaError;

/// Existence check against the firmware artifact store
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Whether `location` resolves to a stored artifact
    async fn exists(&self, location: &str) -> Result<bool, OtaError>;
}

/// HTTP-backed artifact store
///
/// Issues a HEAD request for the artifact location relative to the store's
/// base URL. 404 means the artifact does not exist; other failure statuses
/// are surfaced as Transient so registration can be retried.
pub struct HttpArtifactStore {
    client: Client,
    base_url: Url,
}

impl HttpArtifactStore {
    pub fn new(base_url: &str) -> Result<Self, OtaError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| OtaError::ConfigError(format!("invalid artifact store URL: {}", e)))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn exists(&self, location: &str) -> Result<bool, OtaError> {
        let url = self
            .base_url
            .join(location)
            .map_err(|e| OtaError::InvalidArgument(format!("invalid artifact location: {}", e)))?;

        debug!("HEAD {}", url);
        let response = self.client.head(url).send().await?;

        if response.status().is_success() {
            Ok(true)
        } else if response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(OtaError::Transient(format!(
                "artifact store returned {}",
                response.status()
            )))
        }
    }
}

/// In-memory artifact store, for tests and local development
pub struct MemoryArtifactStore {
    locations: RwLock<HashSet<String>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            locations: RwLock::new(HashSet::new()),
        }
    }

    pub fn with_artifacts(locations: &[&str]) -> Self {
        Self {
            locations: RwLock::new(locations.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn add(&self, location: &str) {
        let mut locations = self.locations.write().unwrap_or_else(|e| e.into_inner());
        locations.insert(location.to_string());
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn exists(&self, location: &str) -> Result<bool, OtaError> {
        let locations = self.locations.read().unwrap_or_else(|e| e.into_inner());
        Ok(locations.contains(location))
    }
}
