//! Firmware version registry
//!
//! Records known firmware builds per device type and validates that the
//! referenced artifact exists before a version becomes registrable. The
//! registry never writes binaries; the artifact store is an external
//! collaborator reached through [`ArtifactStore`].

pub mod artifacts;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::info;

use crate::errors::OtaError;
use crate::models::firmware::{FirmwareStatus, FirmwareVersion};
use crate::registry::artifacts::ArtifactStore;

/// Registration request for a new firmware build
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub device_type: String,
    pub version: String,
    pub artifact_location: String,
    pub checksum: Option<String>,
    pub metadata: serde_json::Value,
}

/// Firmware version registry keyed by (device_type, version)
///
/// Entries are append-only: there is no update operation, corrections ship
/// as a new version.
pub struct FirmwareRegistry {
    artifact_store: Arc<dyn ArtifactStore>,
    versions: RwLock<HashMap<(String, String), FirmwareVersion>>,
}

impl FirmwareRegistry {
    pub fn new(artifact_store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            artifact_store,
            versions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new firmware version.
    ///
    /// Fails Conflict if (device_type, version) already exists and NotFound
    /// if the artifact cannot be resolved in the artifact store.
    pub async fn register(&self, request: RegisterRequest) -> Result<FirmwareVersion, OtaError> {
        if request.device_type.is_empty() || request.version.is_empty() {
            return Err(OtaError::InvalidArgument(
                "device_type and version are required".to_string(),
            ));
        }

        if !self.artifact_store.exists(&request.artifact_location).await? {
            return Err(OtaError::NotFound(format!(
                "firmware artifact not found: {}",
                request.artifact_location
            )));
        }

        let entry = FirmwareVersion {
            device_type: request.device_type.clone(),
            version: request.version.clone(),
            artifact_location: request.artifact_location,
            checksum: request.checksum,
            status: FirmwareStatus::Available,
            metadata: request.metadata,
            created_at: Utc::now(),
        };

        let key = (request.device_type, request.version);
        let mut versions = self.versions.write().unwrap_or_else(|e| e.into_inner());
        if versions.contains_key(&key) {
            return Err(OtaError::Conflict(format!(
                "firmware version {} already exists for device type {}",
                key.1, key.0
            )));
        }
        versions.insert(key, entry.clone());

        info!(
            "Registered firmware version {} for device type {}",
            entry.version, entry.device_type
        );
        Ok(entry)
    }

    /// List registered versions, optionally filtered by device type
    pub fn list(&self, device_type: Option<&str>) -> Vec<FirmwareVersion> {
        let versions = self.versions.read().unwrap_or_else(|e| e.into_inner());
        versions
            .values()
            .filter(|v| device_type.is_none_or(|t| v.device_type == t))
            .cloned()
            .collect()
    }

    /// Get one version, or NotFound
    pub fn get(&self, device_type: &str, version: &str) -> Result<FirmwareVersion, OtaError> {
        let versions = self.versions.read().unwrap_or_else(|e| e.into_inner());
        versions
            .get(&(device_type.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| {
                OtaError::NotFound(format!(
                    "firmware version {} not found for device type {}",
                    version, device_type
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::artifacts::MemoryArtifactStore;

    fn request(device_type: &str, version: &str, location: &str) -> RegisterRequest {
        RegisterRequest {
            device_type: device_type.to_string(),
            version: version.to_string(),
            artifact_location: location.to_string(),
            checksum: None,
            metadata: serde_json::Value::Null,
        }
    }

    fn registry_with(artifacts: &[&str]) -> FirmwareRegistry {
        let store = Arc::new(MemoryArtifactStore::with_artifacts(artifacts));
        FirmwareRegistry::new(store)
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = registry_with(&["sensor/fw-1.0.0.bin"]);
        registry
            .register(request("sensor", "1.0.0", "sensor/fw-1.0.0.bin"))
            .await
            .unwrap();

        let entry = registry.get("sensor", "1.0.0").unwrap();
        assert_eq!(entry.artifact_location, "sensor/fw-1.0.0.bin");
        assert!(entry.is_available());
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let registry = registry_with(&["sensor/fw-1.0.0.bin"]);
        registry
            .register(request("sensor", "1.0.0", "sensor/fw-1.0.0.bin"))
            .await
            .unwrap();

        let err = registry
            .register(request("sensor", "1.0.0", "sensor/fw-1.0.0.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, OtaError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_missing_artifact_rejected() {
        let registry = registry_with(&[]);
        let err = registry
            .register(request("sensor", "1.0.0", "sensor/fw-1.0.0.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, OtaError::NotFound(_)));
        assert!(registry.get("sensor", "1.0.0").is_err());
    }

    #[tokio::test]
    async fn test_list_filters_by_device_type() {
        let registry = registry_with(&["a.bin", "b.bin"]);
        registry
            .register(request("sensor", "1.0.0", "a.bin"))
            .await
            .unwrap();
        registry
            .register(request("gateway", "2.0.0", "b.bin"))
            .await
            .unwrap();

        assert_eq!(registry.list(None).len(), 2);
        let sensors = registry.list(Some("sensor"));
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].version, "1.0.0");
    }
}
