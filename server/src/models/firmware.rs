//! Firmware version models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a registered firmware build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FirmwareStatus {
    /// Eligible for new rollout jobs
    #[default]
    Available,

    /// Kept for the audit trail but no longer deployable
    Deprecated,
}

/// A registered firmware build for one device type
///
/// Keyed by `(device_type, version)`. Entries are append-only: once a job
/// references a version, the entry is never mutated. Corrections ship as a
/// new version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Type of device this build targets (e.g., "sensor", "gateway")
    pub device_type: String,

    /// Firmware version string
    pub version: String,

    /// Location of the binary in the artifact store
    pub artifact_location: String,

    /// Optional hex SHA-256 digest of the artifact, forwarded to devices
    /// so they can verify the download
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Lifecycle status
    #[serde(default)]
    pub status: FirmwareStatus,

    /// Free-form metadata supplied at registration
    #[serde(default)]
    pub metadata: serde_json::Value,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl FirmwareVersion {
    pub fn is_available(&self) -> bool {
        self.status == FirmwareStatus::Available
    }
}
