//! Per-device execution models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution status of one device within one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

impl DeviceStatus {
    /// Terminal statuses admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeviceStatus::Succeeded | DeviceStatus::Failed | DeviceStatus::Cancelled
        )
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceStatus::Queued => "QUEUED",
            DeviceStatus::InProgress => "IN_PROGRESS",
            DeviceStatus::Succeeded => "SUCCEEDED",
            DeviceStatus::Failed => "FAILED",
            DeviceStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// One device's execution record for one job
///
/// Keyed by `(job_id, device_id)`. Records are the audit trail: retained
/// permanently, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceExecutionRecord {
    pub job_id: String,
    pub device_id: String,
    pub status: DeviceStatus,

    /// Event time of the last accepted update
    pub last_updated: DateTime<Utc>,

    /// Details reported alongside the last accepted status
    #[serde(default)]
    pub status_details: serde_json::Value,
}

impl DeviceExecutionRecord {
    /// Create a fresh QUEUED record for a targeted device
    pub fn queued(job_id: &str, device_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.to_string(),
            device_id: device_id.to_string(),
            status: DeviceStatus::Queued,
            last_updated: at,
            status_details: serde_json::Value::Null,
        }
    }
}

/// An asynchronous status callback from a device
///
/// Delivered at-least-once and potentially out of order; `event_time` is the
/// device-side timestamp the tracker orders by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub device_id: String,
    pub job_id: String,
    pub status: DeviceStatus,

    #[serde(default)]
    pub status_details: serde_json::Value,

    pub event_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!DeviceStatus::Queued.is_terminal());
        assert!(!DeviceStatus::InProgress.is_terminal());
        assert!(DeviceStatus::Succeeded.is_terminal());
        assert!(DeviceStatus::Failed.is_terminal());
        assert!(DeviceStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&DeviceStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let back: DeviceStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(back, DeviceStatus::Cancelled);
    }
}
