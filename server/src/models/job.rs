//! OTA job models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rollout pacing and per-device execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Maximum update commands dispatched per minute
    #[serde(default = "default_max_per_minute")]
    pub max_per_minute: u32,

    /// In-progress timeout communicated to devices, minutes
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u32,

    /// Retry attempts communicated to devices
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_max_per_minute() -> u32 {
    5
}

fn default_timeout_minutes() -> u32 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            max_per_minute: default_max_per_minute(),
            timeout_minutes: default_timeout_minutes(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

/// An OTA rollout job targeting a set of devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtaJob {
    /// Globally unique job identifier
    pub job_id: String,

    /// Firmware version being rolled out
    pub firmware_version: String,

    /// Device type the job targets
    pub device_type: String,

    /// Rollout configuration
    pub rollout_config: RolloutConfig,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Generate a job ID: derived from the target type and version, with a
/// random suffix so retried creations never collide
pub fn generate_job_id(device_type: &str, firmware_version: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "ota-{}-{}-{}",
        device_type,
        firmware_version,
        &suffix[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_shape() {
        let id = generate_job_id("sensor", "1.2.0");
        assert!(id.starts_with("ota-sensor-1.2.0-"));
        assert_eq!(id.len(), "ota-sensor-1.2.0-".len() + 8);
    }

    #[test]
    fn test_job_id_randomized() {
        let a = generate_job_id("sensor", "1.2.0");
        let b = generate_job_id("sensor", "1.2.0");
        assert_ne!(a, b);
    }

    #[test]
    fn test_rollout_config_defaults() {
        let config = RolloutConfig::default();
        assert_eq!(config.max_per_minute, 5);
        assert_eq!(config.timeout_minutes, 30);
        assert_eq!(config.retry_attempts, 3);
    }
}
