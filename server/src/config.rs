//! Settings file management

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::OtaError;
use crate::logs::LogLevel;

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// MQTT broker configuration
    #[serde(default)]
    pub mqtt_broker: MqttBrokerSettings,

    /// Firmware artifact store configuration
    #[serde(default)]
    pub artifact_store: ArtifactStoreSettings,

    /// Rollout policy configuration
    #[serde(default)]
    pub rollout: RolloutSettings,

    /// Enable the HTTP management server
    #[serde(default = "default_true")]
    pub enable_http_server: bool,

    /// Enable the MQTT status listener
    #[serde(default = "default_true")]
    pub enable_status_listener: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            server: ServerSettings::default(),
            mqtt_broker: MqttBrokerSettings::default(),
            artifact_store: ArtifactStoreSettings::default(),
            rollout: RolloutSettings::default(),
            enable_http_server: true,
            enable_status_listener: true,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub async fn load(path: &Path) -> Result<Self, OtaError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            OtaError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let settings = serde_json::from_slice(&bytes)
            .map_err(|e| OtaError::ConfigError(format!("invalid settings file: {}", e)))?;
        Ok(settings)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttBrokerSettings {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub tls: bool,

    #[serde(default)]
    pub ca_cert_path: Option<String>,
}

fn default_mqtt_port() -> u16 {
    8883
}

impl Default for MqttBrokerSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mqtt_port(),
            tls: true,
            ca_cert_path: None,
        }
    }
}

/// Firmware artifact store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactStoreSettings {
    /// Base URL of the artifact store used for existence checks
    #[serde(default = "default_artifact_store_url")]
    pub base_url: String,
}

fn default_artifact_store_url() -> String {
    "http://localhost:9000/firmware/".to_string()
}

impl Default for ArtifactStoreSettings {
    fn default() -> Self {
        Self {
            base_url: default_artifact_store_url(),
        }
    }
}

/// Rollout policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutSettings {
    /// Seconds between workflow status checks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Hard bound on total workflow duration, seconds
    #[serde(default = "default_overall_timeout_secs")]
    pub overall_timeout_secs: u64,

    /// Fraction of failed/cancelled devices that aborts a job
    #[serde(default = "default_abort_threshold")]
    pub abort_threshold_fraction: f64,

    /// Minimum targeted devices before the threshold applies
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: usize,
}

fn default_poll_interval_secs() -> u64 {
    120
}

fn default_overall_timeout_secs() -> u64 {
    30 * 60
}

fn default_abort_threshold() -> f64 {
    0.20
}

fn default_min_sample_size() -> usize {
    1
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            overall_timeout_secs: default_overall_timeout_secs(),
            abort_threshold_fraction: default_abort_threshold(),
            min_sample_size: default_min_sample_size(),
        }
    }
}
