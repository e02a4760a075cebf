//! Application configuration options

use std::time::Duration;

use crate::aggregate::ThresholdPolicy;
use crate::config::Settings;
use crate::transport::mqtt::MqttAddress;
use crate::workers::status_listener;
use crate::workflow::WorkflowOptions;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// HTTP server configuration
    pub server: ServerOptions,

    /// Enable the HTTP management server
    pub enable_http_server: bool,

    /// Enable the MQTT status listener
    pub enable_status_listener: bool,

    /// MQTT broker address for the device command channel
    pub mqtt_broker: MqttAddress,

    /// Base URL of the firmware artifact store
    pub artifact_store_base_url: String,

    /// Abort policy applied to every job
    pub policy: ThresholdPolicy,

    /// Workflow timing
    pub workflow: WorkflowOptions,

    /// Status listener options
    pub status_listener: status_listener::Options,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            server: ServerOptions::default(),
            enable_http_server: true,
            enable_status_listener: true,
            mqtt_broker: MqttAddress::default(),
            artifact_store_base_url: "http://localhost:9000/firmware/".to_string(),
            policy: ThresholdPolicy::default(),
            workflow: WorkflowOptions::default(),
            status_listener: status_listener::Options::default(),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

impl AppOptions {
    /// Build options from the settings file
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            enable_http_server: settings.enable_http_server,
            enable_status_listener: settings.enable_status_listener,
            mqtt_broker: MqttAddress {
                host: settings.mqtt_broker.host.clone(),
                port: settings.mqtt_broker.port,
                use_tls: settings.mqtt_broker.tls,
                ca_cert_path: settings.mqtt_broker.ca_cert_path.clone(),
            },
            artifact_store_base_url: settings.artifact_store.base_url.clone(),
            policy: ThresholdPolicy {
                abort_threshold_fraction: settings.rollout.abort_threshold_fraction,
                min_sample_size: settings.rollout.min_sample_size,
            },
            workflow: WorkflowOptions {
                poll_interval: Duration::from_secs(settings.rollout.poll_interval_secs),
                overall_timeout: Duration::from_secs(settings.rollout.overall_timeout_secs),
            },
            status_listener: status_listener::Options::default(),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}
