//! MQTT transport implementation

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tracing::{debug, info, warn};

use crate::errors::OtaError;
use crate::models::execution::StatusEvent;
use crate::transport::topics::Topics;
use crate::transport::{CommandChannel, UpdateCommand};

/// MQTT broker address
#[derive(Debug, Clone)]
pub struct MqttAddress {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// Optional path to a PEM-encoded CA certificate for broker verification.
    /// When `None` and `use_tls` is `true`, the system certificate store is used.
    pub ca_cert_path: Option<String>,
}

impl Default for MqttAddress {
    fn default() -> Self {
        Self {
            host: "".to_string(),
            port: 8883,
            use_tls: true,
            ca_cert_path: None,
        }
    }
}

/// MQTT transport: outbound command publishing and the inbound status stream
pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttTransport {
    /// Connect to the broker
    pub fn new(address: &MqttAddress, client_id: &str) -> Result<Self, OtaError> {
        if address.host.is_empty() {
            return Err(OtaError::MqttError(
                "MQTT host is not configured".to_string(),
            ));
        }

        let mut options = MqttOptions::new(client_id, &address.host, address.port);
        options.set_keep_alive(std::time::Duration::from_secs(30));

        if address.use_tls {
            use rumqttc::{TlsConfiguration, Transport};
            use rustls::ClientConfig;
            use std::sync::Arc;

            let mut root_cert_store = rustls::RootCertStore::empty();

            if let Some(ref ca_path) = address.ca_cert_path {
                let ca_pem = std::fs::read(ca_path).map_err(|e| {
                    OtaError::MqttError(format!("Failed to read CA cert {ca_path}: {e}"))
                })?;
                let mut cursor = std::io::Cursor::new(ca_pem);
                for cert in rustls_pemfile::certs(&mut cursor).flatten() {
                    let _ = root_cert_store.add(cert);
                }
            } else {
                for cert in rustls_native_certs::load_native_certs().unwrap_or_default() {
                    let _ = root_cert_store.add(cert);
                }
            }

            let client_config = ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_no_client_auth();

            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                Arc::new(client_config),
            )));
        }

        let (client, eventloop) = AsyncClient::new(options, 64);

        Ok(Self { client, eventloop })
    }

    /// Cloneable handle used by the orchestrator and tracker for publishing
    pub fn command_channel(&self) -> MqttCommandChannel {
        MqttCommandChannel {
            client: self.client.clone(),
        }
    }

    /// Subscribe to every device's job status topic
    pub async fn subscribe_status(&mut self) -> Result<(), OtaError> {
        let topic = Topics::status_subscription();
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| OtaError::MqttError(e.to_string()))?;
        info!("Subscribed to: {}", topic);
        Ok(())
    }

    /// Poll for the next inbound status event.
    ///
    /// Returns `Ok(None)` for transport events that carry no status payload
    /// (acks, pings) and for payloads that fail to parse, which are logged
    /// and dropped so a malformed device cannot wedge the listener.
    pub async fn poll(&mut self) -> Result<Option<StatusEvent>, OtaError> {
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some((device_id, job_id)) = Topics::parse_status_topic(&publish.topic) else {
                    debug!("Ignoring message on topic: {}", publish.topic);
                    return Ok(None);
                };

                match serde_json::from_slice::<StatusEvent>(&publish.payload) {
                    Ok(event) => {
                        if event.device_id != device_id || event.job_id != job_id {
                            warn!(
                                "Status payload identity mismatch on {} ({}, {})",
                                publish.topic, event.device_id, event.job_id
                            );
                            return Ok(None);
                        }
                        Ok(Some(event))
                    }
                    Err(e) => {
                        warn!("Dropping malformed status payload on {}: {}", publish.topic, e);
                        Ok(None)
                    }
                }
            }
            Ok(_) => Ok(None),
            Err(e) => Err(OtaError::MqttError(e.to_string())),
        }
    }
}

/// Publishing half of the MQTT transport
#[derive(Clone)]
pub struct MqttCommandChannel {
    client: AsyncClient,
}

#[async_trait::async_trait]
impl CommandChannel for MqttCommandChannel {
    async fn send_update(&self, device_id: &str, command: &UpdateCommand) -> Result<(), OtaError> {
        let topic = Topics::device_update(device_id);
        let payload = serde_json::to_vec(command)?;

        self.client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| OtaError::MqttError(e.to_string()))?;

        debug!("Published update command to: {}", topic);
        Ok(())
    }

    async fn send_cancel(&self, device_id: &str, job_id: &str) -> Result<(), OtaError> {
        let topic = Topics::device_cancel(device_id);
        let payload = serde_json::to_vec(&serde_json::json!({
            "operation": "cancel",
            "job_id": job_id,
        }))?;

        self.client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| OtaError::MqttError(e.to_string()))?;

        debug!("Published cancel command to: {}", topic);
        Ok(())
    }
}
