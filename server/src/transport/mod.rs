//! Device command transport
//!
//! Fire-and-forget push of update/cancel commands to named devices, plus the
//! decoupled inbound status stream. The orchestrator never waits for a device
//! to acknowledge a command; outcomes arrive later as status events.

pub mod mqtt;
pub mod topics;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::OtaError;
use crate::models::firmware::FirmwareVersion;
use crate::models::job::OtaJob;

/// The update command document pushed to a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCommand {
    pub operation: String,
    pub job_id: String,
    pub firmware: FirmwarePayload,
    pub execution: ExecutionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwarePayload {
    pub version: String,
    pub artifact_location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub device_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPayload {
    pub timeout_minutes: u32,
    pub retry_attempts: u32,
}

impl UpdateCommand {
    /// Build the command document for one job and its firmware version
    pub fn for_job(job: &OtaJob, firmware: &FirmwareVersion) -> Self {
        Self {
            operation: "firmware_update".to_string(),
            job_id: job.job_id.clone(),
            firmware: FirmwarePayload {
                version: firmware.version.clone(),
                artifact_location: firmware.artifact_location.clone(),
                checksum: firmware.checksum.clone(),
                device_type: firmware.device_type.clone(),
            },
            execution: ExecutionPayload {
                timeout_minutes: job.rollout_config.timeout_minutes,
                retry_attempts: job.rollout_config.retry_attempts,
            },
        }
    }
}

/// Fire-and-forget command push to a named device
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Push an update command; resolves when the command is handed to the
    /// transport, not when the device acts on it
    async fn send_update(&self, device_id: &str, command: &UpdateCommand) -> Result<(), OtaError>;

    /// Push a cancel command for one job
    async fn send_cancel(&self, device_id: &str, job_id: &str) -> Result<(), OtaError>;
}

/// Channel that drops every command.
///
/// Stands in when no broker is configured (local development); dispatches
/// succeed from the orchestrator's perspective and go nowhere.
pub struct NullCommandChannel;

#[async_trait]
impl CommandChannel for NullCommandChannel {
    async fn send_update(&self, device_id: &str, command: &UpdateCommand) -> Result<(), OtaError> {
        tracing::debug!(
            "No transport configured; dropping update command for device {} (job {})",
            device_id,
            command.job_id
        );
        Ok(())
    }

    async fn send_cancel(&self, device_id: &str, job_id: &str) -> Result<(), OtaError> {
        tracing::debug!(
            "No transport configured; dropping cancel command for device {} (job {})",
            device_id,
            job_id
        );
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    //! Command channel test double

    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    /// Command sent through the recording channel
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SentCommand {
        Update { device_id: String, job_id: String },
        Cancel { device_id: String, job_id: String },
    }

    /// Records every command; optionally fails sends for selected devices
    pub struct RecordingChannel {
        pub sent: Mutex<Vec<SentCommand>>,
        failing_devices: Mutex<HashSet<String>>,
    }

    impl RecordingChannel {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing_devices: Mutex::new(HashSet::new()),
            }
        }

        pub fn fail_for(&self, device_id: &str) {
            self.failing_devices
                .lock()
                .unwrap()
                .insert(device_id.to_string());
        }

        pub fn sent_commands(&self) -> Vec<SentCommand> {
            self.sent.lock().unwrap().clone()
        }

        fn check_failure(&self, device_id: &str) -> Result<(), OtaError> {
            if self.failing_devices.lock().unwrap().contains(device_id) {
                return Err(OtaError::Transient(format!(
                    "simulated dispatch failure for {}",
                    device_id
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CommandChannel for RecordingChannel {
        async fn send_update(
            &self,
            device_id: &str,
            command: &UpdateCommand,
        ) -> Result<(), OtaError> {
            self.check_failure(device_id)?;
            self.sent.lock().unwrap().push(SentCommand::Update {
                device_id: device_id.to_string(),
                job_id: command.job_id.clone(),
            });
            Ok(())
        }

        async fn send_cancel(&self, device_id: &str, job_id: &str) -> Result<(), OtaError> {
            self.check_failure(device_id)?;
            self.sent.lock().unwrap().push(SentCommand::Cancel {
                device_id: device_id.to_string(),
                job_id: job_id.to_string(),
            });
            Ok(())
        }
    }
}
