//! Job orchestrator
//!
//! Creates rollout jobs, builds per-target execution records, and fans out
//! paced update commands through the device command channel.

pub mod pacing;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::OtaError;
use crate::models::execution::{DeviceExecutionRecord, DeviceStatus};
use crate::models::job::{generate_job_id, OtaJob, RolloutConfig};
use crate::orchestrator::pacing::DispatchPacer;
use crate::registry::FirmwareRegistry;
use crate::store::JobStore;
use crate::transport::{CommandChannel, UpdateCommand};

/// Job-id regeneration attempts before giving up; collisions are
/// practically impossible with the random suffix
const MAX_ID_ATTEMPTS: u32 = 5;

/// Result of a successful job creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub target_count: usize,
    pub status: String,
}

/// Creates rollout jobs and dispatches paced update commands
pub struct JobOrchestrator {
    registry: Arc<FirmwareRegistry>,
    store: Arc<JobStore>,
    channel: Arc<dyn CommandChannel>,
}

impl JobOrchestrator {
    pub fn new(
        registry: Arc<FirmwareRegistry>,
        store: Arc<JobStore>,
        channel: Arc<dyn CommandChannel>,
    ) -> Self {
        Self {
            registry,
            store,
            channel,
        }
    }

    /// Create a rollout job targeting `device_targets`.
    ///
    /// The job and its full QUEUED record set are persisted atomically before
    /// any dispatch, so the job is never queryable with a partial record set.
    /// Dispatch is paced to the job's `max_per_minute`; a per-device dispatch
    /// failure marks that device FAILED and never fails the creation itself.
    pub async fn create_job(
        &self,
        device_targets: &[String],
        firmware_version: &str,
        device_type: &str,
        rollout_config: RolloutConfig,
    ) -> Result<CreateJobResponse, OtaError> {
        let targets = dedup_targets(device_targets);
        if targets.is_empty() {
            return Err(OtaError::InvalidArgument(
                "device_targets must not be empty".to_string(),
            ));
        }

        let firmware = self.registry.get(device_type, firmware_version)?;
        if !firmware.is_available() {
            return Err(OtaError::NotFound(format!(
                "firmware version {} for device type {} is not available",
                firmware_version, device_type
            )));
        }

        // Persist job + records atomically; regenerate the ID on collision
        let mut attempts = 0;
        let job = loop {
            let job = OtaJob {
                job_id: generate_job_id(device_type, firmware_version),
                firmware_version: firmware_version.to_string(),
                device_type: device_type.to_string(),
                rollout_config: rollout_config.clone(),
                created_at: Utc::now(),
            };
            let records: Vec<DeviceExecutionRecord> = targets
                .iter()
                .map(|d| DeviceExecutionRecord::queued(&job.job_id, d, job.created_at))
                .collect();

            match self.store.insert_job(job.clone(), records) {
                Ok(()) => break job,
                Err(OtaError::Conflict(_)) => {
                    attempts += 1;
                    if attempts >= MAX_ID_ATTEMPTS {
                        return Err(OtaError::Internal(
                            "exhausted job id generation attempts".to_string(),
                        ));
                    }
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            "Created OTA job {} targeting {} devices",
            job.job_id,
            targets.len()
        );

        // Fan out update commands, paced by the local token bucket
        let command = UpdateCommand::for_job(&job, &firmware);
        let mut pacer = DispatchPacer::new(job.rollout_config.max_per_minute);

        for device_id in &targets {
            pacer.acquire().await;
            if let Err(e) = self.channel.send_update(device_id, &command).await {
                warn!(
                    "Dispatch to device {} failed for job {}: {}",
                    device_id, job.job_id, e
                );
                self.store.force_status(
                    &job.job_id,
                    device_id,
                    DeviceStatus::Failed,
                    serde_json::json!({ "error": format!("dispatch failed: {}", e) }),
                    Utc::now(),
                );
            }
        }

        Ok(CreateJobResponse {
            job_id: job.job_id,
            target_count: targets.len(),
            status: "CREATED".to_string(),
        })
    }
}

/// Collapse duplicate targets while preserving order
fn dedup_targets(targets: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    targets
        .iter()
        .filter(|t| !t.is_empty() && seen.insert(t.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::artifacts::MemoryArtifactStore;
    use crate::registry::RegisterRequest;
    use crate::transport::testing::{RecordingChannel, SentCommand};

    async fn fixture() -> (Arc<FirmwareRegistry>, Arc<JobStore>, Arc<RecordingChannel>) {
        let artifacts = Arc::new(MemoryArtifactStore::with_artifacts(&["sensor/fw-1.0.1.bin"]));
        let registry = Arc::new(FirmwareRegistry::new(artifacts));
        registry
            .register(RegisterRequest {
                device_type: "sensor".to_string(),
                version: "1.0.1".to_string(),
                artifact_location: "sensor/fw-1.0.1.bin".to_string(),
                checksum: None,
                metadata: serde_json::Value::Null,
            })
            .await
            .unwrap();

        (registry, Arc::new(JobStore::new()), Arc::new(RecordingChannel::new()))
    }

    fn targets(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_job_builds_queued_records() {
        let (registry, store, channel) = fixture().await;
        let orchestrator = JobOrchestrator::new(registry, store.clone(), channel.clone());

        let response = orchestrator
            .create_job(
                &targets(&["d1", "d2", "d3"]),
                "1.0.1",
                "sensor",
                RolloutConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(response.target_count, 3);
        assert_eq!(response.status, "CREATED");

        let records = store.records(&response.job_id).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.status == DeviceStatus::Queued));

        let updates = channel
            .sent_commands()
            .into_iter()
            .filter(|c| matches!(c, SentCommand::Update { .. }))
            .count();
        assert_eq!(updates, 3);
    }

    #[tokio::test]
    async fn test_empty_targets_rejected() {
        let (registry, store, channel) = fixture().await;
        let orchestrator = JobOrchestrator::new(registry, store.clone(), channel);

        let err = orchestrator
            .create_job(&[], "1.0.1", "sensor", RolloutConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OtaError::InvalidArgument(_)));
        assert!(store.job_ids().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_firmware_rejected() {
        let (registry, store, channel) = fixture().await;
        let orchestrator = JobOrchestrator::new(registry, store.clone(), channel);

        let err = orchestrator
            .create_job(
                &targets(&["d1"]),
                "9.9.9",
                "sensor",
                RolloutConfig::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OtaError::NotFound(_)));
        assert!(store.job_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_absorbed_per_device() {
        let (registry, store, channel) = fixture().await;
        channel.fail_for("d2");
        let orchestrator = JobOrchestrator::new(registry, store.clone(), channel);

        let response = orchestrator
            .create_job(
                &targets(&["d1", "d2", "d3"]),
                "1.0.1",
                "sensor",
                RolloutConfig::default(),
            )
            .await
            .unwrap();

        let records = store.records(&response.job_id).unwrap();
        let failed: Vec<_> = records
            .iter()
            .filter(|r| r.status == DeviceStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].device_id, "d2");
        // Creation itself succeeded and the record set is complete
        assert_eq!(records.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_paced_to_max_per_minute() {
        let (registry, store, channel) = fixture().await;
        let orchestrator = JobOrchestrator::new(registry, store, channel);

        let config = RolloutConfig {
            max_per_minute: 60,
            ..Default::default()
        };

        let start = tokio::time::Instant::now();
        orchestrator
            .create_job(&targets(&["d1", "d2", "d3"]), "1.0.1", "sensor", config)
            .await
            .unwrap();

        // 3 dispatches at 1/second: first immediate, two more spaced out
        let elapsed = tokio::time::Instant::now() - start;
        assert!(elapsed >= std::time::Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_targets_collapse() {
        let (registry, store, channel) = fixture().await;
        let orchestrator = JobOrchestrator::new(registry, store.clone(), channel);

        let response = orchestrator
            .create_job(
                &targets(&["d1", "d1", "d2"]),
                "1.0.1",
                "sensor",
                RolloutConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(response.target_count, 2);
        assert_eq!(store.records(&response.job_id).unwrap().len(), 2);
    }
}
