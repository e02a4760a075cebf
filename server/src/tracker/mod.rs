//! Execution status tracker
//!
//! Accepts asynchronous per-device status events, answers job status queries,
//! and performs cancellation/rollback. The acceptance rule (terminal records
//! are sticky, newest event_time wins among non-terminal states) is the only
//! concurrency discipline status events need: deliveries may race, repeat,
//! and arrive out of order.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregate::{compute_aggregate, AggregateStatus, ThresholdPolicy};
use crate::errors::OtaError;
use crate::models::execution::{DeviceExecutionRecord, StatusEvent};
use crate::models::job::OtaJob;
use crate::store::{EventOutcome, JobStore};
use crate::transport::CommandChannel;

/// Full status answer for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub job: OtaJob,
    pub aggregate: AggregateStatus,
    pub device_details: Vec<DeviceExecutionRecord>,
}

/// Result of a cancellation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled_devices: usize,
}

/// Tracks per-device execution outcomes and serves job status queries
pub struct ExecutionTracker {
    store: Arc<JobStore>,
    channel: Arc<dyn CommandChannel>,
    policy: ThresholdPolicy,
}

impl ExecutionTracker {
    pub fn new(
        store: Arc<JobStore>,
        channel: Arc<dyn CommandChannel>,
        policy: ThresholdPolicy,
    ) -> Self {
        Self {
            store,
            channel,
            policy,
        }
    }

    /// Offer one device status event.
    ///
    /// Never errors toward the event source: events for unknown
    /// (job_id, device_id) pairs and stale or post-terminal deliveries are
    /// dropped with a log line. At-least-once transports redeliver; a
    /// rejected duplicate is normal operation, not a fault.
    pub fn handle_status_event(&self, event: &StatusEvent) {
        match self.store.apply_status_event(event) {
            EventOutcome::Applied => {
                info!(
                    "Job {} device {} -> {}",
                    event.job_id, event.device_id, event.status
                );
            }
            EventOutcome::Terminal => {
                debug!(
                    "Dropping event for terminal record ({}, {})",
                    event.job_id, event.device_id
                );
            }
            EventOutcome::Stale => {
                debug!(
                    "Dropping stale event for ({}, {}) at {}",
                    event.job_id, event.device_id, event.event_time
                );
            }
            EventOutcome::Unknown => {
                warn!(
                    "Dropping event for unknown record ({}, {})",
                    event.job_id, event.device_id
                );
            }
        }
    }

    /// All device records for a job plus the computed aggregate
    pub fn get_job_status(&self, job_id: &str) -> Result<JobStatusReport, OtaError> {
        let job = self
            .store
            .get_job(job_id)
            .ok_or_else(|| OtaError::NotFound(format!("OTA job {} not found", job_id)))?;

        let records = self.store.records(job_id).unwrap_or_default();
        let aggregate = compute_aggregate(job_id, &records, &self.policy);

        Ok(JobStatusReport {
            job,
            aggregate,
            device_details: records,
        })
    }

    /// Cancel a job: every non-terminal record becomes CANCELLED and each
    /// affected device is sent a cancel command best-effort — the send is not
    /// awaited for device acknowledgment and send errors are only logged.
    ///
    /// Idempotent: cancelling a job with no non-terminal records is a no-op.
    pub async fn cancel_job(&self, job_id: &str) -> Result<CancelResponse, OtaError> {
        let cancelled = self
            .store
            .cancel_remaining(job_id, Utc::now())
            .ok_or_else(|| OtaError::NotFound(format!("OTA job {} not found", job_id)))?;

        for device_id in &cancelled {
            if let Err(e) = self.channel.send_cancel(device_id, job_id).await {
                warn!(
                    "Best-effort cancel to device {} for job {} failed: {}",
                    device_id, job_id, e
                );
            }
        }

        info!(
            "Cancelled OTA job {}: {} devices transitioned",
            job_id,
            cancelled.len()
        );
        Ok(CancelResponse {
            job_id: job_id.to_string(),
            cancelled_devices: cancelled.len(),
        })
    }

    /// The abort policy used for aggregation
    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }
}
