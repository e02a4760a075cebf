//! Aggregation & decision engine
//!
//! Pure computation of a job's overall status from its device-level records.
//! The aggregate is derived state: it can be recomputed at any time from the
//! current record snapshot and remembers nothing between evaluations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::execution::{DeviceExecutionRecord, DeviceStatus};

/// Overall status of a rollout job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Queued,
    InProgress,
    Success,
    Failed,
}

impl OverallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OverallStatus::Success | OverallStatus::Failed)
    }
}

/// Abort policy for a rollout
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    /// Fraction of failed/cancelled devices that aborts the job (inclusive)
    pub abort_threshold_fraction: f64,

    /// Minimum number of targeted devices before the threshold applies
    pub min_sample_size: usize,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            abort_threshold_fraction: 0.20,
            min_sample_size: 1,
        }
    }
}

/// Derived summary of a job's device records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStatus {
    pub job_id: String,
    pub overall_status: OverallStatus,
    pub total_devices: usize,
    pub counts_by_status: HashMap<DeviceStatus, usize>,
}

/// Compute the overall job status from a record snapshot.
///
/// Check order matters: the all-succeeded check comes before the failure
/// threshold so a job that finishes 100% successful is never retroactively
/// marked FAILED. All originally targeted devices count in the threshold
/// denominator at every evaluation, including devices still QUEUED.
///
/// An empty snapshot yields QUEUED; target-less jobs are rejected at
/// creation, so this only arises for misconfigured data.
pub fn compute_aggregate(
    job_id: &str,
    records: &[DeviceExecutionRecord],
    policy: &ThresholdPolicy,
) -> AggregateStatus {
    let total = records.len();

    let mut counts: HashMap<DeviceStatus, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.status).or_insert(0) += 1;
    }

    let count = |status: DeviceStatus| counts.get(&status).copied().unwrap_or(0);

    let overall_status = if total > 0 && count(DeviceStatus::Succeeded) == total {
        OverallStatus::Success
    } else if total >= policy.min_sample_size
        && count(DeviceStatus::Failed) + count(DeviceStatus::Cancelled)
            >= abort_count(total, policy.abort_threshold_fraction)
    {
        OverallStatus::Failed
    } else if count(DeviceStatus::InProgress) > 0 {
        OverallStatus::InProgress
    } else {
        OverallStatus::Queued
    };

    AggregateStatus {
        job_id: job_id.to_string(),
        overall_status,
        total_devices: total,
        counts_by_status: counts,
    }
}

/// Number of failed/cancelled devices that trips the abort threshold:
/// ceil(total * fraction), compared inclusively
fn abort_count(total: usize, fraction: f64) -> usize {
    (total as f64 * fraction).ceil() as usize
}
