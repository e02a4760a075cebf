//! In-memory job and execution record store
//!
//! Records are partitioned by `(job_id, device_id)`; all mutation for one job
//! happens under that job's map entry, so no cross-job locking exists. A job
//! and its full record set are inserted under one write lock, which is what
//! makes a job never queryable with a partial record set.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::OtaError;
use crate::models::execution::{DeviceExecutionRecord, DeviceStatus, StatusEvent};
use crate::models::job::OtaJob;

/// Outcome of offering a status event to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Event accepted; record updated
    Applied,

    /// Record is already terminal; event ignored
    Terminal,

    /// Event is not newer than the last accepted one; ignored
    Stale,

    /// No such (job_id, device_id) record
    Unknown,
}

struct JobEntry {
    job: OtaJob,
    records: HashMap<String, DeviceExecutionRecord>,
}

/// In-memory store for jobs and their device execution records
pub struct JobStore {
    entries: RwLock<HashMap<String, JobEntry>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a job together with its complete record set.
    ///
    /// Fails Conflict if the job_id is already taken; nothing is written in
    /// that case, so the caller can regenerate the ID and retry.
    pub fn insert_job(
        &self,
        job: OtaJob,
        records: Vec<DeviceExecutionRecord>,
    ) -> Result<(), OtaError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if entries.contains_key(&job.job_id) {
            return Err(OtaError::Conflict(format!(
                "job {} already exists",
                job.job_id
            )));
        }

        let record_map = records
            .into_iter()
            .map(|r| (r.device_id.clone(), r))
            .collect();

        entries.insert(
            job.job_id.clone(),
            JobEntry {
                job,
                records: record_map,
            },
        );
        Ok(())
    }

    /// Look up a job by ID
    pub fn get_job(&self, job_id: &str) -> Option<OtaJob> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(job_id).map(|e| e.job.clone())
    }

    /// Snapshot all records for a job, or None for an unknown job
    pub fn records(&self, job_id: &str) -> Option<Vec<DeviceExecutionRecord>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(job_id)
            .map(|e| e.records.values().cloned().collect())
    }

    /// All job IDs currently known
    pub fn job_ids(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.keys().cloned().collect()
    }

    /// Atomic conditional update for one record from a device status event.
    ///
    /// Terminal records are sticky; among non-terminal records the event with
    /// the strictly newer `event_time` wins, regardless of arrival order.
    /// The comparison and the write happen under one lock, so concurrent
    /// deliveries for the same key serialize without any external lock.
    pub fn apply_status_event(&self, event: &StatusEvent) -> EventOutcome {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        let Some(entry) = entries.get_mut(&event.job_id) else {
            return EventOutcome::Unknown;
        };
        let Some(record) = entry.records.get_mut(&event.device_id) else {
            return EventOutcome::Unknown;
        };

        if record.status.is_terminal() {
            return EventOutcome::Terminal;
        }
        if event.event_time <= record.last_updated {
            return EventOutcome::Stale;
        }

        record.status = event.status;
        record.last_updated = event.event_time;
        record.status_details = event.status_details.clone();
        debug!(
            "Record ({}, {}) -> {}",
            event.job_id, event.device_id, event.status
        );
        EventOutcome::Applied
    }

    /// Force one record to a status, bypassing the event-time rule but not
    /// terminal stickiness. Used for dispatch failures. Returns whether the
    /// record changed.
    pub fn force_status(
        &self,
        job_id: &str,
        device_id: &str,
        status: DeviceStatus,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        let Some(record) = entries
            .get_mut(job_id)
            .and_then(|e| e.records.get_mut(device_id))
        else {
            return false;
        };

        if record.status.is_terminal() {
            return false;
        }

        record.status = status;
        record.last_updated = at;
        record.status_details = details;
        true
    }

    /// Transition every non-terminal record of a job to CANCELLED, returning
    /// the affected device IDs. Unknown job yields None.
    pub fn cancel_remaining(&self, job_id: &str, at: DateTime<Utc>) -> Option<Vec<String>> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get_mut(job_id)?;

        let mut cancelled = Vec::new();
        for record in entry.records.values_mut() {
            if record.status.is_terminal() {
                continue;
            }
            record.status = DeviceStatus::Cancelled;
            record.last_updated = at;
            cancelled.push(record.device_id.clone());
        }
        Some(cancelled)
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{generate_job_id, RolloutConfig};
    use chrono::Duration;

    fn sample_job(job_id: &str) -> OtaJob {
        OtaJob {
            job_id: job_id.to_string(),
            firmware_version: "1.0.1".to_string(),
            device_type: "sensor".to_string(),
            rollout_config: RolloutConfig::default(),
            created_at: Utc::now(),
        }
    }

    fn seeded_store(job_id: &str, devices: &[&str]) -> JobStore {
        let store = JobStore::new();
        let now = Utc::now();
        let records = devices
            .iter()
            .map(|d| DeviceExecutionRecord::queued(job_id, d, now))
            .collect();
        store.insert_job(sample_job(job_id), records).unwrap();
        store
    }

    fn event(
        job_id: &str,
        device_id: &str,
        status: DeviceStatus,
        event_time: DateTime<Utc>,
    ) -> StatusEvent {
        StatusEvent {
            device_id: device_id.to_string(),
            job_id: job_id.to_string(),
            status,
            status_details: serde_json::Value::Null,
            event_time,
        }
    }

    #[test]
    fn test_duplicate_job_id_conflicts() {
        let store = seeded_store("job-1", &["d1"]);
        let err = store.insert_job(sample_job("job-1"), vec![]).unwrap_err();
        assert!(matches!(err, OtaError::Conflict(_)));
        // Original record set untouched
        assert_eq!(store.records("job-1").unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_key_dropped() {
        let store = seeded_store("job-1", &["d1"]);
        let t = Utc::now() + Duration::seconds(1);
        assert_eq!(
            store.apply_status_event(&event("job-2", "d1", DeviceStatus::Succeeded, t)),
            EventOutcome::Unknown
        );
        assert_eq!(
            store.apply_status_event(&event("job-1", "ghost", DeviceStatus::Succeeded, t)),
            EventOutcome::Unknown
        );
    }

    #[test]
    fn test_last_writer_wins_by_event_time() {
        let store = seeded_store("job-1", &["d1"]);
        let base = Utc::now();
        let later = base + Duration::seconds(10);
        let earlier = base + Duration::seconds(5);

        assert_eq!(
            store.apply_status_event(&event("job-1", "d1", DeviceStatus::InProgress, later)),
            EventOutcome::Applied
        );
        // An older event arriving afterwards is stale
        assert_eq!(
            store.apply_status_event(&event("job-1", "d1", DeviceStatus::Queued, earlier)),
            EventOutcome::Stale
        );

        let record = &store.records("job-1").unwrap()[0];
        assert_eq!(record.status, DeviceStatus::InProgress);
        assert_eq!(record.last_updated, later);
    }

    #[test]
    fn test_duplicate_delivery_is_stale() {
        let store = seeded_store("job-1", &["d1"]);
        let t = Utc::now() + Duration::seconds(1);
        let e = event("job-1", "d1", DeviceStatus::InProgress, t);
        assert_eq!(store.apply_status_event(&e), EventOutcome::Applied);
        assert_eq!(store.apply_status_event(&e), EventOutcome::Stale);
    }

    #[test]
    fn test_terminal_record_is_sticky() {
        let store = seeded_store("job-1", &["d1"]);
        let t1 = Utc::now() + Duration::seconds(1);
        let t2 = t1 + Duration::seconds(1);

        store.apply_status_event(&event("job-1", "d1", DeviceStatus::Succeeded, t1));
        assert_eq!(
            store.apply_status_event(&event("job-1", "d1", DeviceStatus::Failed, t2)),
            EventOutcome::Terminal
        );
        assert_eq!(
            store.records("job-1").unwrap()[0].status,
            DeviceStatus::Succeeded
        );
    }

    #[test]
    fn test_force_status_respects_terminal() {
        let store = seeded_store("job-1", &["d1"]);
        let t = Utc::now() + Duration::seconds(1);
        store.apply_status_event(&event("job-1", "d1", DeviceStatus::Succeeded, t));

        let changed = store.force_status(
            "job-1",
            "d1",
            DeviceStatus::Failed,
            serde_json::Value::Null,
            Utc::now(),
        );
        assert!(!changed);
    }

    #[test]
    fn test_cancel_remaining_skips_terminal() {
        let store = seeded_store("job-1", &["d1", "d2", "d3"]);
        let t = Utc::now() + Duration::seconds(1);
        store.apply_status_event(&event("job-1", "d2", DeviceStatus::Succeeded, t));

        let mut cancelled = store.cancel_remaining("job-1", Utc::now()).unwrap();
        cancelled.sort();
        assert_eq!(cancelled, vec!["d1".to_string(), "d3".to_string()]);

        let records = store.records("job-1").unwrap();
        let succeeded = records.iter().find(|r| r.device_id == "d2").unwrap();
        assert_eq!(succeeded.status, DeviceStatus::Succeeded);
    }

    #[test]
    fn test_record_count_is_stable() {
        let store = seeded_store("job-1", &["d1", "d2", "d3", "d4"]);
        let t = Utc::now() + Duration::seconds(1);
        store.apply_status_event(&event("job-1", "d1", DeviceStatus::Succeeded, t));
        store.apply_status_event(&event("job-1", "d2", DeviceStatus::Failed, t));
        store.cancel_remaining("job-1", Utc::now());
        assert_eq!(store.records("job-1").unwrap().len(), 4);
    }

    #[test]
    fn test_permuted_delivery_converges() {
        // The same three events in any order leave the record in the same
        // final state: the newest non-terminal event wins.
        let base = Utc::now();
        let events = vec![
            event("job-1", "d1", DeviceStatus::Queued, base + Duration::seconds(1)),
            event("job-1", "d1", DeviceStatus::InProgress, base + Duration::seconds(2)),
            event("job-1", "d1", DeviceStatus::Succeeded, base + Duration::seconds(3)),
        ];

        let permutations: Vec<Vec<usize>> = vec![
            vec![0, 1, 2],
            vec![0, 2, 1],
            vec![1, 0, 2],
            vec![1, 2, 0],
            vec![2, 0, 1],
            vec![2, 1, 0],
        ];

        for order in permutations {
            let store = seeded_store("job-1", &["d1"]);
            for i in &order {
                store.apply_status_event(&events[*i]);
            }
            let record = &store.records("job-1").unwrap()[0];
            assert_eq!(
                record.status,
                DeviceStatus::Succeeded,
                "order {:?} diverged",
                order
            );
            assert_eq!(record.last_updated, base + Duration::seconds(3));
        }
    }

    #[test]
    fn test_generated_ids_usable_as_keys() {
        let store = JobStore::new();
        let id = generate_job_id("sensor", "1.0.1");
        store
            .insert_job(
                sample_job(&id),
                vec![DeviceExecutionRecord::queued(&id, "d1", Utc::now())],
            )
            .unwrap();
        assert!(store.get_job(&id).is_some());
    }
}
