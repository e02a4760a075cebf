//! Workflow controller
//!
//! Drives one rollout job from creation to a terminal outcome through an
//! explicit poll/wait/check state machine: an enumerated state type, a pure
//! transition function, and a driver loop whose only suspension point is the
//! WAITING sleep. A hard overall timeout bounds every run, so the workflow
//! always terminates.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregate::OverallStatus;
use crate::errors::OtaError;
use crate::models::job::RolloutConfig;
use crate::orchestrator::{CreateJobResponse, JobOrchestrator};
use crate::tracker::{CancelResponse, ExecutionTracker, JobStatusReport};

/// Workflow execution states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    /// Job not yet created
    Created,

    /// Suspended for the poll interval
    Waiting,

    /// Evaluating the aggregate
    Checking,

    /// Terminal: rollout succeeded
    Success,

    /// Cancelling remaining devices before the terminal failure
    RollingBack,

    /// Terminal: rollout failed
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Success | WorkflowState::Failed)
    }
}

/// Transition out of CHECKING, decided purely by the aggregate
pub fn next_state(aggregate: OverallStatus) -> WorkflowState {
    match aggregate {
        OverallStatus::Success => WorkflowState::Success,
        OverallStatus::Failed => WorkflowState::RollingBack,
        OverallStatus::InProgress | OverallStatus::Queued => WorkflowState::Waiting,
    }
}

/// A request the controller issues against the job components.
///
/// Exhaustively matched in [`WorkflowController::execute`]; there is no
/// string-keyed action routing.
#[derive(Debug, Clone)]
pub enum WorkflowRequest {
    CreateJob {
        device_targets: Vec<String>,
        firmware_version: String,
        device_type: String,
        rollout_config: RolloutConfig,
    },
    CheckStatus {
        job_id: String,
    },
    Rollback {
        job_id: String,
    },
}

/// Response to a [`WorkflowRequest`]
#[derive(Debug, Clone)]
pub enum WorkflowResponse {
    Created(CreateJobResponse),
    Status(JobStatusReport),
    RolledBack(CancelResponse),
}

/// Terminal outcome of a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub job_id: String,
    pub state: WorkflowState,
    /// Human-readable reason for a FAILED outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Workflow timing options
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    /// Interval between status checks
    pub poll_interval: Duration,

    /// Hard bound on total workflow duration; expiry forces rollback
    pub overall_timeout: Duration,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(120),
            overall_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Per-job exclusive execution tokens.
///
/// Exactly one controller runs per job_id at a time; a second concurrent
/// acquisition is rejected with Conflict.
pub struct JobLocks {
    active: Mutex<HashSet<String>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn acquire(locks: &Arc<Self>, job_id: &str) -> Result<JobLockGuard, OtaError> {
        let mut active = locks.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(job_id.to_string()) {
            return Err(OtaError::Conflict(format!(
                "a controller is already running for job {}",
                job_id
            )));
        }
        Ok(JobLockGuard {
            locks: Arc::clone(locks),
            job_id: job_id.to_string(),
        })
    }
}

impl Default for JobLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the job's execution token on drop
pub struct JobLockGuard {
    locks: Arc<JobLocks>,
    job_id: String,
}

impl Drop for JobLockGuard {
    fn drop(&mut self) {
        let mut active = self.locks.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.job_id);
    }
}

/// Drives rollout jobs to a terminal outcome
pub struct WorkflowController {
    orchestrator: Arc<JobOrchestrator>,
    tracker: Arc<ExecutionTracker>,
    locks: Arc<JobLocks>,
    options: WorkflowOptions,
}

impl WorkflowController {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        tracker: Arc<ExecutionTracker>,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            orchestrator,
            tracker,
            locks: Arc::new(JobLocks::new()),
            options,
        }
    }

    /// Execute one workflow request against the job components
    pub async fn execute(&self, request: WorkflowRequest) -> Result<WorkflowResponse, OtaError> {
        match request {
            WorkflowRequest::CreateJob {
                device_targets,
                firmware_version,
                device_type,
                rollout_config,
            } => {
                let response = self
                    .orchestrator
                    .create_job(
                        &device_targets,
                        &firmware_version,
                        &device_type,
                        rollout_config,
                    )
                    .await?;
                Ok(WorkflowResponse::Created(response))
            }
            WorkflowRequest::CheckStatus { job_id } => {
                Ok(WorkflowResponse::Status(self.tracker.get_job_status(&job_id)?))
            }
            WorkflowRequest::Rollback { job_id } => {
                Ok(WorkflowResponse::RolledBack(self.tracker.cancel_job(&job_id).await?))
            }
        }
    }

    /// Run a full rollout: create the job, then poll it to a terminal
    /// outcome.
    ///
    /// Creation failure surfaces synchronously; nothing exists to roll back
    /// at that point. `sleep_fn` performs the WAITING suspension, injected so
    /// tests can drive time.
    pub async fn run<S, F>(
        &self,
        request: WorkflowRequest,
        sleep_fn: S,
    ) -> Result<WorkflowOutcome, OtaError>
    where
        S: Fn(Duration) -> F,
        F: Future<Output = ()>,
    {
        let job_id = match self.execute(request).await? {
            WorkflowResponse::Created(created) => created.job_id,
            _ => {
                return Err(OtaError::InvalidArgument(
                    "run requires a CreateJob request".to_string(),
                ))
            }
        };

        let guard = JobLocks::acquire(&self.locks, &job_id)?;
        let outcome = self.drive(&job_id, sleep_fn).await;
        drop(guard);
        outcome
    }

    /// Resume polling an existing job, e.g. after a controller restart.
    ///
    /// Safe to call at any point after creation: aggregation is pure and
    /// dispatch happened once at creation, so resumption duplicates no side
    /// effect. A controller already running for the job is rejected with
    /// Conflict.
    pub async fn resume<S, F>(
        &self,
        job_id: &str,
        sleep_fn: S,
    ) -> Result<WorkflowOutcome, OtaError>
    where
        S: Fn(Duration) -> F,
        F: Future<Output = ()>,
    {
        // Unknown job surfaces NotFound before the poll loop starts
        self.tracker.get_job_status(job_id)?;

        let guard = JobLocks::acquire(&self.locks, job_id)?;
        let outcome = self.drive(job_id, sleep_fn).await;
        drop(guard);
        outcome
    }

    /// The WAITING/CHECKING loop
    async fn drive<S, F>(&self, job_id: &str, sleep_fn: S) -> Result<WorkflowOutcome, OtaError>
    where
        S: Fn(Duration) -> F,
        F: Future<Output = ()>,
    {
        let deadline = tokio::time::Instant::now() + self.options.overall_timeout;
        let mut state = WorkflowState::Waiting;

        loop {
            match state {
                WorkflowState::Waiting => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        return self.fail_on_timeout(job_id).await;
                    }
                    let wait = self.options.poll_interval.min(deadline - now);
                    sleep_fn(wait).await;
                    state = WorkflowState::Checking;
                }
                WorkflowState::Checking => {
                    if tokio::time::Instant::now() >= deadline {
                        return self.fail_on_timeout(job_id).await;
                    }
                    let report = match self.execute(WorkflowRequest::CheckStatus {
                        job_id: job_id.to_string(),
                    })
                    .await?
                    {
                        WorkflowResponse::Status(report) => report,
                        _ => unreachable!("CheckStatus yields Status"),
                    };
                    state = next_state(report.aggregate.overall_status);
                }
                WorkflowState::Success => {
                    info!("OTA job {} completed successfully", job_id);
                    return Ok(WorkflowOutcome {
                        job_id: job_id.to_string(),
                        state: WorkflowState::Success,
                        reason: None,
                    });
                }
                WorkflowState::RollingBack => {
                    warn!("OTA job {} crossed the abort threshold, rolling back", job_id);
                    self.execute(WorkflowRequest::Rollback {
                        job_id: job_id.to_string(),
                    })
                    .await?;
                    return Ok(WorkflowOutcome {
                        job_id: job_id.to_string(),
                        state: WorkflowState::Failed,
                        reason: Some("failure threshold exceeded".to_string()),
                    });
                }
                WorkflowState::Created | WorkflowState::Failed => {
                    unreachable!("drive starts in WAITING and returns on terminal states")
                }
            }
        }
    }

    async fn fail_on_timeout(&self, job_id: &str) -> Result<WorkflowOutcome, OtaError> {
        warn!(
            "OTA job {} exceeded the overall timeout ({:?}), rolling back",
            job_id, self.options.overall_timeout
        );
        self.execute(WorkflowRequest::Rollback {
            job_id: job_id.to_string(),
        })
        .await?;
        Ok(WorkflowOutcome {
            job_id: job_id.to_string(),
            state: WorkflowState::Failed,
            reason: Some("overall workflow timeout exceeded".to_string()),
        })
    }
}
