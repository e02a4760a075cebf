//! Server state

use std::sync::Arc;

use crate::orchestrator::JobOrchestrator;
use crate::registry::FirmwareRegistry;
use crate::tracker::ExecutionTracker;
use crate::workflow::WorkflowController;

/// Server state shared across handlers
pub struct ServerState {
    pub registry: Arc<FirmwareRegistry>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub tracker: Arc<ExecutionTracker>,
    pub controller: Arc<WorkflowController>,
}

impl ServerState {
    pub fn new(
        registry: Arc<FirmwareRegistry>,
        orchestrator: Arc<JobOrchestrator>,
        tracker: Arc<ExecutionTracker>,
        controller: Arc<WorkflowController>,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            tracker,
            controller,
        }
    }
}
