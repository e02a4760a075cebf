//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::errors::OtaError;
use crate::orchestrator::JobOrchestrator;
use crate::registry::artifacts::HttpArtifactStore;
use crate::registry::FirmwareRegistry;
use crate::store::JobStore;
use crate::tracker::ExecutionTracker;
use crate::transport::mqtt::MqttTransport;
use crate::transport::{CommandChannel, NullCommandChannel};
use crate::workflow::WorkflowController;

/// The explicit client bundle shared across the process.
///
/// Constructed once by the entry point and passed by reference into every
/// component; no module-level singletons.
pub struct AppState {
    pub store: Arc<JobStore>,
    pub registry: Arc<FirmwareRegistry>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub tracker: Arc<ExecutionTracker>,
    pub controller: Arc<WorkflowController>,
}

impl AppState {
    /// Initialize application state.
    ///
    /// Returns the MQTT transport alongside the state when a broker is
    /// configured; the caller hands it to the status listener worker. Without
    /// a broker, commands go to a null channel and no transport is returned.
    pub fn init(options: &AppOptions) -> Result<(Self, Option<MqttTransport>), OtaError> {
        info!("Initializing application state...");

        let artifact_store = Arc::new(HttpArtifactStore::new(&options.artifact_store_base_url)?);
        let registry = Arc::new(FirmwareRegistry::new(artifact_store));
        let store = Arc::new(JobStore::new());

        let (channel, transport): (Arc<dyn CommandChannel>, Option<MqttTransport>) =
            if options.mqtt_broker.host.is_empty() {
                warn!("MQTT broker not configured; device commands will be dropped");
                (Arc::new(NullCommandChannel), None)
            } else {
                let transport = MqttTransport::new(&options.mqtt_broker, "otafleet-server")?;
                (Arc::new(transport.command_channel()), Some(transport))
            };

        let tracker = Arc::new(ExecutionTracker::new(
            store.clone(),
            channel.clone(),
            options.policy,
        ));
        let orchestrator = Arc::new(JobOrchestrator::new(
            registry.clone(),
            store.clone(),
            channel,
        ));
        let controller = Arc::new(WorkflowController::new(
            orchestrator.clone(),
            tracker.clone(),
            options.workflow.clone(),
        ));

        let state = Self {
            store,
            registry,
            orchestrator,
            tracker,
            controller,
        };

        Ok((state, transport))
    }
}
