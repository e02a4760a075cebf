//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::errors::OtaError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::status_listener;

/// Run the otafleet service
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), OtaError> {
    info!("Initializing otafleet...");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    let (app_state, transport) = AppState::init(&options)?;

    // Status listener
    if options.enable_status_listener {
        if let Some(transport) = transport {
            let listener_options = options.status_listener.clone();
            let tracker = app_state.tracker.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                status_listener::run(
                    &listener_options,
                    transport,
                    tracker,
                    tokio::time::sleep,
                    Box::pin(async move {
                        let _ = shutdown_rx.recv().await;
                    }),
                )
                .await;
            }));
        }
    }

    // HTTP server
    let mut server_handle = None;
    if options.enable_http_server {
        let server_state = Arc::new(ServerState::new(
            app_state.registry.clone(),
            app_state.orchestrator.clone(),
            app_state.tracker.clone(),
            app_state.controller.clone(),
        ));
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = serve(&options.server, server_state, async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;
        server_handle = Some(handle);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    let _ = shutdown_tx.send(());

    let drain = async {
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed during shutdown: {}", e);
            }
        }
        if let Some(handle) = server_handle {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("HTTP server error during shutdown: {}", e),
                Err(e) => error!("HTTP server task failed during shutdown: {}", e),
            }
        }
    };

    if tokio::time::timeout(options.max_shutdown_delay, drain)
        .await
        .is_err()
    {
        warn!(
            "Graceful shutdown exceeded {:?}, exiting anyway",
            options.max_shutdown_delay
        );
    }

    info!("Shutdown complete");
    Ok(())
}
