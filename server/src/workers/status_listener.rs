//! Status listener worker
//!
//! Subscribes to the device status topics and feeds every inbound event to
//! the execution tracker. Delivery is at-least-once and unordered; the
//! tracker's acceptance rule handles both, so this worker just parses and
//! forwards.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::tracker::ExecutionTracker;
use crate::transport::mqtt::MqttTransport;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Status listener options
#[derive(Debug, Clone)]
pub struct Options {
    /// Backoff applied between reconnect attempts
    pub cooldown: CooldownOptions,

    /// Max consecutive connection errors before giving up
    pub max_error_streak: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cooldown: CooldownOptions::default(),
            max_error_streak: 10,
        }
    }
}

/// Run the status listener worker.
///
/// The transport reconnects on its own when polled after an error; this loop
/// re-issues the status subscription after each drop and backs off between
/// attempts so a dead broker is not hammered.
pub async fn run<S, F>(
    options: &Options,
    mut transport: MqttTransport,
    tracker: Arc<ExecutionTracker>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Status listener starting...");

    if let Err(e) = transport.subscribe_status().await {
        error!("Failed to queue status subscription: {}", e);
        return;
    }

    let mut err_streak: u32 = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Status listener shutting down...");
                return;
            }
            result = transport.poll() => {
                match result {
                    Ok(Some(event)) => {
                        err_streak = 0;
                        debug!(
                            "Status event from device {} for job {}",
                            event.device_id, event.job_id
                        );
                        tracker.handle_status_event(&event);
                    }
                    Ok(None) => {
                        err_streak = 0;
                    }
                    Err(e) => {
                        err_streak += 1;
                        if err_streak >= options.max_error_streak {
                            error!(
                                "MQTT connection failed {} times in a row, giving up: {}",
                                err_streak, e
                            );
                            return;
                        }
                        let delay = calc_exp_backoff(&options.cooldown, err_streak - 1);
                        warn!(
                            "MQTT connection error: {}, retrying in {:?}",
                            e, delay
                        );
                        sleep_fn(delay).await;
                        // Subscriptions do not survive a reconnect
                        if let Err(e) = transport.subscribe_status().await {
                            warn!("Failed to re-queue status subscription: {}", e);
                        }
                    }
                }
            }
        }
    }
}
