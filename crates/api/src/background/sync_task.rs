//! Periodic reconciliation driver.
//!
//! Ticks the engine on a fixed cadence and publishes one
//! `download.updated` event per completed pass. Busy and unreachable
//! passes publish nothing; the single-flight guard inside the engine
//! serializes this task with the on-demand sync endpoint.

use std::sync::Arc;
use std::time::Duration;

use magnetar_events::{DownloadEvent, EventBus};
use magnetar_sync::{PassOutcome, Reconciler};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run the reconciliation loop until `cancel` is triggered.
pub async fn run(
    reconciler: Arc<Reconciler>,
    event_bus: Arc<EventBus>,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs, "Reconciliation task started");

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // A pass slower than the cadence must not cause a burst of
    // catch-up ticks afterwards.
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconciliation task stopping");
                break;
            }
            _ = interval.tick() => {
                match reconciler.run_pass().await {
                    Ok(PassOutcome::Completed { updated_count, items }) => {
                        tracing::debug!(updated_count, items = items.len(), "reconciliation pass completed");
                        let payload = serde_json::to_value(&items).unwrap_or_default();
                        event_bus.publish(DownloadEvent::new("download.updated", payload));
                    }
                    Ok(PassOutcome::Unreachable) => {
                        // Nothing to publish; stale state beats invented state.
                    }
                    Ok(PassOutcome::Busy) => {
                        tracing::debug!("pass already in flight, skipping tick");
                    }
                    Err(error) => {
                        tracing::error!(%error, "reconciliation pass failed");
                    }
                }
            }
        }
    }
}
