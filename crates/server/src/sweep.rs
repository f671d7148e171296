use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::api::Engine;

/// Background escalation sweep. The engine's `tick` is idempotent per day,
/// so the interval only controls how quickly an overdue workflow is noticed.
/// Operators without a long-lived server process can run the same sweep via
/// the CLI instead.
pub fn spawn(engine: Arc<Engine>, interval_secs: u64) {
    info!(
        event_name = "system.sweep.start",
        correlation_id = "bootstrap",
        interval_secs,
        "escalation sweep task started"
    );

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match engine.tick(Utc::now()).await {
                Ok(report) => {
                    info!(
                        event_name = "system.sweep.completed",
                        correlation_id = "sweep",
                        scanned = report.scanned,
                        escalated = report.escalated.len(),
                        conflicts = report.conflicts.len(),
                        "escalation sweep completed"
                    );
                }
                Err(sweep_error) => {
                    error!(
                        event_name = "system.sweep.failed",
                        correlation_id = "sweep",
                        error = %sweep_error,
                        "escalation sweep failed; retrying at the next interval"
                    );
                }
            }
        }
    });
}
