use crate::errors::ErrorLog;
use crate::health::HealthTracker;
use crate::node::ControlNode;
use std::time::Duration;
use tokio::task::JoinHandle;

/// One full refresh with a fresh error log, recorded in the health tracker.
pub async fn run_poll_cycle(node: &ControlNode, health: &HealthTracker) -> ErrorLog {
    let mut log = ErrorLog::new();
    node.refresh_all(&mut log).await;
    health.record_poll(log.len());
    if !log.is_empty() {
        tracing::warn!(errors = log.len(), first = %log.errors()[0], "poll cycle reported errors");
    }
    log
}

/// Refreshes the whole site every `interval`. Errors are logged, never fatal.
pub fn spawn_poller(node: ControlNode, health: HealthTracker, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_poll_cycle(&node, &health).await;
        }
    })
}
