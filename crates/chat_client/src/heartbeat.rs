//! Periodic `heartbeat` event while a socket is open.

use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::client::OutboundWriter;

/// Default spacing between heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Owns at most one heartbeat task. The task writes through the shared
/// [`OutboundWriter`] and ends on the first failed write.
#[derive(Debug)]
pub struct Heartbeat {
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn new(period: Duration) -> Self {
        Self { period, task: None }
    }

    /// Start beating on `writer`, replacing any previous task. The first
    /// beat goes out one period after the start.
    pub fn start(&mut self, writer: OutboundWriter) {
        self.stop();
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = writer.send_event("heartbeat", &json!({})).await {
                    tracing::debug!(error = %e, "heartbeat write failed, stopping");
                    break;
                }
                tracing::trace!("heartbeat sent");
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// True while a heartbeat task exists and has not ended.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(HEARTBEAT_INTERVAL)
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
