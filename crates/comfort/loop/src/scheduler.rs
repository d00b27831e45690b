//! Periodic tick driver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

use crate::controller::FeedbackLoopController;

/// Runs [`FeedbackLoopController::tick`] on an interval and on demand.
pub struct TickScheduler {
    controller: Arc<FeedbackLoopController>,
    period: Duration,
    trigger_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
    ticks: AtomicU64,
}

impl TickScheduler {
    /// Create a scheduler ticking every `period`.
    pub fn new(
        controller: Arc<FeedbackLoopController>,
        period: Duration,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (trigger_tx, trigger_rx) = mpsc::channel(10);

        let scheduler = Arc::new(Self {
            controller,
            period: period.max(Duration::from_millis(1)),
            trigger_tx,
            running: Arc::new(RwLock::new(false)),
            ticks: AtomicU64::new(0),
        });

        (scheduler, trigger_rx)
    }

    /// Request an immediate tick.
    pub async fn trigger(&self) {
        let _ = self.trigger_tx.send(()).await;
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Run until [`stop`](TickScheduler::stop) is called.
    pub async fn start(self: Arc<Self>, mut trigger_rx: mpsc::Receiver<()>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(period_ms = self.period.as_millis() as u64, "Tick scheduler started");

        let mut interval = interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                Some(_) = trigger_rx.recv() => {}
                else => break,
            }

            if !*self.running.read().await {
                break;
            }

            let report = self.controller.tick().await;
            self.ticks.fetch_add(1, Ordering::SeqCst);
            if !report.rollbacks.is_empty() {
                tracing::warn!(rollbacks = report.rollbacks.len(), "Tick rolled back sessions");
            }
        }

        tracing::info!("Tick scheduler stopped");
    }

    /// Stop the scheduler after its current tick.
    pub async fn stop(&self) {
        {
            let mut running = self.running.write().await;
            *running = false;
        }
        // Wake the loop so it notices
        let _ = self.trigger_tx.try_send(());
    }
}

/// Spawn a scheduler on the current runtime.
pub fn spawn_scheduler(
    controller: Arc<FeedbackLoopController>,
    period: Duration,
) -> (Arc<TickScheduler>, tokio::task::JoinHandle<()>) {
    let (scheduler, trigger_rx) = TickScheduler::new(controller, period);
    let task = tokio::spawn(scheduler.clone().start(trigger_rx));
    (scheduler, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::ControllerConfig;
    use crate::validator::PermissiveSettingsValidator;

    fn controller() -> Arc<FeedbackLoopController> {
        Arc::new(
            FeedbackLoopController::with_system_clock(
                ControllerConfig::default(),
                Arc::new(PermissiveSettingsValidator),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_trigger_runs_tick_and_stop_ends_loop() {
        let (scheduler, task) = spawn_scheduler(controller(), Duration::from_secs(3600));

        // First interval tick fires immediately
        for _ in 0..100 {
            if scheduler.ticks() >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        scheduler.trigger().await;
        for _ in 0..100 {
            if scheduler.ticks() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(scheduler.ticks() >= 2);

        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!scheduler.is_running().await);
    }
}
