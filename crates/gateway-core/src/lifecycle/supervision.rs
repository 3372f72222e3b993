//! Health evaluation and supervised restart.

use super::{capability, ModuleLifecycle};
use crate::config::TransportConfig;
use crate::health::HealthState;
use crate::system;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Last health result and the run of bad results leading up to it.
#[derive(Debug)]
pub(super) struct HealthTracker {
    state: HealthState,
    fail_streak: u32,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self {
            state: HealthState::Good,
            fail_streak: 0,
        }
    }
}

impl ModuleLifecycle {
    /// Evaluate health and restart the module after too many bad results.
    ///
    /// Evaluation only happens while the last result was `Good`; once health
    /// drops it stays down until the process restarts. Each evaluation sends
    /// heartbeat and free-memory telemetry.
    pub async fn get_health(&self) -> HealthState {
        if !self.is_connected().await {
            return self.health.lock().await.state;
        }

        let mut tracker = self.health.lock().await;

        if tracker.state.is_good() {
            let free_memory = system::free_memory_kb();
            let state = if free_memory == 0 {
                HealthState::Critical
            } else {
                match self.hooks.on_health().await {
                    Ok(state) => state,
                    Err(e) => {
                        error!("onHealth failed: {}", e);
                        HealthState::Critical
                    }
                }
            };

            self.send_measurement(
                &json!({
                    capability::TL_FREE_MEMORY: free_memory,
                    capability::TL_SYSTEM_HEARTBEAT: state
                }),
                Some(TransportConfig::IOTC_OUTPUT_NAME),
            )
            .await;

            tracker.state = state;
        }

        let state = tracker.state;
        if state.is_good() {
            tracker.fail_streak = 0;
            return state;
        }

        tracker.fail_streak += 1;
        warn!(
            "Health check state: {} (fail streak {}/{})",
            state, tracker.fail_streak, self.config.health_check_retries
        );

        if tracker.fail_streak >= self.config.health_check_retries {
            drop(tracker);
            warn!("Health check retries exceeded, restarting the module");
            self.restart_module(Duration::ZERO, "checkHealthState").await;
        }

        state
    }

    /// Report the module as stopped and schedule process exit.
    ///
    /// Sends the stopped event, waits `delay`, then spawns the exit after the
    /// configured grace period so in-flight responses can still go out.
    /// Returns once the exit is scheduled. Calls made while a restart is
    /// already pending are ignored.
    pub async fn restart_module(&self, delay: Duration, reason: &str) {
        if self.restart_pending.swap(true, Ordering::SeqCst) {
            info!("restartModule: restart already pending, ignoring '{}'", reason);
            return;
        }

        info!("restartModule: {}", reason);

        self.send_measurement(
            &json!({
                capability::EV_MODULE_RESTART: reason,
                capability::ST_MODULE_STATE: capability::MODULE_STATE_INACTIVE,
                capability::EV_MODULE_STOPPED: "Module restart"
            }),
            Some(TransportConfig::IOTC_OUTPUT_NAME),
        )
        .await;

        tokio::time::sleep(delay).await;

        let grace = self.config.restart_grace;
        let exit = self.exit_handler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            info!("Shutting down main process - module container will restart");
            exit(1);
        });
    }

    pub fn is_restart_pending(&self) -> bool {
        self.restart_pending.load(Ordering::SeqCst)
    }

    /// Run `get_health` every `period` until the lifecycle is dropped.
    pub fn spawn_health_monitor(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let lifecycle = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(lifecycle) = lifecycle.upgrade() else {
                    break;
                };
                lifecycle.get_health().await;
            }
        })
    }
}
