//! Time-of-day-aware scheduler: selects a mode each tick from the configured
//! session windows and drives one cycle through `StageRunner`.

use crate::clock::{tick_interval_secs, ScheduleClock, SessionWindows};
use crate::config::ConfigStore;
use crate::coordinator::stages::StageRunner;
use crate::coordinator::state::CycleState;
use chrono_tz::Tz;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct Scheduler {
    clock: Arc<dyn ScheduleClock>,
    windows: RwLock<SessionWindows>,
    tz: Tz,
    state: Arc<CycleState>,
    runner: Arc<StageRunner>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn ScheduleClock>, windows: SessionWindows, tz: Tz, state: Arc<CycleState>, runner: Arc<StageRunner>) -> Self {
        Self { clock, windows: RwLock::new(windows), tz, state, runner }
    }

    /// Re-reads premarket session boundaries from the configuration store.
    /// Invoked by the operator `reload` control path.
    pub fn reload(&self, config: &ConfigStore) {
        let mut windows = self.windows.write();
        if let Some(t) = config.read("premarket_start").and_then(|v| v.as_time()) {
            windows.premarket_start = t;
        }
        if let Some(t) = config.read("premarket_end").and_then(|v| v.as_time()) {
            windows.premarket_end = t;
        }
        info!("schedule boundaries reloaded from configuration store");
    }

    /// Run forever, ticking at a cadence that tracks the current mode. A tick
    /// is skipped if the previous cycle has not reached a terminal state.
    pub async fn run(&self) -> ! {
        loop {
            let now = self.clock.now();
            let mode = self.windows.read().mode_for(now, self.tz);
            let interval = Duration::from_secs(tick_interval_secs(mode));

            if self.state.is_active() {
                info!(?mode, "skipping tick: previous cycle still active");
            } else {
                match self.state.start(mode) {
                    Ok(cycle) => {
                        let deadline = interval * 5;
                        let runner = self.runner.clone();
                        let state = self.state.clone();
                        let cycle_id = cycle.cycle_id.clone();
                        tokio::spawn(async move {
                            let outcome = tokio::time::timeout(deadline, runner.run_cycle(cycle)).await;
                            if outcome.is_err() {
                                warn!(cycle_id, "cycle exceeded 5x tick interval; auto-cancelling");
                                if let Some(finished) = state.finish(
                                    crate::models::CycleStatus::Failed,
                                    Some("cancelled: exceeded 5x tick interval".to_string()),
                                ) {
                                    if let Err(e) = runner.persistence.finalize_cycle(&finished).await {
                                        warn!(cycle_id, error = %e, "failed to persist auto-cancelled cycle");
                                    }
                                }
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "scheduler could not start cycle"),
                }
            }

            tokio::time::sleep(interval).await;
        }
    }
}
