//! Cycle Coordinator component: scheduling, stage orchestration, operator
//! control, and outcome feedback.

pub mod collaborators;
pub mod feedback;
pub mod scheduler;
pub mod stages;
pub mod state;

pub use collaborators::HttpCollaborator;
pub use feedback::OutcomeFeedback;
pub use scheduler::Scheduler;
pub use stages::StageRunner;
pub use state::CycleState;

use crate::config::ConfigStore;
use crate::models::{CycleMode, CycleView, TradingCycle};
use crate::persistence::PersistencePort;
use crate::CoreError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Operator-facing facade: the surface the HTTP API binds to.
pub struct Coordinator {
    pub state: Arc<CycleState>,
    pub runner: Arc<StageRunner>,
    pub config: Arc<ConfigStore>,
    pub collaborators: Vec<Arc<dyn collaborators::HealthCheckable>>,
    pub persistence: Arc<dyn PersistencePort>,
    pub scheduler: Arc<Scheduler>,
}

impl Coordinator {
    pub async fn start_cycle(&self, mode: Option<CycleMode>) -> Result<String, CoreError> {
        let mode = mode.unwrap_or(CycleMode::Normal);
        let cycle = self.state.start(mode)?;
        let cycle_id = cycle.cycle_id.clone();
        let runner = self.runner.clone();
        tokio::spawn(async move {
            let _ = runner.run_cycle(cycle).await;
        });
        Ok(cycle_id)
    }

    pub fn current_cycle(&self) -> Option<CycleView> {
        self.state.view()
    }

    /// Signal the active cycle's stage loops to stop after their current
    /// collaborator call; `run_cycle` finalizes it as `failed`/`cancelled`
    /// within one stage iteration. Returns `false` if no cycle was active.
    pub fn cancel_cycle(&self) -> bool {
        self.state.request_cancel()
    }

    /// Probes each collaborator's health endpoint with a 5s timeout.
    pub async fn service_health(&self) -> HashMap<String, String> {
        let mut statuses = HashMap::new();
        for collaborator in &self.collaborators {
            let status = match tokio::time::timeout(Duration::from_secs(5), collaborator.health()).await {
                Ok(Ok(true)) => "healthy",
                Ok(Ok(false)) => "unhealthy",
                Ok(Err(_)) => "unreachable",
                Err(_) => "timeout",
            };
            statuses.insert(collaborator.name().to_string(), status.to_string());
        }
        statuses
    }

    /// Transactional configuration update; invalidates the cached copy.
    pub fn update_config(&self, key: &str, value: crate::config::ConfigValue) {
        self.config.write(key, value);
    }

    /// Historical lookup for a completed or in-flight cycle, by id.
    pub async fn get_cycle(&self, cycle_id: &str) -> Result<TradingCycle, CoreError> {
        self.persistence
            .read_cycle(cycle_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("cycle_id {cycle_id}")))
    }

    /// Operator `reload`: re-reads schedule boundaries from the configuration
    /// store and marks the reload moment.
    pub fn reload(&self) {
        crate::config::mark_reload(&self.config);
        self.scheduler.reload(&self.config);
    }
}
