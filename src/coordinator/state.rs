//! Single-active-cycle enforcement and the live `CycleView` projection.

use crate::models::{CycleMode, CycleStage, CycleStatus, CycleView, TradingCycle};
use crate::CoreError;
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct ActiveCycle {
    cycle: TradingCycle,
    current_stage: Option<CycleStage>,
    cancel: CancellationToken,
}

/// Holds the one cycle that may be running at a time, guarded by a mutex so
/// starting a cycle while one is active fails fast with `CoreError::Busy`.
pub struct CycleState {
    active: Mutex<Option<ActiveCycle>>,
}

impl Default for CycleState {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleState {
    pub fn new() -> Self {
        Self { active: Mutex::new(None) }
    }

    /// Begin a new cycle, or fail if one is already active.
    pub fn start(&self, mode: CycleMode) -> Result<TradingCycle, CoreError> {
        let mut guard = self.active.lock();
        if guard.is_some() {
            return Err(CoreError::Busy);
        }
        let cycle_id = Uuid::new_v4().to_string();
        let cycle = TradingCycle::new(cycle_id, mode, Utc::now());
        *guard = Some(ActiveCycle {
            cycle: cycle.clone(),
            current_stage: None,
            cancel: CancellationToken::new(),
        });
        Ok(cycle)
    }

    /// Token the active cycle's stage loops poll to detect an operator
    /// cancellation. `None` if no cycle is active.
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.active.lock().as_ref().map(|a| a.cancel.clone())
    }

    /// Signal the active cycle to stop. Returns `false` if none was active.
    pub fn request_cancel(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn set_stage(&self, stage: CycleStage) {
        if let Some(active) = self.active.lock().as_mut() {
            active.current_stage = Some(stage);
        }
    }

    pub fn record_progress(&self, f: impl FnOnce(&mut TradingCycle)) {
        if let Some(active) = self.active.lock().as_mut() {
            f(&mut active.cycle);
        }
    }

    /// Clear the active cycle once it reaches a terminal state, returning the
    /// final `TradingCycle` record for persistence.
    pub fn finish(&self, status: CycleStatus, reason: Option<String>) -> Option<TradingCycle> {
        let mut guard = self.active.lock();
        let active = guard.take()?;
        let mut cycle = active.cycle;
        cycle.transition(status, Utc::now(), reason);
        Some(cycle)
    }

    pub fn view(&self) -> Option<CycleView> {
        let guard = self.active.lock();
        let active = guard.as_ref()?;
        let elapsed = (Utc::now() - active.cycle.started_at).num_seconds();
        Some(CycleView {
            cycle_id: active.cycle.cycle_id.clone(),
            mode: active.cycle.mode,
            status: active.cycle.status,
            current_stage: active.current_stage,
            elapsed_seconds: elapsed,
            news_collected: active.cycle.news_collected,
            candidates_selected: active.cycle.candidates_selected,
            patterns_analyzed: active.cycle.patterns_analyzed,
            signals_generated: active.cycle.signals_generated,
            trades_executed: active.cycle.trades_executed,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_start_fails_busy_while_one_active() {
        let state = CycleState::new();
        state.start(CycleMode::Normal).unwrap();
        let err = state.start(CycleMode::Normal).unwrap_err();
        assert!(matches!(err, CoreError::Busy));
    }

    #[test]
    fn cancel_with_no_active_cycle_returns_false() {
        let state = CycleState::new();
        assert!(!state.request_cancel());
    }

    #[test]
    fn cancel_trips_the_active_cycles_token() {
        let state = CycleState::new();
        state.start(CycleMode::Normal).unwrap();
        let token = state.cancellation_token().unwrap();
        assert!(!token.is_cancelled());
        assert!(state.request_cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn finish_clears_active_slot_for_next_start() {
        let state = CycleState::new();
        state.start(CycleMode::Normal).unwrap();
        assert!(state.is_active());
        state.finish(CycleStatus::Completed, None);
        assert!(!state.is_active());
        assert!(state.start(CycleMode::Normal).is_ok());
    }
}
