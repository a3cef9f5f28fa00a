//! Dispatch-plan computation: who is ready to run right now, who is blocked,
//! and how many dispatch slots remain (§4.1.2).

use crate::dag::model::Dag;
use crate::dag::{blocked_set, ready_set};
use crate::state::model::{RunState, SpecStatus};

pub struct DispatchPlan {
    /// Feature ids ready to dispatch now, already tie-broken (layer, decl
    /// order, id).
    pub ready: Vec<String>,
    /// Feature ids newly discovered to be blocked this round.
    pub newly_blocked: Vec<String>,
    pub running_count: usize,
    pub slots_available: usize,
}

pub fn compute(dag: &Dag, state: &RunState, max_parallel: u32) -> DispatchPlan {
    let running_count = state
        .specs
        .values()
        .filter(|s| s.status == SpecStatus::Running)
        .count();

    let slots_available = (max_parallel as usize).saturating_sub(running_count);
    let ready = ready_set(dag, state);
    let blocked = blocked_set(dag, state);

    DispatchPlan {
        ready: ready.into_iter().take(slots_available).collect(),
        newly_blocked: blocked,
        running_count,
        slots_available,
    }
}

/// §4.1.2 step 6: run-terminal status once no spec is running and nothing
/// is ready to dispatch.
pub fn is_run_terminal(dag: &Dag, state: &RunState) -> bool {
    let any_running = state.specs.values().any(|s| s.status == SpecStatus::Running);
    if any_running {
        return false;
    }
    ready_set(dag, state).is_empty()
}

/// Whether every non-blocked spec ended `completed` (run succeeds) or some
/// ended `failed` (run fails).
pub fn run_succeeded(state: &RunState) -> bool {
    state.specs.values().all(|s| matches!(s.status, SpecStatus::Completed | SpecStatus::Blocked))
}
