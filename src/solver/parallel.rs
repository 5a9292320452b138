//! Hooks for portfolio-style parallelism across independent solvers.
//!
//! The core owns no threads: each worker runs its own [`crate::Solver`] on
//! its own thread, and their monitors exchange the best objective value, the
//! finish flag and a printable description of the best solution through a
//! shared context.

use crate::core::state::State;
use crate::core::{EmptyDomain, IntCst, VarRef};
use crate::solver::monitor::SearchMonitor;
use crate::solver::stats::Stats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Best {
    objective: Option<IntCst>,
    solution: Option<String>,
}

/// State shared between the monitors of several solver instances.
#[derive(Default)]
pub struct SharedContext {
    best: Mutex<Best>,
    finish: AtomicBool,
}

impl SharedContext {
    pub fn new() -> Arc<SharedContext> {
        Arc::new(SharedContext::default())
    }

    /// Records a solution if it improves on the shared incumbent. Returns
    /// whether it did.
    pub fn report_solution(&self, objective: IntCst, minimize: bool, solution: String) -> bool {
        let mut best = self.best.lock().unwrap();
        let improved = match best.objective {
            Some(incumbent) if minimize => objective < incumbent,
            Some(incumbent) => objective > incumbent,
            None => true,
        };
        if improved {
            best.objective = Some(objective);
            best.solution = Some(solution);
        }
        improved
    }

    pub fn best_objective(&self) -> Option<IntCst> {
        self.best.lock().unwrap().objective
    }

    pub fn best_solution(&self) -> Option<String> {
        self.best.lock().unwrap().solution.clone()
    }

    /// Asks every participating solver to stop at its next periodic check.
    pub fn request_finish(&self) {
        self.finish.store(true, Ordering::Relaxed);
    }

    pub fn should_finish(&self) -> bool {
        self.finish.load(Ordering::Relaxed)
    }
}

/// Monitor wiring one solver's objective search to a [`SharedContext`]:
/// solutions are published, the shared incumbent prunes the local search, and
/// the shared finish flag stops it.
pub struct SharedObjective {
    ctx: Arc<SharedContext>,
    var: VarRef,
    minimize: bool,
}

impl SharedObjective {
    pub fn new(ctx: Arc<SharedContext>, var: VarRef, minimize: bool) -> Self {
        SharedObjective { ctx, var, minimize }
    }
}

impl SearchMonitor for SharedObjective {
    fn begin_next_decision(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        if let Some(best) = self.ctx.best_objective() {
            if self.minimize {
                state.set_max(self.var, best - 1)?;
            } else {
                state.set_min(self.var, best + 1)?;
            }
        }
        Ok(())
    }

    fn at_solution(&mut self, state: &State) -> bool {
        let value = if self.minimize {
            state.min(self.var)
        } else {
            state.max(self.var)
        };
        self.ctx
            .report_solution(value, self.minimize, format!("{:?} = {}", self.var, value));
        true
    }

    fn periodic_check(&mut self, _state: &State, _stats: &Stats) -> bool {
        !self.ctx.should_finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incumbent_exchange() {
        let ctx = SharedContext::new();
        assert!(ctx.report_solution(10, true, "a".into()));
        assert!(!ctx.report_solution(12, true, "b".into()));
        assert!(ctx.report_solution(7, true, "c".into()));
        assert_eq!(ctx.best_objective(), Some(7));
        assert_eq!(ctx.best_solution().as_deref(), Some("c"));
    }

    #[test]
    fn finish_flag_is_sticky() {
        let ctx = SharedContext::new();
        assert!(!ctx.should_finish());
        ctx.request_finish();
        assert!(ctx.should_finish());
    }

    #[test]
    fn shared_bound_prunes_local_search() {
        let ctx = SharedContext::new();
        ctx.report_solution(5, true, "peer".into());
        let mut s = State::new();
        let obj = s.new_var(0, 100);
        let mut mon = SharedObjective::new(Arc::clone(&ctx), obj, true);
        mon.begin_next_decision(&mut s).unwrap();
        assert_eq!(s.bounds(obj), (0, 4));
    }
}
