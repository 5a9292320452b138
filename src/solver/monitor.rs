//! Search monitors: observers of the search events, able to steer or stop it.

use crate::core::state::State;
use crate::core::{EmptyDomain, IntCst, VarRef};
use crate::solver::search::Decision;
use crate::solver::stats::Stats;
use std::time::{Duration, Instant};
use tracing::info;

/// Observer of the search. Monitors are notified in registration order; all
/// hooks default to no-ops.
///
/// The boolean-returning hooks steer the search: `accept_solution` answers
/// are conjoined and a rejected candidate forces the search to continue;
/// `at_solution` returning `false` finishes the search after the current
/// solution; `periodic_check` returning `false` stops it as a limit.
/// `begin_next_decision` may prune the current node (the standard objective
/// pattern) and therefore may fail.
#[allow(unused_variables)]
pub trait SearchMonitor {
    fn enter_search(&mut self, state: &mut State) {}

    fn restart_search(&mut self, state: &mut State) {}

    fn exit_search(&mut self, state: &mut State) {}

    /// Called before the decision builder, at every node. An `Err` fails the
    /// node.
    fn begin_next_decision(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        Ok(())
    }

    /// Called after the decision builder, with the decision it produced.
    fn end_next_decision(&mut self, state: &mut State, decision: Option<&Decision>) {}

    fn apply_decision(&mut self, state: &mut State, decision: &Decision) {}

    fn refute_decision(&mut self, state: &mut State, decision: &Decision) {}

    /// Just when a failure occurs.
    fn begin_fail(&mut self, state: &mut State) {}

    /// After the backtrack completed.
    fn end_fail(&mut self, state: &mut State) {}

    fn begin_initial_propagation(&mut self, state: &mut State) {}

    fn end_initial_propagation(&mut self, state: &mut State) {}

    /// Vets a candidate solution; `false` discards it and the search resumes.
    fn accept_solution(&mut self, state: &State) -> bool {
        true
    }

    /// Called on each accepted solution; `false` finishes the search once the
    /// solution has been returned.
    fn at_solution(&mut self, state: &State) -> bool {
        true
    }

    fn no_more_solutions(&mut self, state: &mut State) {}

    /// Polled before each decision and periodically inside the fixpoint loop;
    /// `false` stops the search as a limit.
    fn periodic_check(&mut self, state: &State, stats: &Stats) -> bool {
        true
    }

    /// Polled before each decision; `true` pops the search back to its root.
    fn wants_restart(&self) -> bool {
        false
    }
}

/// Caps on the search effort. Any crossed cap stops the search; the caller
/// observes it through `Solver::limit_reached`.
#[derive(Default)]
pub struct SearchLimit {
    time: Option<Duration>,
    branches: Option<u64>,
    failures: Option<u64>,
    solutions: Option<u64>,
    started: Option<Instant>,
    crossed: bool,
}

impl SearchLimit {
    pub fn new() -> Self {
        SearchLimit::default()
    }

    pub fn with_time(mut self, limit: Duration) -> Self {
        self.time = Some(limit);
        self
    }

    pub fn with_branches(mut self, limit: u64) -> Self {
        self.branches = Some(limit);
        self
    }

    pub fn with_failures(mut self, limit: u64) -> Self {
        self.failures = Some(limit);
        self
    }

    pub fn with_solutions(mut self, limit: u64) -> Self {
        self.solutions = Some(limit);
        self
    }

    pub fn crossed(&self) -> bool {
        self.crossed
    }
}

impl SearchMonitor for SearchLimit {
    fn enter_search(&mut self, _state: &mut State) {
        self.started = Some(Instant::now());
        self.crossed = false;
    }

    fn periodic_check(&mut self, _state: &State, stats: &Stats) -> bool {
        let over_time = match (self.time, self.started) {
            (Some(limit), Some(started)) => started.elapsed() >= limit,
            _ => false,
        };
        let over = over_time
            || self.branches.is_some_and(|b| stats.branches >= b)
            || self.failures.is_some_and(|f| stats.failures >= f)
            || self.solutions.is_some_and(|s| stats.solutions >= s);
        if over {
            self.crossed = true;
        }
        !over
    }
}

/// Objective monitor: records the best value at each solution and tightens
/// the bound at every subsequent node, turning the enumeration into
/// branch-and-bound.
pub struct Objective {
    var: VarRef,
    minimize: bool,
    step: IntCst,
    best: Option<IntCst>,
}

impl Objective {
    pub fn minimize(var: VarRef) -> Self {
        Objective {
            var,
            minimize: true,
            step: 1,
            best: None,
        }
    }

    pub fn maximize(var: VarRef) -> Self {
        Objective {
            var,
            minimize: false,
            step: 1,
            best: None,
        }
    }

    pub fn with_step(mut self, step: IntCst) -> Self {
        assert!(step > 0, "objective step must be positive");
        self.step = step;
        self
    }

    /// Best objective value seen so far, if any solution was accepted.
    pub fn best(&self) -> Option<IntCst> {
        self.best
    }
}

impl SearchMonitor for Objective {
    fn enter_search(&mut self, _state: &mut State) {
        self.best = None;
    }

    fn begin_next_decision(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        if let Some(best) = self.best {
            if self.minimize {
                state.set_max(self.var, best - self.step)?;
            } else {
                state.set_min(self.var, best + self.step)?;
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
        let improved = match self.best {
            Some(best) if self.minimize => value < best,
            Some(best) => value > best,
            None => true,
        };
        if improved {
            self.best = Some(value);
        }
        true
    }
}

/// Failure budget before each restart.
#[derive(Copy, Clone, Debug)]
pub enum RestartSchedule {
    /// The same budget every time.
    Constant(u64),
    /// Budget multiplied by `factor` after each restart.
    Geometric { base: u64, factor: f64 },
    /// The Luby sequence (1, 1, 2, 1, 1, 2, 4, ...) scaled by `scale`.
    Luby { scale: u64 },
}

fn luby(i: u64) -> u64 {
    // smallest k with i <= 2^k - 1
    let mut k = 1u32;
    while ((1u64 << k) - 1) < i {
        k += 1;
    }
    if i == (1u64 << k) - 1 {
        1u64 << (k - 1)
    } else {
        luby(i - ((1u64 << (k - 1)) - 1))
    }
}

/// Requests a restart of the search whenever the failures since the last
/// restart exhaust the schedule's current budget.
pub struct RestartMonitor {
    schedule: RestartSchedule,
    budget: u64,
    fails_since_restart: u64,
    restarts: u64,
}

impl RestartMonitor {
    pub fn new(schedule: RestartSchedule) -> Self {
        let mut m = RestartMonitor {
            schedule,
            budget: 0,
            fails_since_restart: 0,
            restarts: 0,
        };
        m.budget = m.budget_for(0);
        m
    }

    pub fn constant(budget: u64) -> Self {
        RestartMonitor::new(RestartSchedule::Constant(budget))
    }

    pub fn geometric(base: u64, factor: f64) -> Self {
        assert!(factor >= 1.0, "geometric restarts must not shrink");
        RestartMonitor::new(RestartSchedule::Geometric { base, factor })
    }

    pub fn luby(scale: u64) -> Self {
        RestartMonitor::new(RestartSchedule::Luby { scale })
    }

    fn budget_for(&self, restarts: u64) -> u64 {
        match self.schedule {
            RestartSchedule::Constant(budget) => budget.max(1),
            RestartSchedule::Geometric { base, factor } => {
                ((base.max(1) as f64) * factor.powi(restarts as i32)) as u64
            }
            RestartSchedule::Luby { scale } => scale.max(1) * luby(restarts + 1),
        }
    }
}

impl SearchMonitor for RestartMonitor {
    fn enter_search(&mut self, _state: &mut State) {
        self.fails_since_restart = 0;
        self.restarts = 0;
        self.budget = self.budget_for(0);
    }

    fn begin_fail(&mut self, _state: &mut State) {
        self.fails_since_restart += 1;
    }

    fn restart_search(&mut self, _state: &mut State) {
        self.restarts += 1;
        self.fails_since_restart = 0;
        self.budget = self.budget_for(self.restarts);
    }

    fn wants_restart(&self) -> bool {
        self.fails_since_restart >= self.budget
    }
}

/// Logs solutions and the final statistics through `tracing`.
#[derive(Default)]
pub struct SolutionLog {
    vars: Vec<VarRef>,
}

impl SolutionLog {
    pub fn new(vars: Vec<VarRef>) -> Self {
        SolutionLog { vars }
    }
}

impl SearchMonitor for SolutionLog {
    fn at_solution(&mut self, state: &State) -> bool {
        let values: Vec<(VarRef, IntCst, IntCst)> = self
            .vars
            .iter()
            .map(|&v| {
                let (lo, hi) = state.bounds(v);
                (v, lo, hi)
            })
            .collect();
        info!(?values, "solution");
        true
    }

    fn no_more_solutions(&mut self, _state: &mut State) {
        info!("search exhausted");
    }
}

/// Traces every search event through `tracing`, tagged with a prefix.
/// Purely observational; intended for debugging search strategies.
pub struct SearchTrace {
    prefix: String,
}

impl SearchTrace {
    pub fn new(prefix: impl Into<String>) -> Self {
        SearchTrace {
            prefix: prefix.into(),
        }
    }
}

impl SearchMonitor for SearchTrace {
    fn enter_search(&mut self, _state: &mut State) {
        info!(prefix = %self.prefix, "enter search");
    }

    fn restart_search(&mut self, _state: &mut State) {
        info!(prefix = %self.prefix, "restart search");
    }

    fn exit_search(&mut self, _state: &mut State) {
        info!(prefix = %self.prefix, "exit search");
    }

    fn end_next_decision(&mut self, _state: &mut State, decision: Option<&Decision>) {
        info!(prefix = %self.prefix, ?decision, "next decision");
    }

    fn apply_decision(&mut self, _state: &mut State, decision: &Decision) {
        info!(prefix = %self.prefix, ?decision, "apply");
    }

    fn refute_decision(&mut self, _state: &mut State, decision: &Decision) {
        info!(prefix = %self.prefix, ?decision, "refute");
    }

    fn begin_fail(&mut self, _state: &mut State) {
        info!(prefix = %self.prefix, "fail");
    }

    fn begin_initial_propagation(&mut self, _state: &mut State) {
        info!(prefix = %self.prefix, "initial propagation");
    }

    fn at_solution(&mut self, _state: &State) -> bool {
        info!(prefix = %self.prefix, "solution");
        true
    }

    fn no_more_solutions(&mut self, _state: &mut State) {
        info!(prefix = %self.prefix, "no more solutions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_triggers_on_failures() {
        let mut limit = SearchLimit::new().with_failures(3);
        let state = State::new();
        let mut stats = Stats::default();
        assert!(limit.periodic_check(&state, &stats));
        stats.failures = 3;
        assert!(!limit.periodic_check(&state, &stats));
        assert!(limit.crossed());
    }

    #[test]
    fn luby_sequence_prefix() {
        let prefix: Vec<u64> = (1..=15).map(luby).collect();
        assert_eq!(prefix, vec![1, 1, 2, 1, 1, 2, 4, 1, 1, 2, 1, 1, 2, 4, 8]);
    }

    #[test]
    fn restart_monitor_spends_its_failure_budget() {
        let mut s = State::new();
        let mut mon = RestartMonitor::geometric(2, 2.0);
        mon.enter_search(&mut s);
        assert!(!mon.wants_restart());
        mon.begin_fail(&mut s);
        mon.begin_fail(&mut s);
        assert!(mon.wants_restart());
        mon.restart_search(&mut s);
        assert!(!mon.wants_restart());
        // budget doubled: four failures now
        for _ in 0..3 {
            mon.begin_fail(&mut s);
        }
        assert!(!mon.wants_restart());
        mon.begin_fail(&mut s);
        assert!(mon.wants_restart());
    }

    #[test]
    fn objective_tightens_after_a_solution() {
        let mut s = State::new();
        let obj = s.new_var(0, 100);
        let mut mon = Objective::minimize(obj);
        assert!(mon.begin_next_decision(&mut s).is_ok());
        assert_eq!(s.bounds(obj), (0, 100));

        s.set_value(obj, 40).unwrap();
        assert!(mon.at_solution(&s));
        assert_eq!(mon.best(), Some(40));
    }

    #[test]
    fn objective_bound_prunes_or_fails() {
        let mut s = State::new();
        let obj = s.new_var(50, 100);
        let mut mon = Objective::minimize(obj);
        mon.best = Some(50);
        // obj <= 49 is impossible: the node fails
        assert!(mon.begin_next_decision(&mut s).is_err());
    }
}
