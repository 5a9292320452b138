//! The search driver: tree walk alternating decision, propagation to
//! fixpoint and backtracking.

pub mod collector;
pub mod monitor;
pub mod parallel;
pub mod search;
pub mod stats;

use crate::backtrack::{RevInt, TrailLoc};
use crate::constraints::interval::IntervalLink;
use crate::constraints::Constraint;
use crate::core::state::{Assignment, State};
use crate::core::{ConstraintId, DemonPriority, EmptyDomain, IntCst, IntervalRef, ModelError, VarRef};
use crate::solver::monitor::SearchMonitor;
use crate::solver::search::{Decision, DecisionBuilder, RestoreAssignment};
use crate::solver::stats::Stats;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Demon executions between two periodic monitor checks.
const PERIODIC_CHECK_INTERVAL: u64 = 1_000;

/// State of the solver with respect to the search.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SolverState {
    OutsideSearch,
    InSearch,
    AtSolution,
    NoMoreSolutions,
    Infeasible,
}

/// Internal escape of the driver: a plain search failure (recovered by
/// backtracking) or a limit (refused like a fail whose refutation also
/// fails).
enum Stop {
    Fail(EmptyDomain),
    Limit,
}

/// One branch currently open on the search path. Both the left (apply) and
/// right (refute) branches push their own trail marker.
struct Frame {
    marker: TrailLoc,
    decision: Decision,
    refuted: bool,
}

/// Bookkeeping of one (possibly nested) search.
struct SearchCtx {
    /// Trail position before the search touched anything; popped when the
    /// search ends.
    search_root: TrailLoc,
    /// Trail position after the root propagation; restarts come back here.
    restart_root: Option<TrailLoc>,
    frames: Vec<Frame>,
    db: Box<dyn DecisionBuilder>,
    /// Raised when an `at_solution` monitor asked to finish the search.
    finish_after_solution: bool,
}

/// Handle raising the cross-thread interruption flag of one solver. The flag
/// is the only member of a solver that may be touched from another thread.
#[derive(Clone)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt_solve(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// A constraint solver: the model builder, the reversible state and the
/// search driver in one object. Not internally parallel; parallelism runs
/// across independent `Solver` instances (see [`crate::solver::parallel`]).
pub struct Solver {
    pub state: State,
    constraints: Vec<Box<dyn Constraint>>,
    /// Reversible count of posted constraints; constraints added inside a
    /// branch disappear on backtrack.
    n_constraints: RevInt,
    monitors: Vec<Rc<RefCell<dyn SearchMonitor>>>,
    searches: Vec<SearchCtx>,
    pub stats: Stats,
    status: SolverState,
    limit: bool,
    ever_searched: bool,
    /// Failure raised outside the fixpoint loop (mid-branch constraint
    /// posting); consumed by the next propagation.
    pending_fail: Option<EmptyDomain>,
    interrupt: Arc<AtomicBool>,
    periodic_countdown: u64,
}

impl Default for Solver {
    fn default() -> Self {
        Solver::new()
    }
}

impl Solver {
    pub fn new() -> Self {
        let mut state = State::new();
        let n_constraints = state.new_rev(0);
        Solver {
            state,
            constraints: Vec::new(),
            n_constraints,
            monitors: Vec::new(),
            searches: Vec::new(),
            stats: Stats::default(),
            status: SolverState::OutsideSearch,
            limit: false,
            ever_searched: false,
            pending_fail: None,
            interrupt: Arc::new(AtomicBool::new(false)),
            periodic_countdown: PERIODIC_CHECK_INTERVAL,
        }
    }

    // ---------- model building ----------

    pub fn new_int_var(&mut self, lb: IntCst, ub: IntCst) -> VarRef {
        self.state.new_var(lb, ub)
    }

    pub fn new_int_var_from_set(&mut self, values: &[IntCst]) -> Result<VarRef, ModelError> {
        self.state.new_var_from_set(values)
    }

    pub fn new_bool_var(&mut self) -> VarRef {
        self.state.new_var(0, 1)
    }

    pub fn new_int_const(&mut self, value: IntCst) -> VarRef {
        self.state.new_var(value, value)
    }

    /// Creates a fixed-duration interval and posts its structural link
    /// `start + duration = end`.
    pub fn new_interval_var(
        &mut self,
        start_min: IntCst,
        start_max: IntCst,
        duration: IntCst,
        optional: bool,
    ) -> IntervalRef {
        let interval = self.state.new_interval(start_min, start_max, duration, optional);
        self.add_constraint(IntervalLink::new(interval));
        interval
    }

    /// Appends a constraint to the model and posts its demons. Before any
    /// search, the initial propagation is deferred to `new_search`; inside a
    /// branch the constraint propagates on the spot and is undone on
    /// backtrack. Adding at the root once a search has started is a
    /// programming error.
    pub fn add_constraint<C: Constraint + 'static>(&mut self, c: C) -> ConstraintId {
        self.add_constraint_boxed(Box::new(c))
    }

    pub fn add_constraint_boxed(&mut self, mut c: Box<dyn Constraint>) -> ConstraintId {
        let in_search = !self.searches.is_empty();
        assert!(
            in_search || !self.ever_searched,
            "constraints cannot be added at the root once a search has started"
        );
        let idx = self.state.rev_value(self.n_constraints) as usize;
        let id = ConstraintId::from(idx);
        c.post(&mut self.state, id);
        if idx < self.constraints.len() {
            self.constraints[idx] = c;
        } else {
            self.constraints.push(c);
        }
        let n_constraints = self.n_constraints;
        self.state.set_rev(n_constraints, idx as i64 + 1);
        if in_search {
            let r = {
                let Solver { constraints, state, .. } = self;
                constraints[idx].initial_propagate(state)
            };
            if let Err(e) = r {
                self.pending_fail = Some(e);
            }
        }
        id
    }

    pub fn num_constraints(&self) -> usize {
        self.state.rev_value(self.n_constraints) as usize
    }

    /// Registers a search monitor. Monitors persist across searches and are
    /// notified in registration order; keep a clone of the `Rc` to query the
    /// monitor afterwards.
    pub fn add_monitor(&mut self, monitor: Rc<RefCell<dyn SearchMonitor>>) {
        self.monitors.push(monitor);
    }

    // ---------- counters and status ----------

    pub fn status(&self) -> SolverState {
        self.status
    }

    pub fn branches(&self) -> u64 {
        self.stats.branches
    }

    pub fn failures(&self) -> u64 {
        self.stats.failures
    }

    pub fn solutions(&self) -> u64 {
        self.stats.solutions
    }

    pub fn demon_runs(&self, priority: DemonPriority) -> u64 {
        self.stats.demon_runs[priority.index()]
    }

    pub fn wall_time_ms(&self) -> u64 {
        self.stats.wall_time_ms()
    }

    pub fn stamp(&self) -> u64 {
        self.state.stamp()
    }

    pub fn fail_stamp(&self) -> u64 {
        self.state.fail_stamp()
    }

    /// Whether the last search stopped on a limit (or interruption) rather
    /// than exhaustion.
    pub fn limit_reached(&self) -> bool {
        self.limit
    }

    /// Markers pushed since the root of the current search.
    pub fn search_depth(&self) -> usize {
        self.searches.last().map(|s| s.frames.len()).unwrap_or(0)
    }

    /// Nesting depth of active searches.
    pub fn solve_depth(&self) -> usize {
        self.searches.len()
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(Arc::clone(&self.interrupt))
    }

    /// Uniform draw in `[0, n)` from the solver-owned deterministic source.
    pub fn rand64(&mut self, n: u64) -> u64 {
        self.state.rand64(n)
    }

    // ---------- search ----------

    /// Opens a decomposed search: `new_search`, then `next_solution` until it
    /// returns `false`, then `end_search`.
    pub fn new_search(&mut self, db: Box<dyn DecisionBuilder>) {
        assert!(
            self.searches.is_empty(),
            "a search is already active; use nested_solve"
        );
        self.interrupt.store(false, Ordering::Relaxed);
        self.begin_search(db, true);
    }

    /// Moves to the next solution; `false` on exhaustion, infeasibility or
    /// limit. At a solution the state holds the solution domains; they are
    /// backtracked by the following call.
    pub fn next_solution(&mut self) -> bool {
        assert!(
            !self.searches.is_empty(),
            "next_solution called without new_search"
        );
        match self.status {
            SolverState::NoMoreSolutions | SolverState::Infeasible => return false,
            _ => {}
        }
        if self.limit {
            return false;
        }
        if self.status == SolverState::AtSolution {
            // leave the solution: forced backtrack past the deepest decision
            let finish = self.searches.last().unwrap().finish_after_solution;
            self.note_fail();
            if finish || !self.backtrack() {
                self.set_no_more();
                return false;
            }
        }
        self.status = SolverState::InSearch;
        loop {
            if !self.run_periodic_checks() {
                return false;
            }
            if self.monitors.iter().any(|m| m.borrow().wants_restart()) {
                self.restart_search();
            }
            // monitors may prune the node (objective bound)
            let pruned = {
                let Solver { monitors, state, .. } = self;
                let mut pruned = None;
                for m in monitors.iter() {
                    if let Err(e) = m.borrow_mut().begin_next_decision(state) {
                        pruned = Some(e);
                        break;
                    }
                }
                pruned
            };
            if let Some(e) = pruned {
                self.pending_fail = Some(e);
            }
            match self.propagate_queue() {
                Ok(()) => {}
                Err(Stop::Limit) => return false,
                Err(Stop::Fail(_)) => {
                    if self.backtrack() {
                        continue;
                    }
                    self.set_no_more();
                    return false;
                }
            }
            let decision = {
                let Solver { searches, state, .. } = self;
                searches.last_mut().unwrap().db.next(state)
            };
            self.notify(|m, s| m.end_next_decision(s, decision.as_ref()));
            // the builder itself may have touched domains
            match self.propagate_queue() {
                Ok(()) => {}
                Err(Stop::Limit) => return false,
                Err(Stop::Fail(_)) => {
                    if self.backtrack() {
                        continue;
                    }
                    self.set_no_more();
                    return false;
                }
            }
            match decision {
                None => {
                    let accepted = {
                        let Solver { monitors, state, .. } = self;
                        let mut accepted = true;
                        for m in monitors.iter() {
                            if !m.borrow_mut().accept_solution(state) {
                                accepted = false;
                            }
                        }
                        accepted
                    };
                    if !accepted {
                        trace!("solution rejected by monitors");
                        self.note_fail();
                        if self.backtrack() {
                            continue;
                        }
                        self.set_no_more();
                        return false;
                    }
                    self.stats.solutions += 1;
                    debug!(depth = self.search_depth(), "solution found");
                    let resume = {
                        let Solver { monitors, state, .. } = self;
                        let mut resume = true;
                        for m in monitors.iter() {
                            if !m.borrow_mut().at_solution(state) {
                                resume = false;
                            }
                        }
                        resume
                    };
                    self.searches.last_mut().unwrap().finish_after_solution = !resume;
                    self.status = SolverState::AtSolution;
                    return true;
                }
                Some(d) => {
                    self.stats.branches += 1;
                    let marker = self.state.push_marker();
                    self.notify(|m, s| m.apply_decision(s, &d));
                    trace!(decision = ?d, "apply");
                    let applied = match d.apply(&mut self.state) {
                        Err(e) => {
                            self.note_fail();
                            Err(Stop::Fail(e))
                        }
                        Ok(_) => self.propagate_queue(),
                    };
                    self.searches.last_mut().unwrap().frames.push(Frame {
                        marker,
                        decision: d,
                        refuted: false,
                    });
                    match applied {
                        Ok(()) => {}
                        Err(Stop::Limit) => return false,
                        Err(Stop::Fail(_)) => {
                            if !self.backtrack() {
                                self.set_no_more();
                                return false;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Closes the decomposed search and backtracks the model to its
    /// pre-search state.
    pub fn end_search(&mut self) {
        assert_eq!(self.searches.len(), 1, "end_search without an active top-level search");
        let ctx = self.searches.pop().unwrap();
        self.state.pop_to(ctx.search_root);
        self.sync_constraints();
        if !self.state.queue.is_empty() {
            self.state.queue.clear();
        }
        self.state.end_sweep();
        self.notify(|m, s| m.exit_search(s));
        self.status = SolverState::OutsideSearch;
        debug!(stats = %self.stats, "search ended");
    }

    /// Top-level solve: `true` iff a solution was found. The search is
    /// backtracked on exit; use monitors or assignments to keep solutions.
    pub fn solve(&mut self, db: Box<dyn DecisionBuilder>) -> bool {
        self.new_search(db);
        let found = self.next_solution();
        self.end_search();
        found
    }

    /// Runs a full search within the current propagation state. With
    /// `restore`, the outer state is left bit-identical whatever the outcome;
    /// without it, a found solution's domains are kept.
    pub fn nested_solve(&mut self, db: Box<dyn DecisionBuilder>, restore: bool) -> bool {
        let standalone = self.searches.is_empty();
        let saved_status = self.status;
        self.begin_search(db, standalone);
        let found = if self.status == SolverState::Infeasible {
            false
        } else {
            self.next_solution()
        };
        let ctx = self.searches.pop().unwrap();
        if restore || !found {
            self.state.pop_to(ctx.search_root);
            self.sync_constraints();
            if !self.state.queue.is_empty() {
                self.state.queue.clear();
            }
            self.state.end_sweep();
        }
        self.status = saved_status;
        found
    }

    /// Validates an assignment against the model without disturbing the
    /// current state.
    pub fn check_assignment(&mut self, assignment: &Assignment) -> bool {
        self.nested_solve(Box::new(RestoreAssignment::new(assignment.clone())), true)
    }

    /// Pops the current search back to its post-root-propagation state.
    pub fn restart_search(&mut self) {
        let root = match self.searches.last() {
            Some(ctx) => match ctx.restart_root {
                Some(root) => root,
                None => return,
            },
            None => return,
        };
        self.searches.last_mut().unwrap().frames.clear();
        self.state.pop_to(root);
        self.sync_constraints();
        if !self.state.queue.is_empty() {
            self.state.queue.clear();
        }
        self.state.end_sweep();
        self.stats.restarts += 1;
        self.status = SolverState::InSearch;
        debug!("search restarted");
        self.notify(|m, s| m.restart_search(s));
    }

    /// Runs the queue to fixpoint from outside the search machinery.
    /// Consistent propagation returns `Ok`; a limit interruption also
    /// returns `Ok` and raises the limit flag.
    pub fn propagate(&mut self) -> Result<(), EmptyDomain> {
        match self.propagate_queue() {
            Ok(()) => Ok(()),
            Err(Stop::Limit) => Ok(()),
            Err(Stop::Fail(e)) => Err(e),
        }
    }

    // ---------- driver internals ----------

    fn begin_search(&mut self, db: Box<dyn DecisionBuilder>, initial: bool) {
        self.stats.start_clock();
        self.limit = false;
        let search_root = self.state.push_marker();
        self.searches.push(SearchCtx {
            search_root,
            restart_root: None,
            frames: Vec::new(),
            db,
            finish_after_solution: false,
        });
        self.status = SolverState::InSearch;
        self.notify(|m, s| m.enter_search(s));
        debug!(nested = self.searches.len() > 1, "search started");
        let r = if initial {
            self.ever_searched = true;
            self.notify(|m, s| m.begin_initial_propagation(s));
            let r = self.initial_propagate_all();
            self.notify(|m, s| m.end_initial_propagation(s));
            r
        } else {
            self.propagate_queue()
        };
        match r {
            Ok(()) => {
                let loc = self.state.trail.loc();
                self.searches.last_mut().unwrap().restart_root = Some(loc);
            }
            Err(Stop::Limit) => {}
            Err(Stop::Fail(_)) => {
                debug!("model infeasible at the root");
                self.status = SolverState::Infeasible;
            }
        }
    }

    fn initial_propagate_all(&mut self) -> Result<(), Stop> {
        let n = self.state.rev_value(self.n_constraints) as usize;
        for i in 0..n {
            let r = {
                let Solver { constraints, state, .. } = self;
                constraints[i].initial_propagate(state)
            };
            if let Err(e) = r {
                self.note_fail();
                return Err(Stop::Fail(e));
            }
            self.propagate_queue()?;
        }
        self.propagate_queue()
    }

    /// Processes pending demons until all three buckets are empty, the
    /// propagation fails, or a limit fires.
    fn propagate_queue(&mut self) -> Result<(), Stop> {
        if let Some(e) = self.pending_fail.take() {
            self.note_fail();
            return Err(Stop::Fail(e));
        }
        if self.state.queue.frozen() {
            return Ok(());
        }
        loop {
            if self.periodic_countdown == 0 {
                self.periodic_countdown = PERIODIC_CHECK_INTERVAL;
                if !self.run_periodic_checks() {
                    return Err(Stop::Limit);
                }
            }
            let Some((priority, d)) = self.state.next_demon() else {
                break;
            };
            self.periodic_countdown = self.periodic_countdown.saturating_sub(1);
            self.stats.demon_runs[priority.index()] += 1;
            let (cid, tag) = self.state.demon_target(d);
            let r = {
                let Solver { constraints, state, .. } = self;
                constraints[usize::from(cid)].propagate(state, tag)
            };
            if let Err(e) = r {
                trace!(constraint = self.constraints[usize::from(cid)].name(), "propagation failed");
                self.note_fail();
                return Err(Stop::Fail(e));
            }
        }
        self.state.queue.bump_stamp();
        self.state.end_sweep();
        Ok(())
    }

    /// Undoes branches until an untried right branch survives propagation.
    /// `false` when the current search is exhausted (or a limit fired).
    fn backtrack(&mut self) -> bool {
        loop {
            let frame = match self.searches.last_mut().unwrap().frames.pop() {
                Some(frame) => frame,
                None => return false,
            };
            self.state.pop_to(frame.marker);
            self.sync_constraints();
            self.notify(|m, s| m.end_fail(s));
            if frame.refuted {
                // both branches dead: the failure propagates up
                continue;
            }
            self.stats.branches += 1;
            let marker = self.state.push_marker();
            self.notify(|m, s| m.refute_decision(s, &frame.decision));
            trace!(decision = ?frame.decision, "refute");
            let refuted = match frame.decision.refute(&mut self.state) {
                Err(e) => {
                    self.note_fail();
                    Err(Stop::Fail(e))
                }
                Ok(_) => self.propagate_queue(),
            };
            self.searches.last_mut().unwrap().frames.push(Frame {
                marker,
                decision: frame.decision,
                refuted: true,
            });
            match refuted {
                Ok(()) => return true,
                Err(Stop::Limit) => return false,
                Err(Stop::Fail(_)) => {}
            }
        }
    }

    /// Failure bookkeeping: counter, monitors, fail action, queue flush. Any
    /// deferred failure of the node is subsumed by the one handled here.
    fn note_fail(&mut self) {
        self.pending_fail = None;
        self.stats.failures += 1;
        self.notify(|m, s| m.begin_fail(s));
        self.state.unwind_fail();
    }

    fn set_no_more(&mut self) {
        if !self.limit {
            self.status = SolverState::NoMoreSolutions;
            self.notify(|m, s| m.no_more_solutions(s));
        }
    }

    fn run_periodic_checks(&mut self) -> bool {
        if self.interrupt.load(Ordering::Relaxed) {
            self.limit = true;
            return false;
        }
        let ok = {
            let Solver { monitors, state, stats, .. } = self;
            let mut ok = true;
            for m in monitors.iter() {
                if !m.borrow_mut().periodic_check(state, stats) {
                    ok = false;
                }
            }
            ok
        };
        if !ok {
            self.limit = true;
        }
        ok
    }

    /// Re-aligns the constraint store with its reversible length after a
    /// backtrack, dropping constraints posted in popped branches.
    fn sync_constraints(&mut self) {
        let n = self.state.rev_value(self.n_constraints) as usize;
        self.constraints.truncate(n);
    }

    fn notify<F: FnMut(&mut dyn SearchMonitor, &mut State)>(&mut self, mut f: F) {
        let Solver { monitors, state, .. } = self;
        for m in monitors.iter() {
            f(&mut *m.borrow_mut(), state);
        }
    }
}
