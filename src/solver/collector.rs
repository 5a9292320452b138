//! Solution collectors: monitors that snapshot solutions as the search
//! visits them, since the driver backtracks solutions away.

use crate::core::state::{Assignment, State};
use crate::core::{IntCst, VarRef};
use crate::solver::monitor::SearchMonitor;

/// Which solutions the collector keeps.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CollectMode {
    /// Only the first solution of the search.
    First,
    /// Only the most recent solution.
    Last,
    /// Every solution, in the order they were found.
    All,
}

/// Snapshots the watched variables at each accepted solution.
pub struct SolutionCollector {
    vars: Vec<VarRef>,
    mode: CollectMode,
    solutions: Vec<Assignment>,
}

impl SolutionCollector {
    pub fn new(vars: Vec<VarRef>, mode: CollectMode) -> Self {
        SolutionCollector {
            vars,
            mode,
            solutions: Vec::new(),
        }
    }

    pub fn first_solution(vars: Vec<VarRef>) -> Self {
        SolutionCollector::new(vars, CollectMode::First)
    }

    pub fn last_solution(vars: Vec<VarRef>) -> Self {
        SolutionCollector::new(vars, CollectMode::Last)
    }

    pub fn all_solutions(vars: Vec<VarRef>) -> Self {
        SolutionCollector::new(vars, CollectMode::All)
    }

    pub fn solution_count(&self) -> usize {
        self.solutions.len()
    }

    pub fn solution(&self, i: usize) -> &Assignment {
        &self.solutions[i]
    }

    pub fn solutions(&self) -> &[Assignment] {
        &self.solutions
    }

    pub fn last(&self) -> Option<&Assignment> {
        self.solutions.last()
    }

    /// Value of `var` in the `i`-th kept solution. Panics if the solution
    /// does not bind the variable.
    pub fn value(&self, i: usize, var: VarRef) -> IntCst {
        self.solutions[i]
            .value_of(var)
            .expect("variable unbound in the collected solution")
    }
}

impl SearchMonitor for SolutionCollector {
    fn enter_search(&mut self, _state: &mut State) {
        self.solutions.clear();
    }

    fn at_solution(&mut self, state: &State) -> bool {
        let snapshot = Assignment::save(state, &self.vars);
        match self.mode {
            CollectMode::First => {
                if self.solutions.is_empty() {
                    self.solutions.push(snapshot);
                }
            }
            CollectMode::Last => {
                self.solutions.clear();
                self.solutions.push(snapshot);
            }
            CollectMode::All => self.solutions.push(snapshot),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::range::Ne;
    use crate::solver::search::VarValueBuilder;
    use crate::solver::Solver;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn collects_all_solutions() {
        let mut solver = Solver::new();
        let x = solver.new_int_var(1, 3);
        let y = solver.new_int_var(1, 3);
        solver.add_constraint(Ne::new(x, y, 0));
        let collector = Rc::new(RefCell::new(SolutionCollector::all_solutions(vec![x, y])));
        solver.add_monitor(collector.clone());

        solver.new_search(Box::new(VarValueBuilder::first_unbound_min(vec![x, y])));
        while solver.next_solution() {}
        solver.end_search();

        let collector = collector.borrow();
        assert_eq!(collector.solution_count(), 6);
        assert_eq!(collector.value(0, x), 1);
        assert_eq!(collector.value(0, y), 2);
        assert_eq!(collector.value(5, x), 3);
        assert_eq!(collector.value(5, y), 2);
    }

    #[test]
    fn first_and_last_modes() {
        let mut solver = Solver::new();
        let x = solver.new_int_var(1, 3);
        let first = Rc::new(RefCell::new(SolutionCollector::first_solution(vec![x])));
        let last = Rc::new(RefCell::new(SolutionCollector::last_solution(vec![x])));
        solver.add_monitor(first.clone());
        solver.add_monitor(last.clone());

        solver.new_search(Box::new(VarValueBuilder::first_unbound_min(vec![x])));
        while solver.next_solution() {}
        solver.end_search();

        assert_eq!(first.borrow().solution_count(), 1);
        assert_eq!(first.borrow().value(0, x), 1);
        assert_eq!(last.borrow().solution_count(), 1);
        assert_eq!(last.borrow().value(0, x), 3);
    }

    #[test]
    fn collected_snapshots_validate_against_the_model() {
        let mut solver = Solver::new();
        let x = solver.new_int_var(1, 3);
        let y = solver.new_int_var(1, 3);
        solver.add_constraint(Ne::new(x, y, 0));
        let collector = Rc::new(RefCell::new(SolutionCollector::first_solution(vec![x, y])));
        solver.add_monitor(collector.clone());

        solver.new_search(Box::new(VarValueBuilder::first_unbound_min(vec![x, y])));
        assert!(solver.next_solution());
        solver.end_search();

        let snapshot = collector.borrow().solution(0).clone();
        assert!(solver.check_assignment(&snapshot));
    }
}
