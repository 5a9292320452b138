//! Scheduling-oriented branching: fix interval start times in
//! earliest-start-time order.

use crate::core::state::State;
use crate::core::IntervalRef;
use crate::solver::search::{Decision, DecisionBuilder};

/// Branches on the start variable of the unscheduled interval with the
/// earliest possible start, trying that earliest time first. Intervals that
/// cannot be performed are skipped; optional intervals are scheduled as if
/// performed, their status being settled by propagation or other builders.
pub struct EstBuilder {
    intervals: Vec<IntervalRef>,
}

impl EstBuilder {
    pub fn new(intervals: Vec<IntervalRef>) -> Self {
        EstBuilder { intervals }
    }
}

impl DecisionBuilder for EstBuilder {
    fn next(&mut self, state: &mut State) -> Option<Decision> {
        let mut best: Option<(IntervalRef, i64)> = None;
        for &i in &self.intervals {
            if state.cannot_be_performed(i) {
                continue;
            }
            let start = state.interval_parts(i).start;
            if state.bound(start) {
                continue;
            }
            let est = state.min(start);
            let better = match best {
                None => true,
                Some((_, b)) => est < b,
            };
            if better {
                best = Some((i, est));
            }
        }
        best.map(|(i, est)| Decision::TryValue {
            var: state.interval_parts(i).start,
            value: est,
        })
    }

    fn name(&self) -> &str {
        "est"
    }
}
