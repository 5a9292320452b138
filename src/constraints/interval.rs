//! Structural constraint of interval variables.

use crate::constraints::Constraint;
use crate::core::state::State;
use crate::core::{sat_add, sat_sub, ConstraintId, DemonPriority, EmptyDomain, IntervalRef};

/// Maintains `start + duration = end` (in saturating arithmetic) on one
/// interval. Posted automatically when the interval is created.
///
/// While the performed status is open, a wipeout decides that the interval is
/// not performed instead of failing; once it must be performed, wipeouts are
/// ordinary failures. A cannot-be-performed interval is left alone.
pub struct IntervalLink {
    interval: IntervalRef,
}

impl IntervalLink {
    pub fn new(interval: IntervalRef) -> Self {
        IntervalLink { interval }
    }
}

impl Constraint for IntervalLink {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        let d = state.make_demon(id, 0, DemonPriority::Normal);
        state.when_interval_changed(self.interval, d);
        state.when_performed(self.interval, d);
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        let i = self.interval;
        let parts = state.interval_parts(i);
        let mut changed = true;
        while changed && state.may_be_performed(i) {
            changed = false;
            let (smin, smax) = state.bounds(parts.start);
            let (dmin, dmax) = state.bounds(parts.duration);
            let (emin, emax) = state.bounds(parts.end);
            changed |= state.set_interval_end_min(i, sat_add(smin, dmin))?;
            changed |= state.set_interval_end_max(i, sat_add(smax, dmax))?;
            changed |= state.set_interval_start_min(i, sat_sub(emin, dmax))?;
            changed |= state.set_interval_start_max(i, sat_sub(emax, dmin))?;
            changed |= state.set_interval_duration_min(i, sat_sub(emin, smax))?;
            changed |= state.set_interval_duration_max(i, sat_sub(emax, smin))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "interval-link"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MAX_VALID_VALUE, MIN_VALID_VALUE};

    fn fixpoint(state: &mut State, c: &mut dyn Constraint) -> Result<(), EmptyDomain> {
        loop {
            c.initial_propagate(state)?;
            if state.next_demon().is_none() {
                return Ok(());
            }
        }
    }

    #[test]
    fn end_window_tightens_start() {
        let mut s = State::new();
        let i = s.new_interval(0, 10, 5, false);
        let mut link = IntervalLink::new(i);
        link.post(&mut s, ConstraintId::from_u32(0));
        s.set_interval_end_max(i, 7).unwrap();
        fixpoint(&mut s, &mut link).unwrap();
        assert_eq!(s.interval_start_min(i), 0);
        assert_eq!(s.interval_start_max(i), 2);
        assert_eq!(s.interval_end_min(i), 5);
    }

    #[test]
    fn optional_interval_tightens_once_performed() {
        let mut s = State::new();
        let i = s.new_interval(0, 10, 5, true);
        let mut link = IntervalLink::new(i);
        link.post(&mut s, ConstraintId::from_u32(0));
        s.set_interval_end_max(i, 7).unwrap();
        s.set_performed(i, true).unwrap();
        fixpoint(&mut s, &mut link).unwrap();
        assert_eq!(s.interval_start_max(i), 2);
    }

    #[test]
    fn impossible_optional_interval_is_unperformed_not_failed() {
        let mut s = State::new();
        let i = s.new_interval(6, 10, 5, true);
        let mut link = IntervalLink::new(i);
        link.post(&mut s, ConstraintId::from_u32(0));
        // end must be in [11, 15]; capping it below start+duration is a
        // contradiction for a performed interval
        s.set_interval_end_max(i, 8).unwrap();
        fixpoint(&mut s, &mut link).unwrap();
        assert!(s.cannot_be_performed(i));
        assert_eq!(s.interval_start_min(i), MIN_VALID_VALUE);
        assert_eq!(s.interval_start_max(i), MAX_VALID_VALUE);
    }

    #[test]
    fn impossible_mandatory_interval_fails() {
        let mut s = State::new();
        let i = s.new_interval(6, 10, 5, false);
        let mut link = IntervalLink::new(i);
        link.post(&mut s, ConstraintId::from_u32(0));
        assert!(s.set_interval_end_max(i, 8).is_err());
    }
}
