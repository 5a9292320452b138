//! `m == max(xs)` and `m == min(xs)` over variable arrays, bounds-consistent.

use crate::constraints::Constraint;
use crate::core::state::State;
use crate::core::{ConstraintId, DemonPriority, EmptyDomain, VarRef};

/// `target == max(vars)`.
pub struct MaxEq {
    target: VarRef,
    vars: Vec<VarRef>,
}

impl MaxEq {
    pub fn new(target: VarRef, vars: Vec<VarRef>) -> Self {
        assert!(!vars.is_empty(), "max over an empty array");
        MaxEq { target, vars }
    }
}

impl Constraint for MaxEq {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        let d = state.make_demon(id, 0, DemonPriority::Normal);
        state.when_range(self.target, d);
        for &v in &self.vars {
            state.when_range(v, d);
        }
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        let max_of_maxes = self.vars.iter().map(|&v| state.max(v)).max().unwrap();
        let max_of_mins = self.vars.iter().map(|&v| state.min(v)).max().unwrap();
        state.set_range(self.target, max_of_mins, max_of_maxes)?;
        let tmax = state.max(self.target);
        let tmin = state.min(self.target);
        for &v in &self.vars {
            state.set_max(v, tmax)?;
        }
        // if a single variable can still reach the target's minimum, it must
        let mut candidate = None;
        for &v in &self.vars {
            if state.max(v) >= tmin {
                candidate = match candidate {
                    None => Some(v),
                    Some(_) => return Ok(()),
                };
            }
        }
        if let Some(v) = candidate {
            state.set_min(v, tmin)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "max-eq"
    }
}

/// `target == min(vars)`.
pub struct MinEq {
    target: VarRef,
    vars: Vec<VarRef>,
}

impl MinEq {
    pub fn new(target: VarRef, vars: Vec<VarRef>) -> Self {
        assert!(!vars.is_empty(), "min over an empty array");
        MinEq { target, vars }
    }
}

impl Constraint for MinEq {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        let d = state.make_demon(id, 0, DemonPriority::Normal);
        state.when_range(self.target, d);
        for &v in &self.vars {
            state.when_range(v, d);
        }
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        let min_of_mins = self.vars.iter().map(|&v| state.min(v)).min().unwrap();
        let min_of_maxes = self.vars.iter().map(|&v| state.max(v)).min().unwrap();
        state.set_range(self.target, min_of_mins, min_of_maxes)?;
        let tmax = state.max(self.target);
        let tmin = state.min(self.target);
        for &v in &self.vars {
            state.set_min(v, tmin)?;
        }
        let mut candidate = None;
        for &v in &self.vars {
            if state.min(v) <= tmax {
                candidate = match candidate {
                    None => Some(v),
                    Some(_) => return Ok(()),
                };
            }
        }
        if let Some(v) = candidate {
            state.set_max(v, tmax)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "min-eq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixpoint(state: &mut State, c: &mut dyn Constraint) -> Result<(), EmptyDomain> {
        loop {
            c.initial_propagate(state)?;
            if state.next_demon().is_none() {
                return Ok(());
            }
        }
    }

    #[test]
    fn max_bounds_flow_both_ways() {
        let mut s = State::new();
        let m = s.new_var(0, 100);
        let a = s.new_var(2, 7);
        let b = s.new_var(0, 5);
        let mut c = MaxEq::new(m, vec![a, b]);
        c.post(&mut s, ConstraintId::from_u32(0));
        fixpoint(&mut s, &mut c).unwrap();
        assert_eq!(s.bounds(m), (2, 7));
        s.set_max(m, 4).unwrap();
        fixpoint(&mut s, &mut c).unwrap();
        assert_eq!(s.bounds(a), (2, 4));
        assert_eq!(s.bounds(b), (0, 4));
    }

    #[test]
    fn max_pins_the_only_candidate() {
        let mut s = State::new();
        let m = s.new_var(6, 7);
        let a = s.new_var(0, 9);
        let b = s.new_var(0, 5);
        let mut c = MaxEq::new(m, vec![a, b]);
        c.post(&mut s, ConstraintId::from_u32(0));
        fixpoint(&mut s, &mut c).unwrap();
        // only `a` can reach 6, so it must
        assert_eq!(s.bounds(a), (6, 7));
    }

    #[test]
    fn min_is_the_mirror_image() {
        let mut s = State::new();
        let m = s.new_var(-100, 100);
        let a = s.new_var(2, 7);
        let b = s.new_var(4, 9);
        let mut c = MinEq::new(m, vec![a, b]);
        c.post(&mut s, ConstraintId::from_u32(0));
        fixpoint(&mut s, &mut c).unwrap();
        assert_eq!(s.bounds(m), (2, 7));
        s.set_min(m, 5).unwrap();
        fixpoint(&mut s, &mut c).unwrap();
        assert_eq!(s.bounds(a), (5, 7));
        assert_eq!(s.bounds(b), (5, 9));
    }

    #[test]
    fn infeasible_target_fails() {
        let mut s = State::new();
        let m = s.new_var(20, 30);
        let a = s.new_var(0, 5);
        let b = s.new_var(0, 5);
        let mut c = MaxEq::new(m, vec![a, b]);
        c.post(&mut s, ConstraintId::from_u32(0));
        assert!(fixpoint(&mut s, &mut c).is_err());
    }
}
