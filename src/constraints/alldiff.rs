//! All-different over an array of variables, value-consistent form: once a
//! variable is bound its value is removed from every other domain.

use crate::constraints::Constraint;
use crate::core::state::State;
use crate::core::{ConstraintId, DemonPriority, EmptyDomain, VarRef};

pub struct AllDifferent {
    vars: Vec<VarRef>,
}

impl AllDifferent {
    pub fn new(vars: Vec<VarRef>) -> Self {
        AllDifferent { vars }
    }

    fn propagate_one(&self, state: &mut State, index: usize) -> Result<(), EmptyDomain> {
        let bound = self.vars[index];
        if !state.bound(bound) {
            return Ok(());
        }
        let value = state.value(bound);
        for (j, &other) in self.vars.iter().enumerate() {
            if j != index {
                state.remove_value(other, value)?;
            }
        }
        Ok(())
    }
}

impl Constraint for AllDifferent {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        // one demon per variable so only the freshly bound one re-propagates
        for (i, &v) in self.vars.iter().enumerate() {
            let d = state.make_demon(id, i as u32, DemonPriority::Normal);
            state.when_bound(v, d);
        }
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        for i in 0..self.vars.len() {
            self.propagate_one(state, i)?;
        }
        Ok(())
    }

    fn propagate(&mut self, state: &mut State, tag: u32) -> Result<(), EmptyDomain> {
        self.propagate_one(state, tag as usize)
    }

    fn name(&self) -> &str {
        "all-different"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_value_is_removed_from_the_others() {
        let mut s = State::new();
        let vars: Vec<VarRef> = (0..3).map(|_| s.new_var(1, 3)).collect();
        let mut c = AllDifferent::new(vars.clone());
        c.post(&mut s, ConstraintId::from_u32(0));
        s.set_value(vars[0], 2).unwrap();
        c.propagate(&mut s, 0).unwrap();
        assert!(!s.contains(vars[1], 2));
        assert!(!s.contains(vars[2], 2));
        assert_eq!(s.size(vars[1]), 2);
    }

    #[test]
    fn pigeonhole_collapse_fails() {
        let mut s = State::new();
        let vars: Vec<VarRef> = (0..3).map(|_| s.new_var(1, 2)).collect();
        let mut c = AllDifferent::new(vars.clone());
        c.post(&mut s, ConstraintId::from_u32(0));
        s.set_value(vars[0], 1).unwrap();
        s.set_value(vars[1], 2).unwrap();
        let r = c
            .propagate(&mut s, 0)
            .and_then(|_| c.propagate(&mut s, 1));
        assert!(r.is_err());
    }

    #[test]
    fn initial_propagation_handles_pre_bound_vars() {
        let mut s = State::new();
        let a = s.new_var(5, 5);
        let b = s.new_var(4, 6);
        let mut c = AllDifferent::new(vec![a, b]);
        c.post(&mut s, ConstraintId::from_u32(0));
        c.initial_propagate(&mut s).unwrap();
        assert_eq!(s.domain_iter(b).collect::<Vec<_>>(), vec![4, 6]);
    }
}
