//! Reified variable-against-constant relations: a 0/1 variable mirrors the
//! truth of the relation, and deciding either side propagates the other.

use crate::constraints::Constraint;
use crate::core::state::State;
use crate::core::{ConstraintId, DemonPriority, EmptyDomain, IntCst, VarRef};

/// `b == 1  <=>  x == value`, with `b` a 0/1 variable.
pub struct IsEqCst {
    b: VarRef,
    x: VarRef,
    value: IntCst,
}

impl IsEqCst {
    pub fn new(b: VarRef, x: VarRef, value: IntCst) -> Self {
        IsEqCst { b, x, value }
    }
}

impl Constraint for IsEqCst {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        let d = state.make_demon(id, 0, DemonPriority::Normal);
        state.when_bound(self.b, d);
        state.when_domain(self.x, d);
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        if state.bound(self.b) {
            if state.value(self.b) == 1 {
                state.set_value(self.x, self.value)?;
            } else {
                state.remove_value(self.x, self.value)?;
            }
            return Ok(());
        }
        if !state.contains(self.x, self.value) {
            state.set_value(self.b, 0)?;
        } else if state.bound(self.x) {
            state.set_value(self.b, 1)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "is-eq-cst"
    }
}

/// `b == 1  <=>  x <= value`, with `b` a 0/1 variable.
pub struct IsLeCst {
    b: VarRef,
    x: VarRef,
    value: IntCst,
}

impl IsLeCst {
    pub fn new(b: VarRef, x: VarRef, value: IntCst) -> Self {
        IsLeCst { b, x, value }
    }
}

impl Constraint for IsLeCst {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        let d = state.make_demon(id, 0, DemonPriority::Normal);
        state.when_bound(self.b, d);
        state.when_range(self.x, d);
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        if state.bound(self.b) {
            if state.value(self.b) == 1 {
                state.set_max(self.x, self.value)?;
            } else {
                state.set_min(self.x, self.value + 1)?;
            }
            return Ok(());
        }
        if state.max(self.x) <= self.value {
            state.set_value(self.b, 1)?;
        } else if state.min(self.x) > self.value {
            state.set_value(self.b, 0)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "is-le-cst"
    }
}
