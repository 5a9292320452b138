//! Binary range constraints between two variables, plus the unary
//! variable-against-constant forms.

use crate::constraints::Constraint;
use crate::core::state::State;
use crate::core::{ConstraintId, DemonPriority, EmptyDomain, IntCst, VarRef};

/// `x == y + offset`, bounds-consistent.
pub struct Eq {
    x: VarRef,
    y: VarRef,
    offset: IntCst,
}

impl Eq {
    pub fn new(x: VarRef, y: VarRef, offset: IntCst) -> Self {
        Eq { x, y, offset }
    }
}

impl Constraint for Eq {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        let d = state.make_demon(id, 0, DemonPriority::Normal);
        state.when_range(self.x, d);
        state.when_range(self.y, d);
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        let (ymin, ymax) = state.bounds(self.y);
        state.set_range(self.x, ymin + self.offset, ymax + self.offset)?;
        let (xmin, xmax) = state.bounds(self.x);
        state.set_range(self.y, xmin - self.offset, xmax - self.offset)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "range-eq"
    }
}

/// `x + offset <= y`, bounds-consistent.
pub struct Le {
    x: VarRef,
    y: VarRef,
    offset: IntCst,
}

impl Le {
    pub fn new(x: VarRef, y: VarRef, offset: IntCst) -> Self {
        Le { x, y, offset }
    }
}

impl Constraint for Le {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        let d = state.make_demon(id, 0, DemonPriority::Normal);
        state.when_range(self.x, d);
        state.when_range(self.y, d);
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        state.set_min(self.y, state.min(self.x) + self.offset)?;
        state.set_max(self.x, state.max(self.y) - self.offset)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "range-le"
    }
}

/// `x != y + offset`. Propagates once either side is bound.
pub struct Ne {
    x: VarRef,
    y: VarRef,
    offset: IntCst,
}

impl Ne {
    pub fn new(x: VarRef, y: VarRef, offset: IntCst) -> Self {
        Ne { x, y, offset }
    }
}

impl Constraint for Ne {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        let d = state.make_demon(id, 0, DemonPriority::Normal);
        state.when_bound(self.x, d);
        state.when_bound(self.y, d);
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        if state.bound(self.x) {
            state.remove_value(self.y, state.value(self.x) - self.offset)?;
        }
        if state.bound(self.y) {
            state.remove_value(self.x, state.value(self.y) + self.offset)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "range-ne"
    }
}

/// `var in [lo, hi]`.
pub struct MemberCst {
    var: VarRef,
    lo: IntCst,
    hi: IntCst,
}

impl MemberCst {
    pub fn new(var: VarRef, lo: IntCst, hi: IntCst) -> Self {
        MemberCst { var, lo, hi }
    }

    /// `var == value`.
    pub fn value(var: VarRef, value: IntCst) -> Self {
        MemberCst::new(var, value, value)
    }
}

impl Constraint for MemberCst {
    fn post(&mut self, _state: &mut State, _id: ConstraintId) {
        // a one-shot restriction: nothing to watch
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        state.set_range(self.var, self.lo, self.hi)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "member"
    }
}

/// `var not in [lo, hi]`.
pub struct NotMemberCst {
    var: VarRef,
    lo: IntCst,
    hi: IntCst,
}

impl NotMemberCst {
    pub fn new(var: VarRef, lo: IntCst, hi: IntCst) -> Self {
        NotMemberCst { var, lo, hi }
    }
}

impl Constraint for NotMemberCst {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        // re-check when the bounds drift towards the forbidden window
        let d = state.make_demon(id, 0, DemonPriority::Normal);
        state.when_range(self.var, d);
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        state.remove_interval(self.var, self.lo, self.hi)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "not-member"
    }
}
