//! Linear (scalar-product) constraints with bounds-consistent propagation.

use crate::constraints::Constraint;
use crate::core::state::State;
use crate::core::{ConstraintId, DemonPriority, EmptyDomain, IntCst, ModelError, VarRef, MAX_VALID_VALUE, MIN_VALID_VALUE};
use itertools::Itertools;
use num_integer::Integer;

/// Contribution of one term `c * x` to the sum, computed in `i128` so that
/// products of extreme bounds cannot overflow.
fn term_bounds(state: &State, var: VarRef, coef: IntCst) -> (i128, i128) {
    let (lo, hi) = state.bounds(var);
    let (lo, hi, c) = (lo as i128, hi as i128, coef as i128);
    if c >= 0 {
        (c * lo, c * hi)
    } else {
        (c * hi, c * lo)
    }
}

/// Bounds on `x` implied by `lo <= c * x <= hi`, for `c != 0`.
fn div_bounds(lo: i128, hi: i128, c: IntCst) -> (IntCst, IntCst) {
    let c = c as i128;
    let (xmin, xmax) = if c > 0 {
        (Integer::div_ceil(&lo, &c), Integer::div_floor(&hi, &c))
    } else {
        (Integer::div_ceil(&hi, &c), Integer::div_floor(&lo, &c))
    };
    (
        xmin.clamp(MIN_VALID_VALUE as i128, MAX_VALID_VALUE as i128) as IntCst,
        xmax.clamp(MIN_VALID_VALUE as i128, MAX_VALID_VALUE as i128) as IntCst,
    )
}

/// `sum(coefs[i] * vars[i]) == rhs`.
#[derive(Debug)]
pub struct ScalProdEq {
    vars: Vec<VarRef>,
    coefs: Vec<IntCst>,
    rhs: IntCst,
}

impl ScalProdEq {
    pub fn new(vars: Vec<VarRef>, coefs: Vec<IntCst>, rhs: IntCst) -> Result<Self, ModelError> {
        if vars.len() != coefs.len() {
            return Err(ModelError::MismatchedLengths(vars.len(), coefs.len()));
        }
        Ok(ScalProdEq { vars, coefs, rhs })
    }

    /// `sum(vars) == rhs`.
    pub fn sum(vars: Vec<VarRef>, rhs: IntCst) -> Self {
        let coefs = vec![1; vars.len()];
        ScalProdEq { vars, coefs, rhs }
    }
}

impl Constraint for ScalProdEq {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        let d = state.make_demon(id, 0, DemonPriority::Normal);
        for &v in &self.vars {
            state.when_range(v, d);
        }
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        let terms: Vec<(i128, i128)> = self
            .vars
            .iter()
            .zip_eq(&self.coefs)
            .map(|(&v, &c)| term_bounds(state, v, c))
            .collect();
        let total_min: i128 = terms.iter().map(|t| t.0).sum();
        let total_max: i128 = terms.iter().map(|t| t.1).sum();
        let rhs = self.rhs as i128;
        for (i, (&var, &coef)) in self.vars.iter().zip_eq(&self.coefs).enumerate() {
            if coef == 0 {
                continue;
            }
            let (tmin, tmax) = terms[i];
            // what the other terms leave for this one
            let lo = rhs - (total_max - tmax);
            let hi = rhs - (total_min - tmin);
            let (xmin, xmax) = div_bounds(lo, hi, coef);
            state.set_range(var, xmin, xmax)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scal-prod-eq"
    }
}

/// `sum(coefs[i] * vars[i]) <= rhs`.
pub struct ScalProdLe {
    vars: Vec<VarRef>,
    coefs: Vec<IntCst>,
    rhs: IntCst,
}

impl ScalProdLe {
    pub fn new(vars: Vec<VarRef>, coefs: Vec<IntCst>, rhs: IntCst) -> Result<Self, ModelError> {
        if vars.len() != coefs.len() {
            return Err(ModelError::MismatchedLengths(vars.len(), coefs.len()));
        }
        Ok(ScalProdLe { vars, coefs, rhs })
    }
}

impl Constraint for ScalProdLe {
    fn post(&mut self, state: &mut State, id: ConstraintId) {
        let d = state.make_demon(id, 0, DemonPriority::Normal);
        for &v in &self.vars {
            state.when_range(v, d);
        }
    }

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain> {
        let terms: Vec<(i128, i128)> = self
            .vars
            .iter()
            .zip_eq(&self.coefs)
            .map(|(&v, &c)| term_bounds(state, v, c))
            .collect();
        let total_min: i128 = terms.iter().map(|t| t.0).sum();
        let rhs = self.rhs as i128;
        for (i, (&var, &coef)) in self.vars.iter().zip_eq(&self.coefs).enumerate() {
            if coef == 0 {
                continue;
            }
            let (tmin, _) = terms[i];
            let hi = rhs - (total_min - tmin);
            // one-sided: only the upper bound of the term is constrained
            let (xmin, xmax) = div_bounds(i128::from(MIN_VALID_VALUE) * 4, hi, coef);
            if coef > 0 {
                state.set_max(var, xmax)?;
            } else {
                state.set_min(var, xmin)?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scal-prod-le"
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
    fn sum_eq_tightens() {
        let mut s = State::new();
        let x = s.new_var(0, 20);
        let y = s.new_var(0, 20);
        let mut c = ScalProdEq::sum(vec![x, y], 20);
        c.post(&mut s, ConstraintId::from_u32(0));
        fixpoint(&mut s, &mut c).unwrap();
        assert_eq!(s.bounds(x), (0, 20));
        s.set_min(y, 15).unwrap();
        fixpoint(&mut s, &mut c).unwrap();
        assert_eq!(s.bounds(x), (0, 5));
    }

    #[test]
    fn weighted_eq_solves_when_coupled() {
        // 2p + 4r = 56 with p + r = 20 pins p = 12, r = 8
        let mut s = State::new();
        let p = s.new_var(0, 20);
        let r = s.new_var(0, 20);
        let mut a = ScalProdEq::new(vec![p, r], vec![2, 4], 56).unwrap();
        let mut b = ScalProdEq::sum(vec![p, r], 20);
        a.post(&mut s, ConstraintId::from_u32(0));
        b.post(&mut s, ConstraintId::from_u32(1));
        loop {
            a.initial_propagate(&mut s).unwrap();
            b.initial_propagate(&mut s).unwrap();
            if s.next_demon().is_none() {
                break;
            }
        }
        assert_eq!(s.value(p), 12);
        assert_eq!(s.value(r), 8);
    }

    #[test]
    fn negative_coefficients() {
        // x - y = 2  <=>  x = y + 2
        let mut s = State::new();
        let x = s.new_var(0, 10);
        let y = s.new_var(0, 10);
        let mut c = ScalProdEq::new(vec![x, y], vec![1, -1], 2).unwrap();
        c.post(&mut s, ConstraintId::from_u32(0));
        fixpoint(&mut s, &mut c).unwrap();
        assert_eq!(s.bounds(x), (2, 10));
        assert_eq!(s.bounds(y), (0, 8));
    }

    #[test]
    fn infeasible_sum_fails() {
        let mut s = State::new();
        let x = s.new_var(0, 3);
        let y = s.new_var(0, 3);
        let mut c = ScalProdEq::sum(vec![x, y], 10);
        assert!(fixpoint(&mut s, &mut c).is_err());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut s = State::new();
        let x = s.new_var(0, 3);
        assert_eq!(
            ScalProdEq::new(vec![x], vec![1, 2], 0).unwrap_err(),
            ModelError::MismatchedLengths(1, 2)
        );
    }

    #[test]
    fn le_prunes_upper_side_only() {
        let mut s = State::new();
        let x = s.new_var(0, 10);
        let y = s.new_var(4, 10);
        let mut c = ScalProdLe::new(vec![x, y], vec![1, 1], 9).unwrap();
        c.post(&mut s, ConstraintId::from_u32(0));
        fixpoint(&mut s, &mut c).unwrap();
        assert_eq!(s.bounds(x), (0, 5));
        assert_eq!(s.bounds(y), (4, 9));
    }
}
