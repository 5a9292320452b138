use crate::core::state::State;
use crate::core::{EmptyDomain, IntCst, VarRef};

/// An immutable snapshot of the bounds of a chosen subset of variables.
///
/// Assignments carry solutions out of the search (they are plain data and may
/// be read from other threads) and can later be re-applied to a compatible
/// state by intersection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assignment {
    entries: Vec<Entry>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Entry {
    var: VarRef,
    min: IntCst,
    max: IntCst,
}

impl Assignment {
    /// Snapshots the current bounds of the given variables.
    pub fn save(state: &State, vars: &[VarRef]) -> Assignment {
        Assignment {
            entries: vars
                .iter()
                .map(|&var| {
                    let (min, max) = state.bounds(var);
                    Entry { var, min, max }
                })
                .collect(),
        }
    }

    /// Snapshots every variable of the state.
    pub fn save_all(state: &State) -> Assignment {
        let vars: Vec<VarRef> = state.variables().collect();
        Assignment::save(state, &vars)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn vars(&self) -> impl Iterator<Item = VarRef> + '_ {
        self.entries.iter().map(|e| e.var)
    }

    pub fn bounds_of(&self, var: VarRef) -> Option<(IntCst, IntCst)> {
        self.entries
            .iter()
            .find(|e| e.var == var)
            .map(|e| (e.min, e.max))
    }

    /// The value recorded for `var`, if the snapshot binds it.
    pub fn value_of(&self, var: VarRef) -> Option<IntCst> {
        match self.bounds_of(var) {
            Some((lo, hi)) if lo == hi => Some(lo),
            _ => None,
        }
    }

    /// Intersects the state's domains with the snapshot. Mutations are
    /// trailed like any other and undone on backtrack.
    pub fn restore(&self, state: &mut State) -> Result<bool, EmptyDomain> {
        let mut changed = false;
        for e in &self.entries {
            changed |= state.set_range(e.var, e.min, e.max)?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_and_restore() {
        let mut s = State::new();
        let x = s.new_var(0, 10);
        let y = s.new_var(0, 10);
        s.set_value(x, 4).unwrap();
        s.set_range(y, 2, 6).unwrap();
        let a = Assignment::save(&s, &[x, y]);
        assert_eq!(a.value_of(x), Some(4));
        assert_eq!(a.value_of(y), None);
        assert_eq!(a.bounds_of(y), Some((2, 6)));

        let mut fresh = State::new();
        let x2 = fresh.new_var(0, 10);
        let y2 = fresh.new_var(0, 10);
        debug_assert_eq!((x2, y2), (x, y));
        a.restore(&mut fresh).unwrap();
        assert_eq!(fresh.value(x2), 4);
        assert_eq!(fresh.bounds(y2), (2, 6));
    }

    #[test]
    fn restore_is_an_intersection() {
        let mut s = State::new();
        let x = s.new_var(0, 10);
        let a = Assignment::save(&s, &[x]);
        s.set_range(x, 3, 5).unwrap();
        // the wider snapshot does not loosen the tighter current domain
        assert_eq!(a.restore(&mut s), Ok(false));
        assert_eq!(s.bounds(x), (3, 5));
    }

    #[test]
    fn incompatible_restore_fails() {
        let mut s = State::new();
        let x = s.new_var(0, 10);
        s.set_value(x, 9).unwrap();
        let a = Assignment::save(&s, &[x]);
        let mut t = State::new();
        let x2 = t.new_var(0, 5);
        debug_assert_eq!(x2, x);
        assert!(a.restore(&mut t).is_err());
    }
}
