use crate::core::state::{EventKind, State};
use crate::core::{clamp_valid, sat_add, DemonId, EmptyDomain, IntCst, IntervalRef, VarRef, MAX_VALID_VALUE, MIN_VALID_VALUE};

/// An interval variable is three integer variables (start, duration, end)
/// plus a 0/1 performed variable:
///
/// - performed in `[1, 1]`: the interval must be performed,
/// - performed in `[0, 1]`: it may or may not be,
/// - performed in `[0, 0]`: it cannot be, and its accessors are suppressed to
///   unbounded sentinels.
///
/// The structural link `start + duration = end` is enforced by a constraint
/// posted at creation, not by the accessors below.
#[derive(Copy, Clone, Debug)]
pub struct IntervalData {
    pub start: VarRef,
    pub duration: VarRef,
    pub end: VarRef,
    pub performed: VarRef,
}

impl State {
    /// Creates a fixed-duration interval. `optional` intervals start in the
    /// may-or-may-not-be-performed status.
    pub fn new_interval(
        &mut self,
        start_min: IntCst,
        start_max: IntCst,
        duration: IntCst,
        optional: bool,
    ) -> IntervalRef {
        let (start_min, start_max) = (clamp_valid(start_min), clamp_valid(start_max));
        let duration = clamp_valid(duration);
        assert!(start_min <= start_max, "empty start window");
        assert!(duration >= 0, "negative duration");
        let start = self.new_var(start_min, start_max);
        let dur = self.new_var(duration, duration);
        let end = self.new_var(sat_add(start_min, duration), sat_add(start_max, duration));
        let performed = self.new_var(if optional { 0 } else { 1 }, 1);
        self.intervals.push(IntervalData {
            start,
            duration: dur,
            end,
            performed,
        })
    }

    pub fn interval_parts(&self, i: IntervalRef) -> IntervalData {
        self.intervals[i]
    }

    pub fn intervals(&self) -> impl Iterator<Item = IntervalRef> {
        (0..self.intervals.len()).map(IntervalRef::from)
    }

    // ---------- performed status ----------

    pub fn must_be_performed(&self, i: IntervalRef) -> bool {
        self.min(self.intervals[i].performed) == 1
    }

    pub fn may_be_performed(&self, i: IntervalRef) -> bool {
        self.max(self.intervals[i].performed) == 1
    }

    pub fn cannot_be_performed(&self, i: IntervalRef) -> bool {
        !self.may_be_performed(i)
    }

    pub fn performed_bound(&self, i: IntervalRef) -> bool {
        self.bound(self.intervals[i].performed)
    }

    pub fn set_performed(&mut self, i: IntervalRef, val: bool) -> Result<bool, EmptyDomain> {
        let performed = self.intervals[i].performed;
        self.set_value(performed, if val { 1 } else { 0 })
    }

    // ---------- accessors, suppressed when cannot be performed ----------

    pub fn interval_start_min(&self, i: IntervalRef) -> IntCst {
        if self.cannot_be_performed(i) {
            MIN_VALID_VALUE
        } else {
            self.min(self.intervals[i].start)
        }
    }

    pub fn interval_start_max(&self, i: IntervalRef) -> IntCst {
        if self.cannot_be_performed(i) {
            MAX_VALID_VALUE
        } else {
            self.max(self.intervals[i].start)
        }
    }

    pub fn interval_duration_min(&self, i: IntervalRef) -> IntCst {
        if self.cannot_be_performed(i) {
            0
        } else {
            self.min(self.intervals[i].duration)
        }
    }

    pub fn interval_duration_max(&self, i: IntervalRef) -> IntCst {
        if self.cannot_be_performed(i) {
            0
        } else {
            self.max(self.intervals[i].duration)
        }
    }

    pub fn interval_end_min(&self, i: IntervalRef) -> IntCst {
        if self.cannot_be_performed(i) {
            MIN_VALID_VALUE
        } else {
            self.min(self.intervals[i].end)
        }
    }

    pub fn interval_end_max(&self, i: IntervalRef) -> IntCst {
        if self.cannot_be_performed(i) {
            MAX_VALID_VALUE
        } else {
            self.max(self.intervals[i].end)
        }
    }

    // ---------- mutators ----------
    //
    // On a must-be-performed interval a wipeout is a plain failure. While the
    // status is still open, a wipeout instead decides that the interval is
    // not performed. Mutating a cannot-be-performed interval is a no-op.

    pub fn set_interval_start_min(&mut self, i: IntervalRef, m: IntCst) -> Result<bool, EmptyDomain> {
        let var = self.intervals[i].start;
        self.interval_tighten(i, var, m, true)
    }

    pub fn set_interval_start_max(&mut self, i: IntervalRef, m: IntCst) -> Result<bool, EmptyDomain> {
        let var = self.intervals[i].start;
        self.interval_tighten(i, var, m, false)
    }

    pub fn set_interval_end_min(&mut self, i: IntervalRef, m: IntCst) -> Result<bool, EmptyDomain> {
        let var = self.intervals[i].end;
        self.interval_tighten(i, var, m, true)
    }

    pub fn set_interval_end_max(&mut self, i: IntervalRef, m: IntCst) -> Result<bool, EmptyDomain> {
        let var = self.intervals[i].end;
        self.interval_tighten(i, var, m, false)
    }

    pub fn set_interval_duration_min(&mut self, i: IntervalRef, m: IntCst) -> Result<bool, EmptyDomain> {
        let var = self.intervals[i].duration;
        self.interval_tighten(i, var, m, true)
    }

    pub fn set_interval_duration_max(&mut self, i: IntervalRef, m: IntCst) -> Result<bool, EmptyDomain> {
        let var = self.intervals[i].duration;
        self.interval_tighten(i, var, m, false)
    }

    fn interval_tighten(
        &mut self,
        i: IntervalRef,
        var: VarRef,
        m: IntCst,
        is_min: bool,
    ) -> Result<bool, EmptyDomain> {
        if self.cannot_be_performed(i) {
            return Ok(false);
        }
        let r = if is_min { self.set_min(var, m) } else { self.set_max(var, m) };
        match r {
            Err(_) if !self.must_be_performed(i) => {
                self.set_performed(i, false)?;
                Ok(true)
            }
            other => other,
        }
    }

    // ---------- listeners ----------

    /// Attaches the demon to any bound change of the interval's start,
    /// duration or end.
    pub fn when_interval_changed(&mut self, i: IntervalRef, demon: DemonId) {
        let IntervalData { start, duration, end, .. } = self.intervals[i];
        self.when(start, EventKind::Range, demon);
        self.when(duration, EventKind::Range, demon);
        self.when(end, EventKind::Range, demon);
    }

    /// Attaches the demon to the decision of the performed status.
    pub fn when_performed(&mut self, i: IntervalRef, demon: DemonId) {
        let performed = self.intervals[i].performed;
        self.when(performed, EventKind::Bound, demon);
    }
}

/// View of an interval whose minima relax to the unbounded sentinel while the
/// performed status is open: identical to the underlying interval when it
/// must be performed, unbounded below when it merely may be.
#[derive(Copy, Clone, Debug)]
pub struct RelaxedMin(pub IntervalRef);

impl RelaxedMin {
    pub fn start_min(&self, s: &State) -> IntCst {
        if s.must_be_performed(self.0) {
            s.interval_start_min(self.0)
        } else {
            MIN_VALID_VALUE
        }
    }

    pub fn start_max(&self, s: &State) -> IntCst {
        s.interval_start_max(self.0)
    }

    pub fn end_min(&self, s: &State) -> IntCst {
        if s.must_be_performed(self.0) {
            s.interval_end_min(self.0)
        } else {
            MIN_VALID_VALUE
        }
    }

    pub fn end_max(&self, s: &State) -> IntCst {
        s.interval_end_max(self.0)
    }

    pub fn duration_min(&self, s: &State) -> IntCst {
        s.interval_duration_min(self.0)
    }

    pub fn duration_max(&self, s: &State) -> IntCst {
        s.interval_duration_max(self.0)
    }
}

/// Dual of [`RelaxedMin`]: maxima relax to the unbounded sentinel while the
/// performed status is open.
#[derive(Copy, Clone, Debug)]
pub struct RelaxedMax(pub IntervalRef);

impl RelaxedMax {
    pub fn start_min(&self, s: &State) -> IntCst {
        s.interval_start_min(self.0)
    }

    pub fn start_max(&self, s: &State) -> IntCst {
        if s.must_be_performed(self.0) {
            s.interval_start_max(self.0)
        } else {
            MAX_VALID_VALUE
        }
    }

    pub fn end_min(&self, s: &State) -> IntCst {
        s.interval_end_min(self.0)
    }

    pub fn end_max(&self, s: &State) -> IntCst {
        if s.must_be_performed(self.0) {
            s.interval_end_max(self.0)
        } else {
            MAX_VALID_VALUE
        }
    }

    pub fn duration_min(&self, s: &State) -> IntCst {
        s.interval_duration_min(self.0)
    }

    pub fn duration_max(&self, s: &State) -> IntCst {
        s.interval_duration_max(self.0)
    }
}
