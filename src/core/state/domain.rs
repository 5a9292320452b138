use crate::backtrack::{RevInt, RevList, Trail};
use crate::core::state::event::Sweep;
use crate::core::state::State;
use crate::core::{sat_add, sat_sub, EmptyDomain, IntCst, VarRef};

/// Initial spans up to this many values use the bitset representation;
/// anything larger keeps bounds plus a buffer of removed interior values.
pub(crate) const BITSET_SPAN_MAX: i64 = 65_536;

pub(crate) enum Repr {
    /// One bit per value of the initial span, 64 values per reversible word.
    /// Bits outside the current `[min, max]` are stale: every query clamps to
    /// the bounds first, so they are never consulted again.
    Bits { offset: IntCst, words: Vec<RevInt> },
    /// Bounds only, plus removed interior values. The buffer is push-only
    /// with a reversible length, so undoing a removal is a scalar restore.
    Sparse { holes: RevList<IntCst> },
}

pub(crate) struct VarDomain {
    pub min: RevInt,
    pub max: RevInt,
    pub size: RevInt,
    pub repr: Repr,
    pub sweep: Sweep,
}

impl VarDomain {
    pub fn new(trail: &mut Trail, lb: IntCst, ub: IntCst) -> Self {
        debug_assert!(lb <= ub);
        let span = ub - lb + 1;
        let repr = if span <= BITSET_SPAN_MAX {
            let n_words = ((span + 63) / 64) as usize;
            let mut words = Vec::with_capacity(n_words);
            for w in 0..n_words {
                let bits_before = (w as i64) * 64;
                let bits_here = (span - bits_before).min(64);
                let word = if bits_here >= 64 {
                    u64::MAX
                } else {
                    (1u64 << bits_here) - 1
                };
                words.push(trail.new_int(word as i64));
            }
            Repr::Bits { offset: lb, words }
        } else {
            Repr::Sparse {
                holes: RevList::new(trail),
            }
        };
        VarDomain {
            min: trail.new_int(lb),
            max: trail.new_int(ub),
            size: trail.new_int(span),
            repr,
            sweep: Sweep::new(),
        }
    }
}

impl State {
    // ---------- readers ----------

    pub fn min(&self, var: VarRef) -> IntCst {
        self.trail.value(self.doms[var].min)
    }

    pub fn max(&self, var: VarRef) -> IntCst {
        self.trail.value(self.doms[var].max)
    }

    pub fn bounds(&self, var: VarRef) -> (IntCst, IntCst) {
        (self.min(var), self.max(var))
    }

    pub fn size(&self, var: VarRef) -> u64 {
        self.trail.value(self.doms[var].size) as u64
    }

    pub fn bound(&self, var: VarRef) -> bool {
        self.min(var) == self.max(var)
    }

    /// The value of a bound variable. Panics if the variable is not bound.
    pub fn value(&self, var: VarRef) -> IntCst {
        let (lo, hi) = self.bounds(var);
        assert!(lo == hi, "value() on the unbound variable {var:?}");
        lo
    }

    pub fn contains(&self, var: VarRef, v: IntCst) -> bool {
        let (lo, hi) = self.bounds(var);
        if v < lo || v > hi {
            return false;
        }
        match &self.doms[var].repr {
            Repr::Bits { offset, words } => {
                let idx = (v - offset) as u64;
                let word = self.trail.value(words[(idx / 64) as usize]) as u64;
                word & (1u64 << (idx % 64)) != 0
            }
            Repr::Sparse { holes } => !holes.contains(&self.trail, v),
        }
    }

    /// Smallest member at or above `from`. Requires that one exists, which
    /// holds whenever `from <= max(var)` since the max is always a member.
    fn next_member(&self, var: VarRef, from: IntCst) -> IntCst {
        debug_assert!(from <= self.max(var));
        let lo = self.min(var).max(from);
        match &self.doms[var].repr {
            Repr::Bits { offset, words } => {
                let mut idx = (lo - offset) as u64;
                loop {
                    let word = self.trail.value(words[(idx / 64) as usize]) as u64;
                    let masked = word & (u64::MAX << (idx % 64));
                    if masked != 0 {
                        let bit = (idx / 64) * 64 + masked.trailing_zeros() as u64;
                        return offset + bit as IntCst;
                    }
                    idx = (idx / 64 + 1) * 64;
                }
            }
            Repr::Sparse { holes } => {
                let mut v = lo;
                while holes.contains(&self.trail, v) {
                    v += 1;
                }
                v
            }
        }
    }

    /// Largest member at or below `from`; symmetric to [`State::next_member`].
    fn prev_member(&self, var: VarRef, from: IntCst) -> IntCst {
        debug_assert!(from >= self.min(var));
        let hi = self.max(var).min(from);
        match &self.doms[var].repr {
            Repr::Bits { offset, words } => {
                let mut idx = (hi - offset) as i64;
                loop {
                    let word = self.trail.value(words[(idx / 64) as usize]) as u64;
                    let shift = 63 - (idx % 64) as u32;
                    let masked = (word << shift) >> shift;
                    if masked != 0 {
                        let bit = (idx / 64) * 64 + 63 - masked.leading_zeros() as i64;
                        return offset + bit;
                    }
                    idx = (idx / 64) * 64 - 1;
                }
            }
            Repr::Sparse { holes } => {
                let mut v = hi;
                while holes.contains(&self.trail, v) {
                    v -= 1;
                }
                v
            }
        }
    }

    /// Number of members in `[l, u]`, for `[l, u]` inside the current bounds.
    fn count_members(&self, var: VarRef, l: IntCst, u: IntCst) -> i64 {
        if l > u {
            return 0;
        }
        match &self.doms[var].repr {
            Repr::Bits { offset, words } => {
                let (lo, hi) = ((l - offset) as u64, (u - offset) as u64);
                let mut count = 0i64;
                let mut w = lo / 64;
                while w <= hi / 64 {
                    let mut word = self.trail.value(words[w as usize]) as u64;
                    if w == lo / 64 {
                        word &= u64::MAX << (lo % 64);
                    }
                    if w == hi / 64 {
                        word &= u64::MAX >> (63 - hi % 64);
                    }
                    count += word.count_ones() as i64;
                    w += 1;
                }
                count
            }
            Repr::Sparse { holes } => {
                let holes_in = holes
                    .live(&self.trail)
                    .iter()
                    .filter(|&&h| l <= h && h <= u)
                    .count() as i64;
                (u - l + 1) - holes_in
            }
        }
    }

    // ---------- mutators ----------
    //
    // Every mutator either leaves the domain non-empty or raises
    // `EmptyDomain` without having observed an empty state. No-op requests
    // push nothing on the trail and fire no events.

    /// Intersects the domain with `[m, +inf)`.
    pub fn set_min(&mut self, var: VarRef, m: IntCst) -> Result<bool, EmptyDomain> {
        let (lo, hi) = self.bounds(var);
        if m <= lo {
            return Ok(false);
        }
        if m > hi {
            return Err(EmptyDomain(var));
        }
        // bounds advance past holes
        let new_min = self.next_member(var, m);
        let removed = self.count_members(var, lo, new_min - 1);
        let d = &self.doms[var];
        let (min_cell, size_cell) = (d.min, d.size);
        self.trail.set(min_cell, new_min);
        self.trail.add(size_cell, -removed);
        self.fire(var, lo, hi, None);
        Ok(true)
    }

    /// Intersects the domain with `(-inf, m]`.
    pub fn set_max(&mut self, var: VarRef, m: IntCst) -> Result<bool, EmptyDomain> {
        let (lo, hi) = self.bounds(var);
        if m >= hi {
            return Ok(false);
        }
        if m < lo {
            return Err(EmptyDomain(var));
        }
        let new_max = self.prev_member(var, m);
        let removed = self.count_members(var, new_max + 1, hi);
        let d = &self.doms[var];
        let (max_cell, size_cell) = (d.max, d.size);
        self.trail.set(max_cell, new_max);
        self.trail.add(size_cell, -removed);
        self.fire(var, lo, hi, None);
        Ok(true)
    }

    /// Intersects the domain with `[l, u]`.
    pub fn set_range(&mut self, var: VarRef, l: IntCst, u: IntCst) -> Result<bool, EmptyDomain> {
        if l > u {
            return Err(EmptyDomain(var));
        }
        let a = self.set_min(var, l)?;
        let b = self.set_max(var, u)?;
        Ok(a || b)
    }

    /// Binds the variable to `v`.
    pub fn set_value(&mut self, var: VarRef, v: IntCst) -> Result<bool, EmptyDomain> {
        self.set_range(var, v, v)
    }

    /// Removes a single value. Removing a non-member is a no-op; removing an
    /// extremal value advances the corresponding bound to the next member.
    pub fn remove_value(&mut self, var: VarRef, v: IntCst) -> Result<bool, EmptyDomain> {
        let (lo, hi) = self.bounds(var);
        if v < lo || v > hi || !self.contains(var, v) {
            return Ok(false);
        }
        if lo == hi {
            return Err(EmptyDomain(var));
        }
        if v == lo {
            let new_min = self.next_member(var, v + 1);
            let d = &self.doms[var];
            let (min_cell, size_cell) = (d.min, d.size);
            self.trail.set(min_cell, new_min);
            self.trail.add(size_cell, -1);
            self.fire(var, lo, hi, None);
        } else if v == hi {
            let new_max = self.prev_member(var, v - 1);
            let d = &self.doms[var];
            let (max_cell, size_cell) = (d.max, d.size);
            self.trail.set(max_cell, new_max);
            self.trail.add(size_cell, -1);
            self.fire(var, lo, hi, None);
        } else {
            // interior: punch a hole; min and max both survive so the domain
            // cannot become empty here
            let State { doms, trail, .. } = self;
            match &mut doms[var].repr {
                Repr::Bits { offset, words } => {
                    let idx = (v - *offset) as u64;
                    let cell = words[(idx / 64) as usize];
                    let word = trail.value(cell) as u64;
                    trail.set(cell, (word & !(1u64 << (idx % 64))) as i64);
                }
                Repr::Sparse { holes } => holes.push(trail, v),
            }
            let size_cell = self.doms[var].size;
            self.trail.add(size_cell, -1);
            self.fire(var, lo, hi, Some(v));
        }
        Ok(true)
    }

    /// Removes every value in `[l, u]`. When the range abuts a bound this is
    /// a bound move; otherwise each value is punched out individually.
    pub fn remove_interval(&mut self, var: VarRef, l: IntCst, u: IntCst) -> Result<bool, EmptyDomain> {
        let (lo, hi) = self.bounds(var);
        if l > u || u < lo || l > hi {
            return Ok(false);
        }
        if l <= lo {
            return self.set_min(var, sat_add(u, 1));
        }
        if u >= hi {
            return self.set_max(var, sat_sub(l, 1));
        }
        let mut changed = false;
        for v in l..=u {
            changed |= self.remove_value(var, v)?;
        }
        Ok(changed)
    }

    pub fn remove_values(&mut self, var: VarRef, values: &[IntCst]) -> Result<bool, EmptyDomain> {
        let mut changed = false;
        for &v in values {
            changed |= self.remove_value(var, v)?;
        }
        Ok(changed)
    }

    /// Intersects the domain with the given set of values.
    pub fn set_values(&mut self, var: VarRef, values: &[IntCst]) -> Result<bool, EmptyDomain> {
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.is_empty() {
            return Err(EmptyDomain(var));
        }
        let mut changed = self.set_range(var, sorted[0], sorted[sorted.len() - 1])?;
        for w in sorted.windows(2) {
            if w[1] > w[0] + 1 {
                changed |= self.remove_interval(var, w[0] + 1, w[1] - 1)?;
            }
        }
        Ok(changed)
    }

    // ---------- iteration ----------

    /// Enumerates the current members in increasing order. The caller must
    /// not mutate the domain while iterating.
    pub fn domain_iter(&self, var: VarRef) -> DomainValues<'_> {
        DomainValues {
            state: self,
            var,
            next: Some(self.min(var)),
        }
    }
}

/// Iterator over the members of a domain. See [`State::domain_iter`].
pub struct DomainValues<'a> {
    state: &'a State,
    var: VarRef,
    next: Option<IntCst>,
}

impl Iterator for DomainValues<'_> {
    type Item = IntCst;

    fn next(&mut self) -> Option<IntCst> {
        let current = self.next?;
        self.next = if current >= self.state.max(self.var) {
            None
        } else {
            Some(self.state.next_member(self.var, current + 1))
        };
        Some(current)
    }
}
