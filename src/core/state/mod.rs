mod assignment;
mod domain;
mod event;
mod interval;
mod queue;

pub use assignment::Assignment;
pub use domain::DomainValues;
pub use event::EventKind;
pub use interval::{IntervalData, RelaxedMax, RelaxedMin};
pub use queue::{FailAction, Queue};

use crate::backtrack::{RevInt, Trail, TrailLoc};
use crate::collections::ref_store::RefVec;
use crate::core::state::domain::VarDomain;
use crate::core::state::event::Listeners;
use crate::core::{clamp_valid, ConstraintId, DemonId, DemonPriority, IntCst, IntervalRef, ModelError, VarRef};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A demon is a callback handle: it names the constraint that owns it, an
/// owner-chosen tag distinguishing the constraint's demons, and a priority
/// bucket. Its stamp implements enqueue dedup; `inhibited` is reversible so a
/// demon silenced inside a branch wakes up again on backtrack.
pub(crate) struct Demon {
    pub constraint: ConstraintId,
    pub tag: u32,
    pub priority: DemonPriority,
    pub stamp: u64,
    pub inhibited: RevInt,
}

/// The reversible core of one solver: domains, listener lists, the demon
/// registry, the propagation queue and the trail they are all recorded on.
///
/// All mutation goes through this type and is undone by popping the trail;
/// the only exceptions are the per-sweep scratch (reset explicitly) and the
/// random source.
pub struct State {
    pub(crate) trail: Trail,
    pub(crate) doms: RefVec<VarRef, VarDomain>,
    listeners: RefVec<VarRef, Listeners>,
    demons: RefVec<DemonId, Demon>,
    /// Visible length of the demon registry; demons posted inside a branch
    /// disappear on backtrack.
    n_demons: RevInt,
    pub(crate) queue: Queue,
    /// Variables with an active sweep snapshot.
    dirty: Vec<VarRef>,
    pub(crate) intervals: RefVec<IntervalRef, IntervalData>,
    rng: StdRng,
}

impl Default for State {
    fn default() -> Self {
        State::new()
    }
}

impl State {
    pub fn new() -> Self {
        let mut trail = Trail::new();
        let n_demons = trail.new_int(0);
        State {
            trail,
            doms: RefVec::new(),
            listeners: RefVec::new(),
            demons: RefVec::new(),
            n_demons,
            queue: Queue::new(),
            dirty: Vec::new(),
            intervals: RefVec::new(),
            rng: StdRng::seed_from_u64(0x1acc01ade),
        }
    }

    // ---------- clocks ----------

    /// Stamp of the current search node; see [`Trail::stamp`].
    pub fn stamp(&self) -> u64 {
        self.trail.stamp()
    }

    /// Incremented after each backtrack; see [`Trail::fail_stamp`].
    pub fn fail_stamp(&self) -> u64 {
        self.trail.fail_stamp()
    }

    // ---------- variables ----------

    /// Creates a variable with domain `[lb, ub]`, both bounds clamped to the
    /// valid value range. Panics if the clamped domain is empty.
    pub fn new_var(&mut self, lb: IntCst, ub: IntCst) -> VarRef {
        let (lb, ub) = (clamp_valid(lb), clamp_valid(ub));
        assert!(lb <= ub, "empty initial domain [{lb}, {ub}]");
        let dom = VarDomain::new(&mut self.trail, lb, ub);
        let var = self.doms.push(dom);
        let listeners = Listeners::new(&mut self.trail);
        let v2 = self.listeners.push(listeners);
        debug_assert_eq!(var, v2);
        var
    }

    /// Creates a variable whose domain is exactly the given set of values.
    pub fn new_var_from_set(&mut self, values: &[IntCst]) -> Result<VarRef, ModelError> {
        let mut sorted: Vec<IntCst> = values.iter().map(|&v| clamp_valid(v)).collect();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.is_empty() {
            return Err(ModelError::EmptyInitialDomain);
        }
        let var = self.new_var(sorted[0], sorted[sorted.len() - 1]);
        for w in sorted.windows(2) {
            if w[1] > w[0] + 1 {
                // no listener exists yet, so this cannot fail or fire
                self.remove_interval(var, w[0] + 1, w[1] - 1)
                    .expect("removal inside fresh bounds");
            }
        }
        Ok(var)
    }

    pub fn variables(&self) -> impl Iterator<Item = VarRef> {
        (0..self.doms.len()).map(VarRef::from)
    }

    pub fn num_variables(&self) -> usize {
        self.doms.len()
    }

    // ---------- reversible cells for clients ----------

    /// Allocates a reversible integer owned by the calling constraint.
    pub fn new_rev(&mut self, value: i64) -> RevInt {
        self.trail.new_int(value)
    }

    pub fn rev_value(&self, cell: RevInt) -> i64 {
        self.trail.value(cell)
    }

    /// Saves and sets the cell; at most one trail entry per search node.
    pub fn set_rev(&mut self, cell: RevInt, value: i64) {
        self.trail.set(cell, value);
    }

    pub fn add_reversible_action(&mut self, action: Box<dyn FnMut()>) {
        self.trail.add_reversible_action(action);
    }

    pub fn register_alloc(&mut self, obj: Box<dyn std::any::Any>) {
        self.trail.register_alloc(obj);
    }

    // ---------- demons and listeners ----------

    /// Registers a demon for the given constraint. `tag` is echoed back on
    /// dispatch so one constraint can own several demons.
    pub fn make_demon(&mut self, constraint: ConstraintId, tag: u32, priority: DemonPriority) -> DemonId {
        let inhibited = self.trail.new_int(0);
        let idx = self.trail.value(self.n_demons) as usize;
        let demon = Demon {
            constraint,
            tag,
            priority,
            stamp: 0,
            inhibited,
        };
        let id = if idx < self.demons.len() {
            let id = DemonId::from(idx);
            self.demons[id] = demon;
            id
        } else {
            self.demons.push(demon)
        };
        let n_demons = self.n_demons;
        self.trail.add(n_demons, 1);
        id
    }

    /// Attaches the demon to one of the variable's listener lists.
    pub fn when(&mut self, var: VarRef, kind: EventKind, demon: DemonId) {
        let State { listeners, trail, .. } = self;
        let l = &mut listeners[var];
        match kind {
            EventKind::Range => l.on_range.push(trail, demon),
            EventKind::Domain => l.on_domain.push(trail, demon),
            EventKind::Bound => l.on_bound.push(trail, demon),
        }
    }

    pub fn when_range(&mut self, var: VarRef, demon: DemonId) {
        self.when(var, EventKind::Range, demon);
    }

    pub fn when_domain(&mut self, var: VarRef, demon: DemonId) {
        self.when(var, EventKind::Domain, demon);
    }

    pub fn when_bound(&mut self, var: VarRef, demon: DemonId) {
        self.when(var, EventKind::Bound, demon);
    }

    /// Silences the demon in the subtree below the current node.
    pub fn inhibit(&mut self, demon: DemonId) {
        let cell = self.demons[demon].inhibited;
        self.trail.set(cell, 1);
    }

    pub fn desinhibit(&mut self, demon: DemonId) {
        let cell = self.demons[demon].inhibited;
        self.trail.set(cell, 0);
    }

    /// Schedules the demon, unless inhibited or already pending under the
    /// current queue stamp.
    pub fn enqueue_demon(&mut self, d: DemonId) {
        let State { demons, trail, queue, .. } = self;
        let demon = &mut demons[d];
        if trail.value(demon.inhibited) != 0 {
            return;
        }
        if demon.stamp == queue.stamp() {
            return;
        }
        demon.stamp = queue.stamp();
        queue.push(demon.priority, d);
    }

    /// Pops the next runnable demon, rewinding its stamp so that fresh events
    /// may re-enqueue it within this fixpoint. Demons inhibited while pending
    /// are dropped here.
    pub(crate) fn next_demon(&mut self) -> Option<(DemonPriority, DemonId)> {
        loop {
            let (priority, d) = self.queue.pop()?;
            let State { demons, trail, queue, .. } = self;
            let demon = &mut demons[d];
            demon.stamp = queue.stamp() - 1;
            if trail.value(demon.inhibited) != 0 {
                continue;
            }
            return Some((priority, d));
        }
    }

    pub(crate) fn demon_target(&self, d: DemonId) -> (ConstraintId, u32) {
        let demon = &self.demons[d];
        (demon.constraint, demon.tag)
    }

    // ---------- events ----------

    /// Records the mutation of `var` (previous bounds, optional interior
    /// removal) in the sweep scratch and schedules the matching listeners:
    /// range first, then domain, then bound.
    pub(crate) fn fire(&mut self, var: VarRef, pre_min: IntCst, pre_max: IntCst, interior: Option<IntCst>) {
        let d = &mut self.doms[var];
        if !d.sweep.dirty {
            d.sweep.dirty = true;
            d.sweep.old_min = pre_min;
            d.sweep.old_max = pre_max;
            self.dirty.push(var);
        }
        if let Some(v) = interior {
            d.sweep.holes.push(v);
        }
        let (new_min, new_max) = self.bounds(var);
        let range_changed = new_min > pre_min || new_max < pre_max;
        let bound_now = new_min == new_max && pre_min != pre_max;
        if range_changed {
            self.schedule_list(var, EventKind::Range);
        }
        self.schedule_list(var, EventKind::Domain);
        if bound_now {
            self.schedule_list(var, EventKind::Bound);
        }
    }

    fn schedule_list(&mut self, var: VarRef, kind: EventKind) {
        let n = {
            let l = &self.listeners[var];
            match kind {
                EventKind::Range => l.on_range.len(&self.trail),
                EventKind::Domain => l.on_domain.len(&self.trail),
                EventKind::Bound => l.on_bound.len(&self.trail),
            }
        };
        for i in 0..n {
            let d = {
                let l = &self.listeners[var];
                match kind {
                    EventKind::Range => l.on_range.get(i),
                    EventKind::Domain => l.on_domain.get(i),
                    EventKind::Bound => l.on_bound.get(i),
                }
            };
            self.enqueue_demon(d);
        }
    }

    /// Minimum of the variable before the current sweep touched it; equals
    /// the current minimum outside a sweep.
    pub fn old_min(&self, var: VarRef) -> IntCst {
        let d = &self.doms[var];
        if d.sweep.dirty {
            d.sweep.old_min
        } else {
            self.min(var)
        }
    }

    pub fn old_max(&self, var: VarRef) -> IntCst {
        let d = &self.doms[var];
        if d.sweep.dirty {
            d.sweep.old_max
        } else {
            self.max(var)
        }
    }

    /// Interior values removed since the variable's demons were scheduled.
    /// Meaningful only inside the invocation of such a demon; empty outside a
    /// sweep.
    pub fn hole_iter(&self, var: VarRef) -> impl Iterator<Item = IntCst> + '_ {
        let d = &self.doms[var];
        let holes: &[IntCst] = if d.sweep.dirty { &d.sweep.holes } else { &[] };
        holes.iter().copied()
    }

    /// Clears the sweep scratch of every touched variable. Called when the
    /// queue drains and when a failure unwinds propagation.
    pub(crate) fn end_sweep(&mut self) {
        while let Some(v) = self.dirty.pop() {
            self.doms[v].sweep.clear();
        }
    }

    // ---------- queue control ----------

    /// Batches several mutations before any demon runs.
    pub fn freeze_queue(&mut self) {
        self.queue.freeze();
    }

    pub fn unfreeze_queue(&mut self) {
        self.queue.unfreeze();
    }

    /// One-shot hook invoked on failure before control returns to the search
    /// driver.
    pub fn set_fail_action(&mut self, action: FailAction) {
        self.queue.fail_action = Some(action);
    }

    pub fn clear_fail_action(&mut self) {
        self.queue.fail_action = None;
    }

    /// Failure bookkeeping: runs the fail action, drops all pending demons
    /// and resets the sweep scratch. The trail is untouched; backtracking is
    /// the driver's job.
    pub(crate) fn unwind_fail(&mut self) {
        if let Some(mut action) = self.queue.fail_action.take() {
            action(self);
        }
        self.queue.clear();
        self.end_sweep();
    }

    // ---------- markers ----------

    pub(crate) fn push_marker(&mut self) -> TrailLoc {
        self.trail.push_marker()
    }

    pub(crate) fn pop_to(&mut self, loc: TrailLoc) {
        self.trail.pop_to(loc);
    }

    // ---------- randomness ----------

    /// Uniform draw in `[0, n)` from the solver-owned deterministic source.
    pub fn rand64(&mut self, n: u64) -> u64 {
        assert!(n > 0, "rand64 over an empty range");
        self.rng.gen_range(0..n)
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MAX_VALID_VALUE;

    fn cid() -> ConstraintId {
        ConstraintId::from_u32(0)
    }

    #[test]
    fn bounds_and_membership() {
        let mut s = State::new();
        let v = s.new_var(0, 10);
        assert_eq!(s.bounds(v), (0, 10));
        assert_eq!(s.size(v), 11);
        assert!(s.contains(v, 0));
        assert!(s.contains(v, 10));
        assert!(!s.contains(v, 11));
        assert!(!s.bound(v));
    }

    #[test]
    fn set_min_advances_past_holes() {
        let mut s = State::new();
        let v = s.new_var(0, 10);
        s.remove_value(v, 3).unwrap();
        s.remove_value(v, 4).unwrap();
        s.set_min(v, 3).unwrap();
        assert_eq!(s.min(v), 5);
        assert_eq!(s.size(v), 6);
    }

    #[test]
    fn remove_extremal_value_moves_bound() {
        let mut s = State::new();
        let v = s.new_var(0, 5);
        s.remove_value(v, 1).unwrap();
        s.remove_value(v, 0).unwrap();
        assert_eq!(s.min(v), 2);
        s.remove_value(v, 5).unwrap();
        assert_eq!(s.max(v), 4);
        assert_eq!(s.size(v), 3);
    }

    #[test]
    fn wipeout_is_reported_not_materialized() {
        let mut s = State::new();
        let v = s.new_var(0, 5);
        assert_eq!(s.set_min(v, 6), Err(crate::core::EmptyDomain(v)));
        // the failed operation left the domain intact
        assert_eq!(s.bounds(v), (0, 5));
        s.set_value(v, 2).unwrap();
        assert_eq!(s.remove_value(v, 2), Err(crate::core::EmptyDomain(v)));
        assert_eq!(s.value(v), 2);
    }

    #[test]
    fn noop_mutations_fire_nothing() {
        let mut s = State::new();
        let v = s.new_var(0, 5);
        let d = s.make_demon(cid(), 0, DemonPriority::Normal);
        s.when_range(v, d);
        s.when_domain(v, d);
        s.set_min(v, 0).unwrap();
        s.set_min(v, -3).unwrap();
        s.remove_value(v, 42).unwrap();
        assert!(s.queue.is_empty());
    }

    #[test]
    fn events_reach_matching_listeners() {
        let mut s = State::new();
        let v = s.new_var(0, 5);
        let on_range = s.make_demon(cid(), 0, DemonPriority::Normal);
        let on_bound = s.make_demon(cid(), 1, DemonPriority::Normal);
        s.when_range(v, on_range);
        s.when_bound(v, on_bound);

        s.remove_value(v, 3).unwrap();
        // interior removal: no range event, no bound event
        assert!(s.queue.is_empty());

        s.set_min(v, 2).unwrap();
        let popped = s.next_demon().unwrap().1;
        assert_eq!(popped, on_range);
        assert!(s.queue.is_empty());

        s.set_value(v, 5).unwrap();
        let a = s.next_demon().unwrap().1;
        let b = s.next_demon().unwrap().1;
        assert_eq!((a, b), (on_range, on_bound));
    }

    #[test]
    fn enqueue_is_deduplicated_until_popped() {
        let mut s = State::new();
        let v = s.new_var(0, 100);
        let d = s.make_demon(cid(), 0, DemonPriority::Normal);
        s.when_range(v, d);
        s.set_min(v, 1).unwrap();
        s.set_min(v, 2).unwrap();
        s.set_min(v, 3).unwrap();
        assert!(s.next_demon().is_some());
        assert!(s.next_demon().is_none());
        // once popped, a fresh event re-enqueues it within the same fixpoint
        s.set_min(v, 4).unwrap();
        assert!(s.next_demon().is_some());
        assert!(s.next_demon().is_none());
    }

    #[test]
    fn priorities_are_served_in_order() {
        let mut s = State::new();
        let v = s.new_var(0, 10);
        let slow = s.make_demon(cid(), 0, DemonPriority::Delayed);
        let norm = s.make_demon(cid(), 1, DemonPriority::Normal);
        let fast = s.make_demon(cid(), 2, DemonPriority::Var);
        s.when_range(v, slow);
        s.when_range(v, norm);
        s.when_range(v, fast);
        s.set_min(v, 5).unwrap();
        assert_eq!(s.next_demon().unwrap().1, fast);
        assert_eq!(s.next_demon().unwrap().1, norm);
        assert_eq!(s.next_demon().unwrap().1, slow);
    }

    #[test]
    fn inhibited_demons_stay_quiet() {
        let mut s = State::new();
        let v = s.new_var(0, 10);
        let d = s.make_demon(cid(), 0, DemonPriority::Normal);
        s.when_range(v, d);
        s.inhibit(d);
        s.set_min(v, 1).unwrap();
        assert!(s.next_demon().is_none());
        s.desinhibit(d);
        s.set_min(v, 2).unwrap();
        assert!(s.next_demon().is_some());
    }

    #[test]
    fn sweep_snapshot_and_holes() {
        let mut s = State::new();
        let v = s.new_var(0, 10);
        let d = s.make_demon(cid(), 0, DemonPriority::Normal);
        s.when_domain(v, d);
        s.remove_value(v, 4).unwrap();
        s.set_min(v, 2).unwrap();
        assert_eq!(s.old_min(v), 0);
        assert_eq!(s.old_max(v), 10);
        assert_eq!(s.hole_iter(v).collect::<Vec<_>>(), vec![4]);
        s.end_sweep();
        assert_eq!(s.old_min(v), 2);
        assert_eq!(s.hole_iter(v).count(), 0);
    }

    #[test]
    fn sparse_representation_far_bounds() {
        let mut s = State::new();
        let v = s.new_var(0, 1_000_000_000);
        assert_eq!(s.size(v), 1_000_000_001);
        s.remove_value(v, 500).unwrap();
        assert!(!s.contains(v, 500));
        assert_eq!(s.size(v), 1_000_000_000);
        s.set_min(v, 499).unwrap();
        s.set_min(v, 500).unwrap();
        assert_eq!(s.min(v), 501);
        s.set_max(v, 505).unwrap();
        assert_eq!(
            s.domain_iter(v).collect::<Vec<_>>(),
            vec![501, 502, 503, 504, 505]
        );
    }

    #[test]
    fn builder_inputs_are_clamped() {
        let mut s = State::new();
        let v = s.new_var(i64::MIN, i64::MAX);
        assert_eq!(s.bounds(v), (crate::core::MIN_VALID_VALUE, MAX_VALID_VALUE));
    }

    #[test]
    fn from_set_and_iteration() {
        let mut s = State::new();
        let v = s.new_var_from_set(&[7, 3, 3, 9]).unwrap();
        assert_eq!(s.bounds(v), (3, 9));
        assert_eq!(s.size(v), 3);
        assert_eq!(s.domain_iter(v).collect::<Vec<_>>(), vec![3, 7, 9]);
        assert!(s.new_var_from_set(&[]).is_err());
    }

    #[test]
    fn set_values_intersects() {
        let mut s = State::new();
        let v = s.new_var(0, 10);
        s.set_values(v, &[2, 4, 8]).unwrap();
        assert_eq!(s.domain_iter(v).collect::<Vec<_>>(), vec![2, 4, 8]);
        let w = s.new_var(0, 3);
        assert!(s.set_values(w, &[7, 9]).is_err());
    }

    #[test]
    fn remove_interval_abutting_and_interior() {
        let mut s = State::new();
        let v = s.new_var(0, 10);
        s.remove_interval(v, 0, 2).unwrap();
        assert_eq!(s.min(v), 3);
        s.remove_interval(v, 9, 12).unwrap();
        assert_eq!(s.max(v), 8);
        s.remove_interval(v, 5, 6).unwrap();
        assert_eq!(s.domain_iter(v).collect::<Vec<_>>(), vec![3, 4, 7, 8]);
    }

    #[test]
    fn backtracking_restores_domains_and_listeners() {
        let mut s = State::new();
        let v = s.new_var(0, 10);
        let m = s.push_marker();
        let d = s.make_demon(cid(), 0, DemonPriority::Normal);
        s.when_range(v, d);
        s.set_range(v, 2, 7).unwrap();
        s.remove_value(v, 5).unwrap();
        assert_eq!(s.size(v), 5);
        s.queue.clear();
        s.end_sweep();
        s.pop_to(m);
        assert_eq!(s.bounds(v), (0, 10));
        assert_eq!(s.size(v), 11);
        assert!(s.contains(v, 5));
        // the demon registered inside the popped node is gone
        s.set_min(v, 1).unwrap();
        assert!(s.queue.is_empty());
    }

    #[test]
    fn fail_action_is_one_shot() {
        use std::cell::Cell;
        use std::rc::Rc;
        let mut s = State::new();
        let v = s.new_var(0, 10);
        let d = s.make_demon(cid(), 0, DemonPriority::Normal);
        s.when_range(v, d);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        s.set_fail_action(Box::new(move |_s: &mut State| h.set(h.get() + 1)));
        s.set_min(v, 5).unwrap();
        assert!(!s.queue.is_empty());
        s.unwind_fail();
        assert_eq!(hits.get(), 1);
        // the queue was flushed and the hook consumed
        assert!(s.queue.is_empty());
        s.unwind_fail();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn rand_is_deterministic_per_seed() {
        let mut a = State::new();
        let mut b = State::new();
        let xs: Vec<u64> = (0..10).map(|_| a.rand64(1000)).collect();
        let ys: Vec<u64> = (0..10).map(|_| b.rand64(1000)).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|&x| x < 1000));
    }
}
