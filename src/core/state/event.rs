use crate::backtrack::{RevList, Trail};
use crate::core::{DemonId, IntCst};

/// The kinds of domain events a demon can listen to.
///
/// Within one mutation the listener lists are notified in the order
/// range, domain, bound.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EventKind {
    /// The min or the max of the variable was tightened.
    Range,
    /// Any change to the domain, including bound moves and value removals.
    Domain,
    /// The variable became bound (min reached max).
    Bound,
}

/// Per-variable listener lists. Registrations made inside a branch are undone
/// on backtrack through the reversible length of each list.
pub(crate) struct Listeners {
    pub on_range: RevList<DemonId>,
    pub on_domain: RevList<DemonId>,
    pub on_bound: RevList<DemonId>,
}

impl Listeners {
    pub fn new(trail: &mut Trail) -> Self {
        Listeners {
            on_range: RevList::new(trail),
            on_domain: RevList::new(trail),
            on_bound: RevList::new(trail),
        }
    }
}

/// Scratch describing the modifications of one variable since its demons were
/// scheduled. Valid for the duration of one propagation sweep only; reset
/// when the queue drains or when a failure unwinds the sweep. Never trailed.
pub(crate) struct Sweep {
    pub dirty: bool,
    pub old_min: IntCst,
    pub old_max: IntCst,
    /// Values removed from the interior of the domain during this sweep.
    /// Bound moves are not recorded here: they are visible through
    /// `old_min`/`old_max`.
    pub holes: Vec<IntCst>,
}

impl Sweep {
    pub fn new() -> Self {
        Sweep {
            dirty: false,
            old_min: 0,
            old_max: 0,
            holes: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.dirty = false;
        self.holes.clear();
    }
}
