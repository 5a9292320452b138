use crate::core::state::State;
use crate::core::{DemonId, DemonPriority};
use std::collections::VecDeque;

/// Callback invoked once when a failure interrupts propagation, before
/// control returns to the search driver. Used by constraints to clean
/// per-variable scratch state.
pub type FailAction = Box<dyn FnMut(&mut State)>;

/// The pending-demon queue: one FIFO per priority, a freeze level and a
/// dedup stamp.
///
/// A demon carries the stamp under which it was last enqueued; enqueueing it
/// again under the same stamp is a no-op, and popping it rewinds its stamp so
/// that fresh events can re-enqueue it within the same fixpoint. The queue
/// stamp only advances while the queue is empty (after a failure cleared it,
/// or after a fixpoint drained it), so pending entries are never duplicated.
pub struct Queue {
    buckets: [VecDeque<DemonId>; DemonPriority::COUNT],
    stamp: u64,
    freeze_level: u32,
    pub(crate) fail_action: Option<FailAction>,
}

impl Default for Queue {
    fn default() -> Self {
        Queue::new()
    }
}

impl Queue {
    pub fn new() -> Self {
        Queue {
            buckets: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            stamp: 1,
            freeze_level: 0,
            fail_action: None,
        }
    }

    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub(crate) fn push(&mut self, priority: DemonPriority, demon: DemonId) {
        self.buckets[priority.index()].push_back(demon);
    }

    /// Pops the next demon to run. `Var` demons always go first, then
    /// `Normal`; `Delayed` demons are served only when both other buckets are
    /// empty, so any newly scheduled higher-priority demon preempts them.
    pub(crate) fn pop(&mut self) -> Option<(DemonPriority, DemonId)> {
        for (priority, bucket) in [
            (DemonPriority::Var, 0),
            (DemonPriority::Normal, 1),
            (DemonPriority::Delayed, 2),
        ] {
            if let Some(d) = self.buckets[bucket].pop_front() {
                return Some((priority, d));
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.is_empty())
    }

    /// Empties all buckets and advances the dedup stamp, releasing the
    /// cleared demons for future scheduling.
    pub(crate) fn clear(&mut self) {
        for b in &mut self.buckets {
            b.clear();
        }
        self.stamp += 1;
    }

    /// Advances the dedup stamp once a fixpoint has drained the queue.
    pub(crate) fn bump_stamp(&mut self) {
        debug_assert!(self.is_empty());
        self.stamp += 1;
    }

    pub fn freeze(&mut self) {
        self.freeze_level += 1;
    }

    pub fn unfreeze(&mut self) {
        debug_assert!(self.freeze_level > 0, "unfreeze without matching freeze");
        self.freeze_level = self.freeze_level.saturating_sub(1);
    }

    pub fn frozen(&self) -> bool {
        self.freeze_level > 0
    }
}
