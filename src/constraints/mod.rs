pub mod alldiff;
pub mod interval;
pub mod linear;
pub mod minmax;
pub mod range;
pub mod reif;

use crate::core::state::State;
use crate::core::{ConstraintId, EmptyDomain};

/// A constraint of the model.
///
/// A constraint exists through its demons: [`Constraint::post`] registers
/// them on the events of the watched variables, and
/// [`Constraint::initial_propagate`] seeds the fixpoint once from the initial
/// domains. Afterwards the engine only calls back through
/// [`Constraint::propagate`], with the tag of whichever demon fired.
///
/// Constraints should be idempotent at fixpoint: propagating twice in a row
/// on the same domains must leave them unchanged.
pub trait Constraint {
    fn post(&mut self, state: &mut State, id: ConstraintId);

    fn initial_propagate(&mut self, state: &mut State) -> Result<(), EmptyDomain>;

    /// Incremental propagation; `tag` identifies the demon that fired. The
    /// default re-runs the initial propagation, the usual choice for cheap
    /// constraints.
    fn propagate(&mut self, state: &mut State, tag: u32) -> Result<(), EmptyDomain> {
        let _ = tag;
        self.initial_propagate(state)
    }

    /// Name used by the tracing output.
    fn name(&self) -> &str {
        "constraint"
    }
}
