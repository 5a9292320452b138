//! A finite-domain constraint programming kernel.
//!
//! The crate provides the propagation engine and reversible search kernel of a
//! CP solver: a trail that makes every mutation undoable on backtrack, integer
//! variables with bound and domain events, a priority queue of demons driven
//! to fixpoint, and a tree-search driver that alternates decision, propagation
//! and backtracking. Constraints are clients of this kernel: they post demons
//! on the events of the variables they watch and tighten domains when invoked.
//!
//! ```
//! use lyra::solver::search::{ValueStrategy, VarStrategy, VarValueBuilder};
//! use lyra::solver::Solver;
//!
//! let mut solver = Solver::new();
//! let x = solver.new_int_var(1, 3);
//! let y = solver.new_int_var(1, 3);
//! solver.add_constraint(lyra::constraints::range::Ne::new(x, y, 0));
//!
//! let db = VarValueBuilder::new(
//!     vec![x, y],
//!     VarStrategy::FirstUnbound,
//!     ValueStrategy::Min,
//! );
//! solver.new_search(Box::new(db));
//! assert!(solver.next_solution());
//! assert_eq!(solver.state.min(x), 1);
//! assert_eq!(solver.state.min(y), 2);
//! solver.end_search();
//! ```

pub mod backtrack;
pub mod collections;
pub mod constraints;
pub mod core;
pub mod solver;

pub use crate::core::{IntCst, IntervalRef, VarRef, MAX_VALID_VALUE, MIN_VALID_VALUE};
pub use crate::solver::Solver;
