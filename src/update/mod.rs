// ============================================================================
// Update Module
// ============================================================================
//
// Store write operations, pending/error markers, and the
// optimistic/success/failure triples built around each mutation.
//
// ============================================================================

pub mod markers;
pub mod operation;
pub mod triple;

pub use markers::PendingAction;
pub use operation::{KeyWrite, UpdateOperation};
pub use triple::{Branch, TripleBuilder, UpdateTriple};
