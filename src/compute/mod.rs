//! Compute layer: geometry primitives and the simplification algorithms.
//!
//! The algorithms never touch `geo` directly; they go through
//! [`engine::GeometryEngine`] so that the boolean overlay can be swapped or
//! made to fail in tests.

pub mod engine;
pub mod gap_fill;
pub mod simplify;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{GeometryEngine, PlanarEngine};
pub use gap_fill::{GapFillStats, GapFilled, GapFiller};
pub use simplify::{GridSimplifier, Simplified, SimplifyStats};
