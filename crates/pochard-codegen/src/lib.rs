//! Pochard Codegen - Runtime code generation for vectorized projections
//!
//! A bound expression tree is lowered into a straight-line register
//! program whose instructions are executed by type-specialized kernels
//! over the batch's column buffers. Compiled projections are cached by
//! the tree's canonical form; the compiler itself runs under a single
//! process-wide lock.

pub mod cache;
pub mod compile;
pub mod program;
pub mod projection;

pub use cache::ProjectionCache;
pub use compile::ProjectionFactory;
pub use program::{fresh_name, Program};
pub use projection::{Projection, RowProjection};
