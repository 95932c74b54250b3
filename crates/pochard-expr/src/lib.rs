//! Pochard Expr - Expression trees for vectorized evaluation
//!
//! The tagged `Expr` tree is what the planner hands to the code
//! generator: column references (named or resolved to ordinals),
//! literals, casts, binary operators, and boolean negation. `bind`
//! resolves names against a schema; `canonicalize` produces the stable
//! form the projection cache keys on.

mod expr;

pub use expr::{bind, canonicalize, BinaryOperator, Expr};
