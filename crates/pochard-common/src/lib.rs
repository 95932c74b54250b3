//! Pochard Common - Shared vocabulary for the expression engine
//!
//! Types, runtime values, schema attributes, and the error enum used by
//! every other Pochard crate.

mod error;
mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use schema::Attribute;
pub use types::LogicalType;
pub use value::Value;
