//! Pochard Batch - The columnar data model
//!
//! A `RowBatch` is a horizontal slice of a relation: parallel column
//! vectors with a shared row count, an optional selection bitmap, and a
//! memory pool that owns the fixed-width slabs backing the numeric
//! columns.

pub mod batch;
pub mod bitmap;
pub mod pool;
pub mod vector;

pub use batch::RowBatch;
pub use bitmap::{and_with_null, Bitmap};
pub use pool::{MemoryPool, Slab};
pub use vector::{ColumnData, ColumnVector};

pub use pochard_common::Attribute;
