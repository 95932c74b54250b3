//! Row batches
//!
//! A `RowBatch` bundles the column vectors of one horizontal slice of a
//! relation with the selection bitmap left behind by upstream operators
//! and the memory pool that owns the numeric slabs. A batch belongs to
//! one thread at a time; its pool is not synchronized.

use crate::bitmap::Bitmap;
use crate::pool::MemoryPool;
use crate::vector::ColumnVector;
use hashbrown::HashMap;
use pochard_common::{Attribute, Error, LogicalType, Result};

/// A batch of named column vectors with a shared row count
#[derive(Debug)]
pub struct RowBatch {
    /// Declared number of rows; every vector holds at least this many
    pub row_num: usize,
    /// One vector per attribute, in schema order
    pub vectors: Vec<ColumnVector>,
    /// Rows logically live after upstream filtering; `None` = all rows
    pub cur_selector: Option<Bitmap>,
    /// Owns the slabs behind the numeric vectors
    pub pool: MemoryPool,
    attrs: Vec<Attribute>,
    /// Lowercased name -> ordinal
    ordinals: HashMap<String, usize>,
}

impl RowBatch {
    /// Allocate one column vector per attribute, each backed by a
    /// pool-borrowed slab or type-specific storage.
    pub fn build(attrs: &[Attribute], row_num: usize) -> Result<RowBatch> {
        let mut pool = MemoryPool::new(row_num);
        let mut vectors = Vec::with_capacity(attrs.len());
        let mut ordinals = HashMap::with_capacity(attrs.len());

        for (ord, attr) in attrs.iter().enumerate() {
            let vector = match (attr.data_type, attr.data_type.slab_width()) {
                (dt, Some(width)) => ColumnVector::from_slab(dt, pool.borrow_slab(width)),
                (LogicalType::Boolean, None) => ColumnVector::boolean(Bitmap::new(row_num)),
                (LogicalType::Varchar, None) => ColumnVector::strings(row_num),
                (dt, None) => {
                    return Err(Error::Internal(format!(
                        "no columnar storage for type {dt}"
                    )))
                }
            };
            vectors.push(vector);
            ordinals.insert(attr.name.to_lowercase(), ord);
        }

        Ok(RowBatch {
            row_num,
            vectors,
            cur_selector: None,
            pool,
            attrs: attrs.to_vec(),
            ordinals,
        })
    }

    pub fn column_count(&self) -> usize {
        self.vectors.len()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attrs
    }

    /// Resolve a column name to its ordinal (case-insensitive)
    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.ordinals.get(&name.to_lowercase()).copied()
    }

    pub fn column(&self, ord: usize) -> &ColumnVector {
        &self.vectors[ord]
    }

    pub fn column_mut(&mut self, ord: usize) -> &mut ColumnVector {
        &mut self.vectors[ord]
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnVector> {
        self.ordinal_of(name).map(|ord| &self.vectors[ord])
    }

    /// Install (or clear) the row selector. A present selector must
    /// cover exactly `row_num` rows.
    pub fn set_selector(&mut self, selector: Option<Bitmap>) {
        if let Some(sel) = &selector {
            assert_eq!(
                sel.available_bits(),
                self.row_num,
                "selector must cover row_num rows"
            );
        }
        self.cur_selector = selector;
    }

    /// Retire the batch: hand every slab back and drop the pool's free
    /// lists. Consumes the batch, so teardown runs exactly once.
    pub fn free(mut self) {
        for vector in self.vectors.drain(..) {
            if let Some(slab) = vector.into_slab() {
                self.pool.return_slab(slab);
            }
        }
        self.pool.release();
    }
}
