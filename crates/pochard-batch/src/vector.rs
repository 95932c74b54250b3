//! Column vectors
//!
//! A `ColumnVector` is one column's worth of a batch: a typed storage
//! body plus an optional not-null bitmap (`None` means "all non-null").
//! Numeric vectors borrow a slab from the batch pool; Boolean vectors
//! store their values as a bitmap; Varchar vectors own their strings.
//! A literal vector carries a single scalar, answers every typed get
//! with it, and is immutable.

use crate::bitmap::Bitmap;
use crate::pool::Slab;
use pochard_common::{LogicalType, Value};

/// Storage body of a column vector
#[derive(Debug, Clone)]
pub enum ColumnData {
    /// Fixed-width numeric values in a pool-borrowed slab
    Slab(Slab),
    /// Owned strings; content at null positions is undefined
    Strings(Vec<String>),
    /// Boolean values, one bit per row
    Boolean(Bitmap),
    /// A single scalar answering every index
    Literal(Value),
}

/// A typed view over column storage with an optional not-null mask
#[derive(Debug, Clone)]
pub struct ColumnVector {
    data_type: LogicalType,
    data: ColumnData,
    not_null: Option<Bitmap>,
}

impl ColumnVector {
    /// Wrap a pool-borrowed slab. The slab width must match the type.
    pub fn from_slab(data_type: LogicalType, slab: Slab) -> Self {
        assert_eq!(
            data_type.slab_width(),
            Some(slab.width()),
            "slab width does not match {data_type}"
        );
        ColumnVector {
            data_type,
            data: ColumnData::Slab(slab),
            not_null: None,
        }
    }

    /// A Varchar vector of `rows` empty strings
    pub fn strings(rows: usize) -> Self {
        ColumnVector {
            data_type: LogicalType::Varchar,
            data: ColumnData::Strings(vec![String::new(); rows]),
            not_null: None,
        }
    }

    /// A Boolean vector wrapping a value bitmap
    pub fn boolean(bits: Bitmap) -> Self {
        ColumnVector {
            data_type: LogicalType::Boolean,
            data: ColumnData::Boolean(bits),
            not_null: None,
        }
    }

    /// A literal-scalar vector
    pub fn literal(value: Value) -> Self {
        ColumnVector {
            data_type: value.logical_type(),
            data: ColumnData::Literal(value),
            not_null: None,
        }
    }

    pub fn data_type(&self) -> LogicalType {
        self.data_type
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.data, ColumnData::Literal(_))
    }

    /// The not-null bitmap; `None` means every row is valid
    pub fn not_null(&self) -> Option<&Bitmap> {
        self.not_null.as_ref()
    }

    pub fn set_not_null(&mut self, not_null: Option<Bitmap>) {
        self.not_null = not_null;
    }

    /// Rows this vector can hold; literal vectors answer any index
    pub fn capacity(&self) -> usize {
        match &self.data {
            ColumnData::Slab(s) => s.len(),
            ColumnData::Strings(v) => v.len(),
            ColumnData::Boolean(b) => b.available_bits(),
            ColumnData::Literal(_) => usize::MAX,
        }
    }

    /// The value bitmap of a Boolean vector
    pub fn bits(&self) -> &Bitmap {
        match &self.data {
            ColumnData::Boolean(b) => b,
            _ => panic!("bits() on non-boolean vector"),
        }
    }

    /// Reclaim the backing slab, if this vector has one
    pub fn into_slab(self) -> Option<Slab> {
        match self.data {
            ColumnData::Slab(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_i32(&self, idx: usize) -> i32 {
        match &self.data {
            ColumnData::Slab(s) if self.data_type == LogicalType::Integer => s.get_i32(idx),
            ColumnData::Literal(Value::Integer(v)) => *v,
            _ => panic!("get_i32 on {} vector", self.data_type),
        }
    }

    pub fn set_i32(&mut self, idx: usize, v: i32) {
        match &mut self.data {
            ColumnData::Slab(s) if self.data_type == LogicalType::Integer => s.set_i32(idx, v),
            _ => panic!("set_i32 on {} vector", self.data_type),
        }
    }

    pub fn get_i64(&self, idx: usize) -> i64 {
        match &self.data {
            ColumnData::Slab(s) if self.data_type == LogicalType::BigInt => s.get_i64(idx),
            ColumnData::Literal(Value::BigInt(v)) => *v,
            _ => panic!("get_i64 on {} vector", self.data_type),
        }
    }

    pub fn set_i64(&mut self, idx: usize, v: i64) {
        match &mut self.data {
            ColumnData::Slab(s) if self.data_type == LogicalType::BigInt => s.set_i64(idx, v),
            _ => panic!("set_i64 on {} vector", self.data_type),
        }
    }

    pub fn get_f32(&self, idx: usize) -> f32 {
        match &self.data {
            ColumnData::Slab(s) if self.data_type == LogicalType::Float => s.get_f32(idx),
            ColumnData::Literal(Value::Float(v)) => *v,
            _ => panic!("get_f32 on {} vector", self.data_type),
        }
    }

    pub fn set_f32(&mut self, idx: usize, v: f32) {
        match &mut self.data {
            ColumnData::Slab(s) if self.data_type == LogicalType::Float => s.set_f32(idx, v),
            _ => panic!("set_f32 on {} vector", self.data_type),
        }
    }

    pub fn get_f64(&self, idx: usize) -> f64 {
        match &self.data {
            ColumnData::Slab(s) if self.data_type == LogicalType::Double => s.get_f64(idx),
            ColumnData::Literal(Value::Double(v)) => *v,
            _ => panic!("get_f64 on {} vector", self.data_type),
        }
    }

    pub fn set_f64(&mut self, idx: usize, v: f64) {
        match &mut self.data {
            ColumnData::Slab(s) if self.data_type == LogicalType::Double => s.set_f64(idx, v),
            _ => panic!("set_f64 on {} vector", self.data_type),
        }
    }

    pub fn get_bool(&self, idx: usize) -> bool {
        match &self.data {
            ColumnData::Boolean(b) => b.get(idx),
            ColumnData::Literal(Value::Boolean(v)) => *v,
            _ => panic!("get_bool on {} vector", self.data_type),
        }
    }

    pub fn set_bool(&mut self, idx: usize, v: bool) {
        match &mut self.data {
            ColumnData::Boolean(b) => {
                if v {
                    b.set(idx);
                } else {
                    b.clear(idx);
                }
            }
            _ => panic!("set_bool on {} vector", self.data_type),
        }
    }

    pub fn get_str(&self, idx: usize) -> &str {
        match &self.data {
            ColumnData::Strings(v) => &v[idx],
            ColumnData::Literal(Value::Varchar(s)) => s,
            _ => panic!("get_str on {} vector", self.data_type),
        }
    }

    pub fn set_string(&mut self, idx: usize, v: String) {
        match &mut self.data {
            ColumnData::Strings(strings) => strings[idx] = v,
            _ => panic!("set_string on {} vector", self.data_type),
        }
    }

    /// Materialize one row as a `Value`, honoring the not-null mask
    pub fn get_value(&self, idx: usize) -> Value {
        if let Some(nn) = &self.not_null {
            if !nn.get(idx) {
                return Value::Null;
            }
        }
        match self.data_type {
            LogicalType::Boolean => Value::Boolean(self.get_bool(idx)),
            LogicalType::Integer => Value::Integer(self.get_i32(idx)),
            LogicalType::BigInt => Value::BigInt(self.get_i64(idx)),
            LogicalType::Float => Value::Float(self.get_f32(idx)),
            LogicalType::Double => Value::Double(self.get_f64(idx)),
            LogicalType::Varchar => Value::Varchar(self.get_str(idx).to_string()),
            LogicalType::Null => Value::Null,
        }
    }
}
