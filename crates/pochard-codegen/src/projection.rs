//! Projection runtime
//!
//! A compiled projection executes its program against one row batch on
//! the calling thread: registers resolve to batch columns or owned
//! intermediate vectors, each instruction runs a type-specialized
//! kernel, and intermediate slabs go back to the batch pool when the
//! frame is torn down. Inputs are never mutated.

use crate::program::{ArithOp, CmpOp, Instr, Program, Reg};
use pochard_batch::{and_with_null, Bitmap, ColumnVector, RowBatch};
use pochard_common::{Attribute, Error, LogicalType, Result};
use std::borrow::Cow;
use std::sync::Arc;

/// A compiled single-expression projection
#[derive(Debug)]
pub struct Projection {
    program: Program,
}

impl Projection {
    pub(crate) fn new(program: Program) -> Self {
        Projection { program }
    }

    /// The result type of this projection
    pub fn data_type(&self) -> LogicalType {
        self.program.regs[self.program.result.0].data_type
    }

    /// Rendered program text, as attached to compile failures
    pub fn program_text(&self) -> String {
        self.program.to_string()
    }

    /// Evaluate against a batch, producing a fresh result vector whose
    /// not-null bitmap and values are defined at every selected,
    /// all-inputs-valid row.
    pub fn apply(&self, batch: &mut RowBatch) -> Result<ColumnVector> {
        let mut slots: Vec<Slot> = (0..self.program.regs.len()).map(|_| Slot::Empty).collect();

        for instr in &self.program.instrs {
            exec(instr, &mut slots, batch)?;
        }

        let result = match std::mem::replace(&mut slots[self.program.result.0], Slot::Empty) {
            Slot::Owned(vector) => vector,
            Slot::Input(ordinal) => batch.vectors[ordinal].clone(),
            Slot::Empty => {
                return Err(Error::Internal("result register never written".to_string()))
            }
        };

        // Intermediates die here; hand their slabs back to the pool.
        for slot in slots {
            if let Slot::Owned(vector) = slot {
                if let Some(slab) = vector.into_slab() {
                    batch.pool.return_slab(slab);
                }
            }
        }

        Ok(result)
    }
}

/// A composed projection: one compiled expression per output column
pub struct RowProjection {
    output: Vec<Attribute>,
    projections: Vec<Arc<Projection>>,
}

impl RowProjection {
    pub(crate) fn new(output: Vec<Attribute>, projections: Vec<Arc<Projection>>) -> Self {
        RowProjection {
            output,
            projections,
        }
    }

    pub fn output_schema(&self) -> &[Attribute] {
        &self.output
    }

    /// Evaluate every output column against the batch, in schema order
    pub fn apply(&self, batch: &mut RowBatch) -> Result<Vec<ColumnVector>> {
        self.projections
            .iter()
            .map(|projection| projection.apply(batch))
            .collect()
    }
}

/// One register's state during an apply
enum Slot {
    Empty,
    /// The batch column at this ordinal (bound references alias, never copy)
    Input(usize),
    /// An intermediate owned by this frame
    Owned(ColumnVector),
}

fn resolve<'a>(slots: &'a [Slot], batch: &'a RowBatch, reg: Reg) -> Result<&'a ColumnVector> {
    match &slots[reg.0] {
        Slot::Input(ordinal) => Ok(&batch.vectors[*ordinal]),
        Slot::Owned(vector) => Ok(vector),
        Slot::Empty => Err(Error::Internal(format!(
            "read of unwritten register #{}",
            reg.0
        ))),
    }
}

/// Allocate a result vector for one instruction from the batch pool
fn alloc_result(batch: &mut RowBatch, data_type: LogicalType) -> Result<ColumnVector> {
    match data_type.slab_width() {
        Some(width) => Ok(ColumnVector::from_slab(
            data_type,
            batch.pool.borrow_slab(width),
        )),
        None if data_type == LogicalType::Boolean => {
            Ok(ColumnVector::boolean(Bitmap::new(batch.row_num)))
        }
        None => Err(Error::Internal(format!(
            "no result storage for type {data_type}"
        ))),
    }
}

/// Run `f` over every live row: the set bits of `mask` when present,
/// else the dense range.
fn for_each_row(mask: Option<&Bitmap>, row_num: usize, mut f: impl FnMut(usize)) {
    match mask {
        Some(mask) => mask.iter_set().for_each(&mut f),
        None => (0..row_num).for_each(&mut f),
    }
}

/// View a boolean operand as a value bitmap, materializing literals
fn boolean_bits<'a>(vector: &'a ColumnVector, row_num: usize) -> Cow<'a, Bitmap> {
    if vector.is_literal() {
        if vector.get_bool(0) {
            Cow::Owned(Bitmap::all_set(row_num))
        } else {
            Cow::Owned(Bitmap::new(row_num))
        }
    } else {
        Cow::Borrowed(vector.bits())
    }
}

fn exec(instr: &Instr, slots: &mut [Slot], batch: &mut RowBatch) -> Result<()> {
    let row_num = batch.row_num;

    match instr {
        Instr::LoadColumn {
            ordinal,
            data_type,
            dst,
        } => {
            let vector = batch.vectors.get(*ordinal).ok_or_else(|| {
                Error::Internal(format!(
                    "column ordinal {ordinal} out of bounds (have {})",
                    batch.vectors.len()
                ))
            })?;
            if vector.data_type() != *data_type {
                return Err(Error::Internal(format!(
                    "column #{ordinal} is {}, projection expects {data_type}",
                    vector.data_type()
                )));
            }
            slots[dst.0] = Slot::Input(*ordinal);
        }

        Instr::LoadLiteral { value, dst } => {
            slots[dst.0] = Slot::Owned(ColumnVector::literal(value.clone()));
        }

        Instr::Cast { from, to, src, dst } => {
            let mut out = alloc_result(batch, *to)?;
            let child = resolve(slots, batch, *src)?;
            let not_null = child.not_null().cloned();
            let mask = and_with_null(child.not_null(), batch.cur_selector.as_ref(), false);
            cast_kernel(*from, *to, child, &mut out, mask.as_deref(), row_num);
            drop(mask);
            out.set_not_null(not_null);
            slots[dst.0] = Slot::Owned(out);
        }

        Instr::Arith {
            op,
            data_type,
            lhs,
            rhs,
            dst,
        } => {
            let mut out = alloc_result(batch, *data_type)?;
            let left = resolve(slots, batch, *lhs)?;
            let right = resolve(slots, batch, *rhs)?;
            let mut not_null =
                and_with_null(left.not_null(), right.not_null(), true).map(Cow::into_owned);
            let mask = and_with_null(not_null.as_ref(), batch.cur_selector.as_ref(), false);

            // Rows whose divisor was zero; their result bit is cleared below.
            let mut zeroed = Vec::new();
            match data_type {
                LogicalType::Integer => {
                    arith_kernel::<i32>(*op, left, right, &mut out, mask.as_deref(), row_num, &mut zeroed)
                }
                LogicalType::BigInt => {
                    arith_kernel::<i64>(*op, left, right, &mut out, mask.as_deref(), row_num, &mut zeroed)
                }
                LogicalType::Float => {
                    arith_kernel::<f32>(*op, left, right, &mut out, mask.as_deref(), row_num, &mut zeroed)
                }
                LogicalType::Double => {
                    arith_kernel::<f64>(*op, left, right, &mut out, mask.as_deref(), row_num, &mut zeroed)
                }
                dt => return Err(Error::Internal(format!("arithmetic on {dt}"))),
            }
            drop(mask);

            if !zeroed.is_empty() {
                let bits = not_null.get_or_insert_with(|| Bitmap::all_set(row_num));
                for idx in zeroed {
                    bits.clear(idx);
                }
            }
            out.set_not_null(not_null);
            slots[dst.0] = Slot::Owned(out);
        }

        Instr::Compare {
            op,
            data_type,
            lhs,
            rhs,
            dst,
        } => {
            let mut out = alloc_result(batch, LogicalType::Boolean)?;
            let left = resolve(slots, batch, *lhs)?;
            let right = resolve(slots, batch, *rhs)?;
            let not_null =
                and_with_null(left.not_null(), right.not_null(), true).map(Cow::into_owned);
            let mask = and_with_null(not_null.as_ref(), batch.cur_selector.as_ref(), false);

            match data_type {
                LogicalType::Integer => {
                    compare_kernel::<i32>(*op, left, right, &mut out, mask.as_deref(), row_num)
                }
                LogicalType::BigInt => {
                    compare_kernel::<i64>(*op, left, right, &mut out, mask.as_deref(), row_num)
                }
                LogicalType::Float => {
                    compare_kernel::<f32>(*op, left, right, &mut out, mask.as_deref(), row_num)
                }
                LogicalType::Double => {
                    compare_kernel::<f64>(*op, left, right, &mut out, mask.as_deref(), row_num)
                }
                LogicalType::Boolean => for_each_row(mask.as_deref(), row_num, |i| {
                    out.set_bool(i, left.get_bool(i) == right.get_bool(i))
                }),
                LogicalType::Varchar => for_each_row(mask.as_deref(), row_num, |i| {
                    out.set_bool(i, left.get_str(i) == right.get_str(i))
                }),
                dt => return Err(Error::Internal(format!("comparison on {dt}"))),
            }
            drop(mask);

            out.set_not_null(not_null);
            slots[dst.0] = Slot::Owned(out);
        }

        Instr::AndBits { lhs, rhs, dst } | Instr::OrBits { lhs, rhs, dst } => {
            let left = resolve(slots, batch, *lhs)?;
            let right = resolve(slots, batch, *rhs)?;
            let not_null =
                and_with_null(left.not_null(), right.not_null(), true).map(Cow::into_owned);
            // Selector intersection is metadata only here; the bitwise
            // op below covers every row and unselected rows are
            // undefined by contract.
            let _live = and_with_null(not_null.as_ref(), batch.cur_selector.as_ref(), false);

            let left_bits = boolean_bits(left, row_num);
            let right_bits = boolean_bits(right, row_num);
            let bits = if matches!(instr, Instr::AndBits { .. }) {
                left_bits.and(&right_bits)
            } else {
                left_bits.or(&right_bits)
            };
            drop(_live);

            let mut out = ColumnVector::boolean(bits);
            out.set_not_null(not_null);
            slots[dst.0] = Slot::Owned(out);
        }

        Instr::NotBits { src, dst } => {
            let child = resolve(slots, batch, *src)?;
            let mut bits = boolean_bits(child, row_num).not();
            // Clear bits the complement may have raised at rows that
            // are unselected or null in the child.
            if let Some(mask) =
                and_with_null(child.not_null(), batch.cur_selector.as_ref(), false)
            {
                bits.and_assign(&mask);
            }
            let not_null = child.not_null().cloned();

            let mut out = ColumnVector::boolean(bits);
            out.set_not_null(not_null);
            slots[dst.0] = Slot::Owned(out);
        }
    }
    Ok(())
}

/// Primitive column element, the type parameter of the map kernels
trait Native: Copy + PartialOrd + PartialEq {
    fn load(vector: &ColumnVector, idx: usize) -> Self;
    fn store(vector: &mut ColumnVector, idx: usize, value: Self);
    fn add(a: Self, b: Self) -> Self;
    fn sub(a: Self, b: Self) -> Self;
    fn mul(a: Self, b: Self) -> Self;
    /// `None` when the platform operation has no defined result
    fn div(a: Self, b: Self) -> Option<Self>;
    fn rem(a: Self, b: Self) -> Option<Self>;
}

macro_rules! native_int {
    ($ty:ty, $get:ident, $set:ident) => {
        impl Native for $ty {
            fn load(vector: &ColumnVector, idx: usize) -> Self {
                vector.$get(idx)
            }
            fn store(vector: &mut ColumnVector, idx: usize, value: Self) {
                vector.$set(idx, value)
            }
            fn add(a: Self, b: Self) -> Self {
                a.wrapping_add(b)
            }
            fn sub(a: Self, b: Self) -> Self {
                a.wrapping_sub(b)
            }
            fn mul(a: Self, b: Self) -> Self {
                a.wrapping_mul(b)
            }
            fn div(a: Self, b: Self) -> Option<Self> {
                a.checked_div(b)
            }
            fn rem(a: Self, b: Self) -> Option<Self> {
                a.checked_rem(b)
            }
        }
    };
}

macro_rules! native_float {
    ($ty:ty, $get:ident, $set:ident) => {
        impl Native for $ty {
            fn load(vector: &ColumnVector, idx: usize) -> Self {
                vector.$get(idx)
            }
            fn store(vector: &mut ColumnVector, idx: usize, value: Self) {
                vector.$set(idx, value)
            }
            fn add(a: Self, b: Self) -> Self {
                a + b
            }
            fn sub(a: Self, b: Self) -> Self {
                a - b
            }
            fn mul(a: Self, b: Self) -> Self {
                a * b
            }
            fn div(a: Self, b: Self) -> Option<Self> {
                Some(a / b)
            }
            fn rem(a: Self, b: Self) -> Option<Self> {
                Some(a % b)
            }
        }
    };
}

native_int!(i32, get_i32, set_i32);
native_int!(i64, get_i64, set_i64);
native_float!(f32, get_f32, set_f32);
native_float!(f64, get_f64, set_f64);

fn arith_kernel<T: Native>(
    op: ArithOp,
    left: &ColumnVector,
    right: &ColumnVector,
    out: &mut ColumnVector,
    mask: Option<&Bitmap>,
    row_num: usize,
    zeroed: &mut Vec<usize>,
) {
    for_each_row(mask, row_num, |i| {
        let a = T::load(left, i);
        let b = T::load(right, i);
        match op {
            ArithOp::Add => T::store(out, i, T::add(a, b)),
            ArithOp::Sub => T::store(out, i, T::sub(a, b)),
            ArithOp::Mul => T::store(out, i, T::mul(a, b)),
            ArithOp::Div => match T::div(a, b) {
                Some(v) => T::store(out, i, v),
                None => zeroed.push(i),
            },
            ArithOp::Rem => match T::rem(a, b) {
                Some(v) => T::store(out, i, v),
                None => zeroed.push(i),
            },
        }
    });
}

fn compare_kernel<T: Native>(
    op: CmpOp,
    left: &ColumnVector,
    right: &ColumnVector,
    out: &mut ColumnVector,
    mask: Option<&Bitmap>,
    row_num: usize,
) {
    for_each_row(mask, row_num, |i| {
        let a = T::load(left, i);
        let b = T::load(right, i);
        let v = match op {
            CmpOp::Eq => a == b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
        };
        out.set_bool(i, v);
    });
}

fn cast_kernel(
    from: LogicalType,
    to: LogicalType,
    child: &ColumnVector,
    out: &mut ColumnVector,
    mask: Option<&Bitmap>,
    row_num: usize,
) {
    use LogicalType::*;
    // Integer narrowing wraps, float-to-integer follows Rust `as`.
    match (from, to) {
        (Integer, Integer) => for_each_row(mask, row_num, |i| out.set_i32(i, child.get_i32(i))),
        (Integer, BigInt) => {
            for_each_row(mask, row_num, |i| out.set_i64(i, child.get_i32(i) as i64))
        }
        (Integer, Float) => {
            for_each_row(mask, row_num, |i| out.set_f32(i, child.get_i32(i) as f32))
        }
        (Integer, Double) => {
            for_each_row(mask, row_num, |i| out.set_f64(i, child.get_i32(i) as f64))
        }
        (BigInt, Integer) => {
            for_each_row(mask, row_num, |i| out.set_i32(i, child.get_i64(i) as i32))
        }
        (BigInt, BigInt) => for_each_row(mask, row_num, |i| out.set_i64(i, child.get_i64(i))),
        (BigInt, Float) => {
            for_each_row(mask, row_num, |i| out.set_f32(i, child.get_i64(i) as f32))
        }
        (BigInt, Double) => {
            for_each_row(mask, row_num, |i| out.set_f64(i, child.get_i64(i) as f64))
        }
        (Float, Integer) => {
            for_each_row(mask, row_num, |i| out.set_i32(i, child.get_f32(i) as i32))
        }
        (Float, BigInt) => {
            for_each_row(mask, row_num, |i| out.set_i64(i, child.get_f32(i) as i64))
        }
        (Float, Float) => for_each_row(mask, row_num, |i| out.set_f32(i, child.get_f32(i))),
        (Float, Double) => {
            for_each_row(mask, row_num, |i| out.set_f64(i, child.get_f32(i) as f64))
        }
        (Double, Integer) => {
            for_each_row(mask, row_num, |i| out.set_i32(i, child.get_f64(i) as i32))
        }
        (Double, BigInt) => {
            for_each_row(mask, row_num, |i| out.set_i64(i, child.get_f64(i) as i64))
        }
        (Double, Float) => {
            for_each_row(mask, row_num, |i| out.set_f32(i, child.get_f64(i) as f32))
        }
        (Double, Double) => for_each_row(mask, row_num, |i| out.set_f64(i, child.get_f64(i))),
        (from, to) => unreachable!("cast {from} -> {to} passed verification"),
    }
}
