//! Lowering bound expression trees to programs
//!
//! `ProjectionFactory` is the engine's entry point: it canonicalizes
//! the tree, consults the projection cache, and on a miss lowers the
//! tree into a `Program` under the compile lock. Type constraints are
//! enforced here, so a cached projection can run without per-row
//! checks.

use crate::cache::ProjectionCache;
use crate::program::{ArithOp, CmpOp, Instr, Program, Reg};
use crate::projection::{Projection, RowProjection};
use log::trace;
use pochard_common::{Attribute, Error, LogicalType, Result};
use pochard_expr::{bind, canonicalize, BinaryOperator, Expr};
use std::sync::Arc;

/// Compiles bound expression trees into cached projections.
///
/// The factory is `Send + Sync`; any number of threads may share one
/// instance. Cache hits take no lock beyond a read guard, cache misses
/// serialize on the compile lock.
pub struct ProjectionFactory {
    cache: ProjectionCache,
}

impl ProjectionFactory {
    /// A factory with the default cache capacity
    pub fn new() -> Self {
        ProjectionFactory {
            cache: ProjectionCache::new(),
        }
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        ProjectionFactory {
            cache: ProjectionCache::with_capacity(capacity),
        }
    }

    /// Compile a bound tree, reusing the cached projection when one
    /// exists for its canonical form.
    pub fn compile(&self, expr: &Expr) -> Result<Arc<Projection>> {
        let key = canonicalize(expr);
        self.cache.get_or_compile(key, |canonical| {
            let program = lower(canonical)?;
            trace!("lowered projection:\n{program}");
            Ok(Projection::new(program))
        })
    }

    /// Bind `expr` against `schema`, then compile
    pub fn project(&self, expr: &Expr, schema: &[Attribute]) -> Result<Arc<Projection>> {
        self.compile(&bind(expr, schema)?)
    }

    /// Compile a composed projection: one named output column per
    /// expression, with the output schema derived from the bound trees.
    pub fn project_row(
        &self,
        columns: &[(String, Expr)],
        schema: &[Attribute],
    ) -> Result<RowProjection> {
        let mut output = Vec::with_capacity(columns.len());
        let mut projections = Vec::with_capacity(columns.len());
        for (name, expr) in columns {
            let bound = bind(expr, schema)?;
            output.push(Attribute::new(
                name.clone(),
                bound.data_type(),
                bound.nullable(),
            ));
            projections.push(self.compile(&bound)?);
        }
        Ok(RowProjection::new(output, projections))
    }

    /// Number of cached projections (for diagnostics and tests)
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl Default for ProjectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower a bound tree into a verified program
pub(crate) fn lower(expr: &Expr) -> Result<Program> {
    let mut program = Program::new();
    let result = emit(&mut program, expr)?;
    program.result = result;
    program.verify().map_err(|e| Error::CompileFailure {
        message: e.to_string(),
        program: program.to_string(),
    })?;
    Ok(program)
}

fn emit(program: &mut Program, expr: &Expr) -> Result<Reg> {
    match expr {
        Expr::Column { name, .. } => Err(Error::UnsupportedExpression(format!(
            "unbound column reference '{name}'"
        ))),

        Expr::BoundRef {
            ordinal, data_type, ..
        } => {
            let dst = program.push_reg(*data_type);
            program.push_instr(Instr::LoadColumn {
                ordinal: *ordinal,
                data_type: *data_type,
                dst,
            });
            Ok(dst)
        }

        Expr::Literal(value) => {
            if value.is_null() {
                return Err(Error::UnsupportedExpression(
                    "untyped null literal".to_string(),
                ));
            }
            let dst = program.push_reg(value.logical_type());
            program.push_instr(Instr::LoadLiteral {
                value: value.clone(),
                dst,
            });
            Ok(dst)
        }

        Expr::Cast { child, to } => {
            let from = child.data_type();
            if !from.is_numeric() || !to.is_numeric() {
                return Err(Error::UnsupportedExpression(format!(
                    "cast from {from} to {to}"
                )));
            }
            let src = emit(program, child)?;
            let dst = program.push_reg(*to);
            program.push_instr(Instr::Cast {
                from,
                to: *to,
                src,
                dst,
            });
            Ok(dst)
        }

        Expr::BinaryOp { left, op, right } => emit_binary(program, left, *op, right),

        Expr::Not(child) => {
            if child.data_type() != LogicalType::Boolean {
                return Err(Error::TypeMismatch {
                    expected: LogicalType::Boolean.to_string(),
                    got: child.data_type().to_string(),
                });
            }
            let src = emit(program, child)?;
            let dst = program.push_reg(LogicalType::Boolean);
            program.push_instr(Instr::NotBits { src, dst });
            Ok(dst)
        }
    }
}

fn emit_binary(
    program: &mut Program,
    left: &Expr,
    op: BinaryOperator,
    right: &Expr,
) -> Result<Reg> {
    let lt = left.data_type();
    let rt = right.data_type();

    if op.is_logical() {
        for dt in [lt, rt] {
            if dt != LogicalType::Boolean {
                return Err(Error::TypeMismatch {
                    expected: LogicalType::Boolean.to_string(),
                    got: dt.to_string(),
                });
            }
        }
        let lhs = emit(program, left)?;
        let rhs = emit(program, right)?;
        let dst = program.push_reg(LogicalType::Boolean);
        program.push_instr(match op {
            BinaryOperator::And => Instr::AndBits { lhs, rhs, dst },
            BinaryOperator::Or => Instr::OrBits { lhs, rhs, dst },
            _ => unreachable!(),
        });
        return Ok(dst);
    }

    // Arithmetic and comparison operate on matching primitive types.
    if lt != rt {
        return Err(Error::TypeMismatch {
            expected: lt.to_string(),
            got: rt.to_string(),
        });
    }

    if op.is_arithmetic() {
        if !lt.is_numeric() {
            return Err(Error::UnsupportedExpression(format!(
                "{} on {lt} operands",
                op.symbol()
            )));
        }
        if op == BinaryOperator::Modulo && !lt.is_integer() {
            return Err(Error::UnsupportedExpression(format!(
                "% requires integer operands, got {lt}"
            )));
        }
        let lhs = emit(program, left)?;
        let rhs = emit(program, right)?;
        let dst = program.push_reg(lt);
        program.push_instr(Instr::Arith {
            op: arith_op(op),
            data_type: lt,
            lhs,
            rhs,
            dst,
        });
        return Ok(dst);
    }

    // Comparison. Ordered comparisons need numeric operands; equality
    // additionally covers Boolean and Varchar.
    debug_assert!(op.is_comparison());
    let ordered = op != BinaryOperator::Equal;
    if ordered && !lt.is_numeric() {
        return Err(Error::UnsupportedExpression(format!(
            "{} on {lt} operands",
            op.symbol()
        )));
    }
    if !ordered && lt == LogicalType::Null {
        return Err(Error::UnsupportedExpression("== on NULL operands".to_string()));
    }
    let lhs = emit(program, left)?;
    let rhs = emit(program, right)?;
    let dst = program.push_reg(LogicalType::Boolean);
    program.push_instr(Instr::Compare {
        op: cmp_op(op),
        data_type: lt,
        lhs,
        rhs,
        dst,
    });
    Ok(dst)
}

fn arith_op(op: BinaryOperator) -> ArithOp {
    match op {
        BinaryOperator::Add => ArithOp::Add,
        BinaryOperator::Subtract => ArithOp::Sub,
        BinaryOperator::Multiply => ArithOp::Mul,
        BinaryOperator::Divide => ArithOp::Div,
        BinaryOperator::Modulo => ArithOp::Rem,
        _ => unreachable!("not an arithmetic operator"),
    }
}

fn cmp_op(op: BinaryOperator) -> CmpOp {
    match op {
        BinaryOperator::Equal => CmpOp::Eq,
        BinaryOperator::GreaterThan => CmpOp::Gt,
        BinaryOperator::GreaterThanOrEqual => CmpOp::Ge,
        BinaryOperator::LessThan => CmpOp::Lt,
        BinaryOperator::LessThanOrEqual => CmpOp::Le,
        _ => unreachable!("not a comparison operator"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_col() -> Expr {
        Expr::bound(0, LogicalType::Integer, true, "x")
    }

    #[test]
    fn test_lower_add() {
        let program = lower(&Expr::add(int_col(), Expr::literal(10))).unwrap();
        assert_eq!(program.instrs.len(), 3);
        assert!(matches!(
            program.instrs[2],
            Instr::Arith {
                op: ArithOp::Add,
                data_type: LogicalType::Integer,
                ..
            }
        ));
    }

    #[test]
    fn test_cast_to_float_keeps_float_type() {
        let program = lower(&Expr::cast(int_col(), LogicalType::Float)).unwrap();
        assert_eq!(program.regs[program.result.0].data_type, LogicalType::Float);
    }

    #[test]
    fn test_mismatched_arith_operands() {
        let expr = Expr::add(int_col(), Expr::literal(10i64));
        let err = lower(&expr).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_modulo_requires_integer() {
        let expr = Expr::rem(
            Expr::bound(0, LogicalType::Double, true, "x"),
            Expr::literal(3.0),
        );
        let err = lower(&expr).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExpression(_)));
    }

    #[test]
    fn test_rem_allows_bigint() {
        let expr = Expr::rem(
            Expr::bound(0, LogicalType::BigInt, true, "x"),
            Expr::literal(3i64),
        );
        let program = lower(&expr).unwrap();
        assert!(matches!(
            program.instrs[2],
            Instr::Arith {
                op: ArithOp::Rem,
                data_type: LogicalType::BigInt,
                ..
            }
        ));
    }

    #[test]
    fn test_ordered_compare_rejects_varchar() {
        let expr = Expr::gt(
            Expr::bound(0, LogicalType::Varchar, true, "s"),
            Expr::literal("a"),
        );
        let err = lower(&expr).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExpression(_)));
    }

    #[test]
    fn test_equal_accepts_varchar() {
        let expr = Expr::eq(
            Expr::bound(0, LogicalType::Varchar, true, "s"),
            Expr::literal("a"),
        );
        lower(&expr).unwrap();
    }

    #[test]
    fn test_cast_rejects_varchar() {
        let expr = Expr::cast(
            Expr::bound(0, LogicalType::Varchar, true, "s"),
            LogicalType::Integer,
        );
        let err = lower(&expr).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExpression(_)));
    }

    #[test]
    fn test_unbound_column_is_rejected() {
        let expr = Expr::column("x", LogicalType::Integer, true);
        let err = lower(&expr).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExpression(_)));
    }

    #[test]
    fn test_logical_requires_boolean() {
        let expr = Expr::and(int_col(), Expr::literal(true));
        let err = lower(&expr).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
