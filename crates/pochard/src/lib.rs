//! Pochard - Vectorized expression evaluation for columnar batches
//!
//! Pochard compiles bound expression trees into cached projections and
//! runs them against row batches of column vectors:
//! - null masks and row selection flow through packed bitmaps
//! - compiled projections are cached by canonical expression form
//! - numeric columns live in fixed-width slabs borrowed from the
//!   batch's memory pool
//!
//! # Example
//!
//! ```rust
//! use pochard::{Attribute, Expr, LogicalType, ProjectionFactory, RowBatch};
//!
//! let schema = vec![Attribute::new("x", LogicalType::Integer, true)];
//! let mut batch = RowBatch::build(&schema, 4).unwrap();
//! for i in 0..4 {
//!     batch.column_mut(0).set_i32(i, i as i32);
//! }
//!
//! let factory = ProjectionFactory::new();
//! let projection = factory
//!     .project(
//!         &Expr::add(Expr::column("x", LogicalType::Integer, true), Expr::literal(10)),
//!         &schema,
//!     )
//!     .unwrap();
//!
//! let out = projection.apply(&mut batch).unwrap();
//! assert_eq!(out.get_i32(3), 13);
//! ```

pub use pochard_batch as batch;
pub use pochard_codegen as codegen;
pub use pochard_common as common;
pub use pochard_expr as expr;

pub use pochard_batch::{and_with_null, Bitmap, ColumnVector, MemoryPool, RowBatch, Slab};
pub use pochard_codegen::{Projection, ProjectionFactory, RowProjection};
pub use pochard_common::{Attribute, Error, LogicalType, Result, Value};
pub use pochard_expr::{bind, canonicalize, BinaryOperator, Expr};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn int_batch(values: &[i32]) -> (Vec<Attribute>, RowBatch) {
        let schema = vec![Attribute::new("v", LogicalType::Integer, true)];
        let mut batch = RowBatch::build(&schema, values.len()).unwrap();
        for (i, v) in values.iter().enumerate() {
            batch.column_mut(0).set_i32(i, *v);
        }
        (schema, batch)
    }

    #[test]
    fn test_project_binds_and_compiles() {
        let (schema, mut batch) = int_batch(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let factory = ProjectionFactory::new();
        let projection = factory
            .project(
                &Expr::add(Expr::column("V", LogicalType::Integer, true), Expr::literal(10)),
                &schema,
            )
            .unwrap();
        let out = projection.apply(&mut batch).unwrap();
        for i in 0..8 {
            assert_eq!(out.get_i32(i), 11 + i as i32);
        }
        batch.free();
    }

    #[test]
    fn test_metadata_variants_share_one_artifact() {
        let factory = ProjectionFactory::new();
        let a = factory
            .compile(&Expr::add(
                Expr::bound(0, LogicalType::Integer, true, "price"),
                Expr::literal(1),
            ))
            .unwrap();
        let b = factory
            .compile(&Expr::add(
                Expr::bound(0, LogicalType::Integer, false, "PRICE"),
                Expr::literal(1),
            ))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.cached(), 1);
    }

    #[test]
    fn test_shared_factory_across_threads() {
        let factory = Arc::new(ProjectionFactory::new());
        let expr = Expr::gt(
            Expr::bound(0, LogicalType::Integer, true, "v"),
            Expr::literal(50),
        );

        let mut handles = Vec::new();
        for t in 0..4 {
            let factory = factory.clone();
            let expr = expr.clone();
            handles.push(std::thread::spawn(move || {
                let projection = factory.compile(&expr).unwrap();
                let schema = vec![Attribute::new("v", LogicalType::Integer, true)];
                let mut batch = RowBatch::build(&schema, 8).unwrap();
                for i in 0..8 {
                    batch.column_mut(0).set_i32(i, (t * 25 + i) as i32);
                }
                let out = projection.apply(&mut batch).unwrap();
                (0..8).filter(|&i| out.get_bool(i)).count()
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(factory.cached(), 1);
    }

    #[test]
    fn test_nested_expression_end_to_end() {
        // (v * 2 > 8) && !(v == 3)
        let (schema, mut batch) = int_batch(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let v = || Expr::column("v", LogicalType::Integer, true);
        let expr = Expr::and(
            Expr::gt(Expr::mul(v(), Expr::literal(2)), Expr::literal(8)),
            Expr::not(Expr::eq(v(), Expr::literal(3))),
        );

        let factory = ProjectionFactory::new();
        let projection = factory.project(&expr, &schema).unwrap();
        let out = projection.apply(&mut batch).unwrap();
        let expected = [false, false, false, false, true, true, true, true];
        for i in 0..8 {
            assert_eq!(out.get_bool(i), expected[i], "row {i}");
        }
    }

    #[test]
    fn test_selector_and_nulls_together() {
        let (schema, mut batch) = int_batch(&[10, 20, 30, 40, 50, 60, 70, 80]);
        let mut not_null = Bitmap::all_set(8);
        not_null.clear(2);
        batch.column_mut(0).set_not_null(Some(not_null));
        let mut selector = Bitmap::all_set(8);
        selector.clear(5);
        batch.set_selector(Some(selector));

        let factory = ProjectionFactory::new();
        let projection = factory
            .project(
                &Expr::add(Expr::column("v", LogicalType::Integer, true), Expr::literal(1)),
                &schema,
            )
            .unwrap();
        let out = projection.apply(&mut batch).unwrap();

        let nn = out.not_null().unwrap();
        // Null input row stays null; selected valid rows carry values.
        assert!(!nn.get(2));
        for i in [0, 1, 3, 4, 6, 7] {
            assert!(nn.get(i), "row {i}");
            assert_eq!(out.get_i32(i), 10 * (i as i32 + 1) + 1);
        }
    }

    #[test]
    fn test_compile_error_surfaces() {
        let factory = ProjectionFactory::new();
        let err = factory
            .compile(&Expr::rem(
                Expr::bound(0, LogicalType::Double, true, "v"),
                Expr::literal(2.0),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedExpression(_)));
    }
}
