//! Expression IR, binding, and canonical form

use pochard_common::{Attribute, Error, LogicalType, Result, Value};

/// Binary operators over column vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Comparison
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,

    // Logical
    And,
    Or,
}

impl BinaryOperator {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    /// Result type given the left operand's type: arithmetic keeps it,
    /// comparisons and logicals produce Boolean.
    pub fn result_type(&self, left: &LogicalType) -> LogicalType {
        if self.is_arithmetic() {
            *left
        } else {
            LogicalType::Boolean
        }
    }

    /// Rendering symbol for generated program text
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Equal => "==",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }
}

/// A tagged expression tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Named column reference, not yet resolved against a schema
    Column {
        name: String,
        data_type: LogicalType,
        nullable: bool,
    },

    /// Column reference resolved to an ordinal position in the batch.
    /// `name` is display metadata only and is stripped by
    /// canonicalization.
    BoundRef {
        ordinal: usize,
        data_type: LogicalType,
        nullable: bool,
        name: String,
    },

    /// Constant scalar
    Literal(Value),

    /// Numeric conversion
    Cast { child: Box<Expr>, to: LogicalType },

    /// Binary operation
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Boolean negation
    Not(Box<Expr>),
}

impl Expr {
    /// The output type this node produces
    pub fn data_type(&self) -> LogicalType {
        match self {
            Expr::Column { data_type, .. } => *data_type,
            Expr::BoundRef { data_type, .. } => *data_type,
            Expr::Literal(v) => v.logical_type(),
            Expr::Cast { to, .. } => *to,
            Expr::BinaryOp { left, op, .. } => op.result_type(&left.data_type()),
            Expr::Not(_) => LogicalType::Boolean,
        }
    }

    /// Whether this node can produce nulls
    pub fn nullable(&self) -> bool {
        match self {
            Expr::Column { nullable, .. } => *nullable,
            Expr::BoundRef { nullable, .. } => *nullable,
            Expr::Literal(v) => v.is_null(),
            Expr::Cast { child, .. } => child.nullable(),
            Expr::BinaryOp { left, right, .. } => left.nullable() || right.nullable(),
            Expr::Not(child) => child.nullable(),
        }
    }

    // Constructors

    pub fn column(name: impl Into<String>, data_type: LogicalType, nullable: bool) -> Expr {
        Expr::Column {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn bound(
        ordinal: usize,
        data_type: LogicalType,
        nullable: bool,
        name: impl Into<String>,
    ) -> Expr {
        Expr::BoundRef {
            ordinal,
            data_type,
            nullable,
            name: name.into(),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn cast(child: Expr, to: LogicalType) -> Expr {
        Expr::Cast {
            child: Box::new(child),
            to,
        }
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn add(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::Add, right)
    }

    pub fn sub(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::Subtract, right)
    }

    pub fn mul(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::Multiply, right)
    }

    pub fn div(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::Divide, right)
    }

    pub fn rem(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::Modulo, right)
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::Equal, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::GreaterThan, right)
    }

    pub fn ge(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::GreaterThanOrEqual, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::LessThan, right)
    }

    pub fn le(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::LessThanOrEqual, right)
    }

    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::And, right)
    }

    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::Or, right)
    }

    pub fn not(child: Expr) -> Expr {
        Expr::Not(Box::new(child))
    }
}

/// Resolve named column references to ordinal positions in `schema`.
/// Name matching is case-insensitive; type and nullability come from
/// the schema, the original name is kept for display.
pub fn bind(expr: &Expr, schema: &[Attribute]) -> Result<Expr> {
    match expr {
        Expr::Column { name, .. } => {
            let needle = name.to_lowercase();
            let (ordinal, attr) = schema
                .iter()
                .enumerate()
                .find(|(_, a)| a.name.to_lowercase() == needle)
                .ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
            Ok(Expr::BoundRef {
                ordinal,
                data_type: attr.data_type,
                nullable: attr.nullable,
                name: name.clone(),
            })
        }
        Expr::BoundRef { .. } | Expr::Literal(_) => Ok(expr.clone()),
        Expr::Cast { child, to } => Ok(Expr::cast(bind(child, schema)?, *to)),
        Expr::BinaryOp { left, op, right } => {
            Ok(Expr::binary(bind(left, schema)?, *op, bind(right, schema)?))
        }
        Expr::Not(child) => Ok(Expr::not(bind(child, schema)?)),
    }
}

/// Rewrite a tree into its canonical form: display metadata stripped,
/// nullability normalized to the conservative value, child ordering
/// preserved. Pure and idempotent; trees that canonicalize equal are
/// semantically interchangeable and share one compiled projection.
pub fn canonicalize(expr: &Expr) -> Expr {
    match expr {
        Expr::Column {
            name, data_type, ..
        } => Expr::Column {
            name: name.to_lowercase(),
            data_type: *data_type,
            nullable: true,
        },
        Expr::BoundRef {
            ordinal, data_type, ..
        } => Expr::BoundRef {
            ordinal: *ordinal,
            data_type: *data_type,
            nullable: true,
            name: String::new(),
        },
        Expr::Literal(v) => Expr::Literal(v.clone()),
        Expr::Cast { child, to } => Expr::cast(canonicalize(child), *to),
        Expr::BinaryOp { left, op, right } => {
            Expr::binary(canonicalize(left), *op, canonicalize(right))
        }
        Expr::Not(child) => Expr::not(canonicalize(child)),
    }
}
