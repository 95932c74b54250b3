//! Compiled projection programs
//!
//! A `Program` is the lowered form of one expression tree: a dense
//! register table and a straight-line instruction sequence ending in
//! the result register. Registers carry symbolic `vec$N` / `nn$N`
//! names from the process-wide fresh-name allocator; the `Display`
//! rendering of a program is the "generated source" attached to
//! compile failures.

use pochard_common::{Error, LogicalType, Result, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `prefix$<n>` with a process-wide post-incremented counter. Names
/// are unique well beyond the one-compilation scope that requires it.
pub fn fresh_name(prefix: &str) -> String {
    let n = NAME_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{prefix}${n}")
}

/// Index of a virtual register within one program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg(pub usize);

/// Per-register metadata
#[derive(Debug, Clone)]
pub struct RegInfo {
    /// Symbolic name of the result column vector
    pub vec_name: String,
    /// Symbolic name of the result not-null bitmap
    pub nn_name: String,
    pub data_type: LogicalType,
}

/// Arithmetic kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    fn symbol(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }
}

/// Comparison kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        }
    }
}

/// One lowered statement
#[derive(Debug, Clone)]
pub enum Instr {
    /// Bound reference: expose the batch column at `ordinal`
    LoadColumn {
        ordinal: usize,
        data_type: LogicalType,
        dst: Reg,
    },
    /// Literal: a constant-answering vector
    LoadLiteral { value: Value, dst: Reg },
    /// Numeric conversion (unary map template)
    Cast {
        from: LogicalType,
        to: LogicalType,
        src: Reg,
        dst: Reg,
    },
    /// Arithmetic over two same-typed numeric columns (binary map template)
    Arith {
        op: ArithOp,
        data_type: LogicalType,
        lhs: Reg,
        rhs: Reg,
        dst: Reg,
    },
    /// Comparison producing a boolean column (binary map template)
    Compare {
        op: CmpOp,
        data_type: LogicalType,
        lhs: Reg,
        rhs: Reg,
        dst: Reg,
    },
    /// Bitwise AND of two boolean columns
    AndBits { lhs: Reg, rhs: Reg, dst: Reg },
    /// Bitwise OR of two boolean columns
    OrBits { lhs: Reg, rhs: Reg, dst: Reg },
    /// Complement of a boolean column, masked to valid selected rows
    NotBits { src: Reg, dst: Reg },
}

impl Instr {
    pub fn dst(&self) -> Reg {
        match self {
            Instr::LoadColumn { dst, .. }
            | Instr::LoadLiteral { dst, .. }
            | Instr::Cast { dst, .. }
            | Instr::Arith { dst, .. }
            | Instr::Compare { dst, .. }
            | Instr::AndBits { dst, .. }
            | Instr::OrBits { dst, .. }
            | Instr::NotBits { dst, .. } => *dst,
        }
    }

    fn sources(&self) -> Vec<Reg> {
        match self {
            Instr::LoadColumn { .. } | Instr::LoadLiteral { .. } => vec![],
            Instr::Cast { src, .. } | Instr::NotBits { src, .. } => vec![*src],
            Instr::Arith { lhs, rhs, .. }
            | Instr::Compare { lhs, rhs, .. }
            | Instr::AndBits { lhs, rhs, .. }
            | Instr::OrBits { lhs, rhs, .. } => vec![*lhs, *rhs],
        }
    }
}

/// A lowered expression: registers, statements, result register
#[derive(Debug, Clone)]
pub struct Program {
    pub instrs: Vec<Instr>,
    pub regs: Vec<RegInfo>,
    pub result: Reg,
}

impl Program {
    pub fn new() -> Self {
        Program {
            instrs: Vec::new(),
            regs: Vec::new(),
            result: Reg(0),
        }
    }

    /// Allocate a register with fresh symbolic names
    pub fn push_reg(&mut self, data_type: LogicalType) -> Reg {
        let reg = Reg(self.regs.len());
        self.regs.push(RegInfo {
            vec_name: fresh_name("vec"),
            nn_name: fresh_name("nn"),
            data_type,
        });
        reg
    }

    pub fn push_instr(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    /// Check register wiring and per-instruction type agreement.
    /// Lowering only produces well-formed programs; this is the last
    /// line of defense before a projection is handed out.
    pub fn verify(&self) -> Result<()> {
        let mut defined = vec![false; self.regs.len()];

        for instr in &self.instrs {
            for src in instr.sources() {
                if src.0 >= self.regs.len() || !defined[src.0] {
                    return Err(Error::Internal(format!(
                        "use of undefined register #{}",
                        src.0
                    )));
                }
            }
            let dst = instr.dst();
            if dst.0 >= self.regs.len() {
                return Err(Error::Internal(format!(
                    "write to unallocated register #{}",
                    dst.0
                )));
            }
            if defined[dst.0] {
                return Err(Error::Internal(format!(
                    "register #{} written twice",
                    dst.0
                )));
            }
            self.verify_types(instr)?;
            defined[dst.0] = true;
        }

        if self.result.0 >= self.regs.len() || !defined[self.result.0] {
            return Err(Error::Internal("result register never written".to_string()));
        }
        Ok(())
    }

    fn verify_types(&self, instr: &Instr) -> Result<()> {
        let expect = |reg: Reg, dt: LogicalType| -> Result<()> {
            let actual = self.regs[reg.0].data_type;
            if actual != dt {
                return Err(Error::TypeMismatch {
                    expected: dt.to_string(),
                    got: actual.to_string(),
                });
            }
            Ok(())
        };

        match instr {
            Instr::LoadColumn { data_type, dst, .. } => expect(*dst, *data_type),
            Instr::LoadLiteral { value, dst } => expect(*dst, value.logical_type()),
            Instr::Cast { from, to, src, dst } => {
                expect(*src, *from)?;
                expect(*dst, *to)
            }
            Instr::Arith {
                data_type,
                lhs,
                rhs,
                dst,
                ..
            } => {
                expect(*lhs, *data_type)?;
                expect(*rhs, *data_type)?;
                expect(*dst, *data_type)
            }
            Instr::Compare {
                data_type,
                lhs,
                rhs,
                dst,
                ..
            } => {
                expect(*lhs, *data_type)?;
                expect(*rhs, *data_type)?;
                expect(*dst, LogicalType::Boolean)
            }
            Instr::AndBits { lhs, rhs, dst } | Instr::OrBits { lhs, rhs, dst } => {
                expect(*lhs, LogicalType::Boolean)?;
                expect(*rhs, LogicalType::Boolean)?;
                expect(*dst, LogicalType::Boolean)
            }
            Instr::NotBits { src, dst } => {
                expect(*src, LogicalType::Boolean)?;
                expect(*dst, LogicalType::Boolean)
            }
        }
    }

    fn names(&self, reg: Reg) -> (&str, &str) {
        (&self.regs[reg.0].vec_name, &self.regs[reg.0].nn_name)
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in &self.instrs {
            let (vec, nn) = self.names(instr.dst());
            match instr {
                Instr::LoadColumn {
                    ordinal, data_type, ..
                } => writeln!(f, "{vec}: {data_type}, {nn} = column #{ordinal}")?,
                Instr::LoadLiteral { value, .. } => {
                    writeln!(f, "{vec}: {}, {nn} = literal {value}", value.logical_type())?
                }
                Instr::Cast { from, to, src, .. } => {
                    let (child, child_nn) = self.names(*src);
                    writeln!(f, "{vec}: {to}, {nn} = cast<{from} -> {to}>({child}, {child_nn})")?
                }
                Instr::Arith {
                    op,
                    data_type,
                    lhs,
                    rhs,
                    ..
                } => {
                    let (l, lnn) = self.names(*lhs);
                    let (r, rnn) = self.names(*rhs);
                    writeln!(
                        f,
                        "{vec}: {data_type}, {nn} = map({l} {} {r}, {lnn} & {rnn} & sel)",
                        op.symbol()
                    )?
                }
                Instr::Compare {
                    op,
                    data_type,
                    lhs,
                    rhs,
                    ..
                } => {
                    let (l, lnn) = self.names(*lhs);
                    let (r, rnn) = self.names(*rhs);
                    writeln!(
                        f,
                        "{vec}: BOOLEAN, {nn} = map<{data_type}>({l} {} {r}, {lnn} & {rnn} & sel)",
                        op.symbol()
                    )?
                }
                Instr::AndBits { lhs, rhs, .. } => {
                    let (l, _) = self.names(*lhs);
                    let (r, _) = self.names(*rhs);
                    writeln!(f, "{vec}: BOOLEAN, {nn} = bits({l} & {r})")?
                }
                Instr::OrBits { lhs, rhs, .. } => {
                    let (l, _) = self.names(*lhs);
                    let (r, _) = self.names(*rhs);
                    writeln!(f, "{vec}: BOOLEAN, {nn} = bits({l} | {r})")?
                }
                Instr::NotBits { src, .. } => {
                    let (child, child_nn) = self.names(*src);
                    writeln!(f, "{vec}: BOOLEAN, {nn} = bits(!{child} & sel & {child_nn})")?
                }
            }
        }
        let (vec, _) = self.names(self.result);
        writeln!(f, "result = {vec}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_name_is_monotonic() {
        let a = fresh_name("vec");
        let b = fresh_name("vec");
        let na: u64 = a.strip_prefix("vec$").unwrap().parse().unwrap();
        let nb: u64 = b.strip_prefix("vec$").unwrap().parse().unwrap();
        assert!(nb > na);
    }

    #[test]
    fn test_verify_accepts_wellformed() {
        let mut p = Program::new();
        let a = p.push_reg(LogicalType::Integer);
        let b = p.push_reg(LogicalType::Integer);
        let c = p.push_reg(LogicalType::Integer);
        p.push_instr(Instr::LoadColumn {
            ordinal: 0,
            data_type: LogicalType::Integer,
            dst: a,
        });
        p.push_instr(Instr::LoadLiteral {
            value: Value::Integer(1),
            dst: b,
        });
        p.push_instr(Instr::Arith {
            op: ArithOp::Add,
            data_type: LogicalType::Integer,
            lhs: a,
            rhs: b,
            dst: c,
        });
        p.result = c;
        p.verify().unwrap();
    }

    #[test]
    fn test_verify_rejects_undefined_source() {
        let mut p = Program::new();
        let a = p.push_reg(LogicalType::Boolean);
        let b = p.push_reg(LogicalType::Boolean);
        p.push_instr(Instr::NotBits { src: b, dst: a });
        p.result = a;
        assert!(p.verify().is_err());
    }

    #[test]
    fn test_verify_rejects_type_disagreement() {
        let mut p = Program::new();
        let a = p.push_reg(LogicalType::Integer);
        let b = p.push_reg(LogicalType::Double);
        let c = p.push_reg(LogicalType::Integer);
        p.push_instr(Instr::LoadColumn {
            ordinal: 0,
            data_type: LogicalType::Integer,
            dst: a,
        });
        p.push_instr(Instr::LoadColumn {
            ordinal: 1,
            data_type: LogicalType::Double,
            dst: b,
        });
        p.push_instr(Instr::Arith {
            op: ArithOp::Add,
            data_type: LogicalType::Integer,
            lhs: a,
            rhs: b,
            dst: c,
        });
        p.result = c;
        assert!(p.verify().is_err());
    }

    #[test]
    fn test_render_mentions_symbolic_names() {
        let mut p = Program::new();
        let a = p.push_reg(LogicalType::Integer);
        p.push_instr(Instr::LoadColumn {
            ordinal: 2,
            data_type: LogicalType::Integer,
            dst: a,
        });
        p.result = a;
        let text = p.to_string();
        assert!(text.contains("column #2"));
        assert!(text.contains(&p.regs[0].vec_name));
        assert!(text.contains("result ="));
    }
}
