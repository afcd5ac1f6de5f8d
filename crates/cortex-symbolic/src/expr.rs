//! Symbolic expressions attached to concrete values as attributes.
//!
//! Expressions are immutable and shared through [`ExprRef`]; building a
//! new expression never touches its operands, so a parent path's values
//! stay valid after a child extends them.

use crate::{SymbolicError, SymbolicResult};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub type ExprRef = Arc<Expr>;

/// A named symbolic integer with an inclusive bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolicInteger {
    pub name: Arc<str>,
    pub min: i64,
    pub max: i64,
}

/// A named symbolic real with an inclusive bound.
#[derive(Debug, Clone)]
pub struct SymbolicReal {
    pub name: Arc<str>,
    pub min: f64,
    pub max: f64,
}

impl PartialEq for SymbolicReal {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.min.to_bits() == other.min.to_bits()
            && self.max.to_bits() == other.max.to_bits()
    }
}

impl Eq for SymbolicReal {}

impl Hash for SymbolicReal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.min.to_bits().hash(state);
        self.max.to_bits().hash(state);
    }
}

/// Integer operators, including the bitwise ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
}

impl IntOp {
    pub fn symbol(self) -> &'static str {
        match self {
            IntOp::Add => "+",
            IntOp::Sub => "-",
            IntOp::Mul => "*",
            IntOp::Div => "/",
            IntOp::Rem => "%",
            IntOp::And => "&",
            IntOp::Or => "|",
            IntOp::Xor => "^",
            IntOp::Shl => "<<",
            IntOp::Shr => ">>",
            IntOp::UShr => ">>>",
        }
    }

    /// Concrete evaluation with wrapping semantics. `None` for a zero divisor.
    pub fn apply(self, a: i64, b: i64) -> Option<i64> {
        Some(match self {
            IntOp::Add => a.wrapping_add(b),
            IntOp::Sub => a.wrapping_sub(b),
            IntOp::Mul => a.wrapping_mul(b),
            IntOp::Div => {
                if b == 0 {
                    return None;
                }
                a.wrapping_div(b)
            }
            IntOp::Rem => {
                if b == 0 {
                    return None;
                }
                a.wrapping_rem(b)
            }
            IntOp::And => a & b,
            IntOp::Or => a | b,
            IntOp::Xor => a ^ b,
            IntOp::Shl => a.wrapping_shl((b & 0x3f) as u32),
            IntOp::Shr => a.wrapping_shr((b & 0x3f) as u32),
            IntOp::UShr => ((a as u64) >> ((b & 0x3f) as u32)) as i64,
        })
    }
}

/// Real operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl RealOp {
    pub fn symbol(self) -> &'static str {
        match self {
            RealOp::Add => "+",
            RealOp::Sub => "-",
            RealOp::Mul => "*",
            RealOp::Div => "/",
            RealOp::Rem => "%",
        }
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            RealOp::Add => a + b,
            RealOp::Sub => a - b,
            RealOp::Mul => a * b,
            RealOp::Div => a / b,
            RealOp::Rem => a % b,
        }
    }
}

/// Sort of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    Int,
    Real,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Int => write!(f, "int"),
            Sort::Real => write!(f, "real"),
        }
    }
}

/// A symbolic expression.
#[derive(Debug, Clone)]
pub enum Expr {
    IntConst(i64),
    RealConst(f64),
    IntVar(SymbolicInteger),
    RealVar(SymbolicReal),
    IntBinary {
        op: IntOp,
        left: ExprRef,
        right: ExprRef,
    },
    RealBinary {
        op: RealOp,
        left: ExprRef,
        right: ExprRef,
    },
    IntNeg(ExprRef),
    RealNeg(ExprRef),
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expr::IntConst(a), Expr::IntConst(b)) => a == b,
            (Expr::RealConst(a), Expr::RealConst(b)) => a.to_bits() == b.to_bits(),
            (Expr::IntVar(a), Expr::IntVar(b)) => a == b,
            (Expr::RealVar(a), Expr::RealVar(b)) => a == b,
            (
                Expr::IntBinary { op, left, right },
                Expr::IntBinary {
                    op: op2,
                    left: left2,
                    right: right2,
                },
            ) => op == op2 && left == left2 && right == right2,
            (
                Expr::RealBinary { op, left, right },
                Expr::RealBinary {
                    op: op2,
                    left: left2,
                    right: right2,
                },
            ) => op == op2 && left == left2 && right == right2,
            (Expr::IntNeg(a), Expr::IntNeg(b)) => a == b,
            (Expr::RealNeg(a), Expr::RealNeg(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Expr::IntConst(n) => n.hash(state),
            Expr::RealConst(r) => r.to_bits().hash(state),
            Expr::IntVar(v) => v.hash(state),
            Expr::RealVar(v) => v.hash(state),
            Expr::IntBinary { op, left, right } => {
                op.hash(state);
                left.hash(state);
                right.hash(state);
            }
            Expr::RealBinary { op, left, right } => {
                op.hash(state);
                left.hash(state);
                right.hash(state);
            }
            Expr::IntNeg(e) | Expr::RealNeg(e) => e.hash(state),
        }
    }
}

impl Expr {
    pub fn int(n: i64) -> ExprRef {
        Arc::new(Expr::IntConst(n))
    }

    pub fn real(r: f64) -> ExprRef {
        Arc::new(Expr::RealConst(r))
    }

    pub fn int_var(name: impl Into<Arc<str>>, min: i64, max: i64) -> ExprRef {
        Arc::new(Expr::IntVar(SymbolicInteger {
            name: name.into(),
            min,
            max,
        }))
    }

    pub fn real_var(name: impl Into<Arc<str>>, min: f64, max: f64) -> ExprRef {
        Arc::new(Expr::RealVar(SymbolicReal {
            name: name.into(),
            min,
            max,
        }))
    }

    pub fn sort(&self) -> Sort {
        match self {
            Expr::IntConst(_) | Expr::IntVar(_) | Expr::IntBinary { .. } | Expr::IntNeg(_) => {
                Sort::Int
            }
            Expr::RealConst(_) | Expr::RealVar(_) | Expr::RealBinary { .. } | Expr::RealNeg(_) => {
                Sort::Real
            }
        }
    }

    /// The variable if this expression is a bare symbolic integer.
    pub fn as_int_var(&self) -> Option<&SymbolicInteger> {
        match self {
            Expr::IntVar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_const(&self) -> Option<i64> {
        match self {
            Expr::IntConst(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_real_const(&self) -> Option<f64> {
        match self {
            Expr::RealConst(r) => Some(*r),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Expr::IntConst(_) | Expr::RealConst(_))
    }

    /// Build `left op right` over integers. Constant operands fold.
    pub fn int_binary(op: IntOp, left: &ExprRef, right: &ExprRef) -> SymbolicResult<ExprRef> {
        expect_sort(left, Sort::Int, op.symbol())?;
        expect_sort(right, Sort::Int, op.symbol())?;
        if let (Some(a), Some(b)) = (left.as_int_const(), right.as_int_const()) {
            if let Some(v) = op.apply(a, b) {
                return Ok(Expr::int(v));
            }
        }
        Ok(Arc::new(Expr::IntBinary {
            op,
            left: left.clone(),
            right: right.clone(),
        }))
    }

    /// Build `left op right` over reals. Symbolic `%` has no constraint
    /// encoding and is rejected.
    pub fn real_binary(op: RealOp, left: &ExprRef, right: &ExprRef) -> SymbolicResult<ExprRef> {
        expect_sort(left, Sort::Real, op.symbol())?;
        expect_sort(right, Sort::Real, op.symbol())?;
        if let (Some(a), Some(b)) = (left.as_real_const(), right.as_real_const()) {
            return Ok(Expr::real(op.apply(a, b)));
        }
        if op == RealOp::Rem {
            return Err(SymbolicError::Unsupported(format!(
                "symbolic real remainder ({} % {})",
                left, right
            )));
        }
        Ok(Arc::new(Expr::RealBinary {
            op,
            left: left.clone(),
            right: right.clone(),
        }))
    }

    pub fn neg(operand: &ExprRef) -> ExprRef {
        match operand.as_ref() {
            Expr::IntConst(n) => Expr::int(n.wrapping_neg()),
            Expr::RealConst(r) => Expr::real(-r),
            _ if operand.sort() == Sort::Int => Arc::new(Expr::IntNeg(operand.clone())),
            _ => Arc::new(Expr::RealNeg(operand.clone())),
        }
    }

    /// Names of all variables occurring in this expression, in first-seen order.
    pub fn variables(&self, out: &mut Vec<Arc<str>>) {
        match self {
            Expr::IntConst(_) | Expr::RealConst(_) => {}
            Expr::IntVar(v) => push_unique(out, &v.name),
            Expr::RealVar(v) => push_unique(out, &v.name),
            Expr::IntBinary { left, right, .. } | Expr::RealBinary { left, right, .. } => {
                left.variables(out);
                right.variables(out);
            }
            Expr::IntNeg(e) | Expr::RealNeg(e) => e.variables(out),
        }
    }
}

fn push_unique(out: &mut Vec<Arc<str>>, name: &Arc<str>) {
    if !out.iter().any(|n| n == name) {
        out.push(name.clone());
    }
}

fn expect_sort(e: &ExprRef, sort: Sort, op: &str) -> SymbolicResult<()> {
    if e.sort() == sort {
        Ok(())
    } else {
        Err(SymbolicError::SortMismatch {
            op: op.to_string(),
            expected: sort,
            found: e.sort(),
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntConst(n) => write!(f, "{}", n),
            Expr::RealConst(r) => write!(f, "{:?}", r),
            Expr::IntVar(v) => write!(f, "{}", v.name),
            Expr::RealVar(v) => write!(f, "{}", v.name),
            Expr::IntBinary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::RealBinary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::IntNeg(e) | Expr::RealNeg(e) => write!(f, "-{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_folding() {
        let e = Expr::int_binary(IntOp::Mul, &Expr::int(6), &Expr::int(7)).unwrap();
        assert_eq!(e.as_int_const(), Some(42));
    }

    #[test]
    fn test_no_fold_on_zero_divisor() {
        let e = Expr::int_binary(IntOp::Div, &Expr::int(5), &Expr::int(0)).unwrap();
        assert!(matches!(e.as_ref(), Expr::IntBinary { op: IntOp::Div, .. }));
    }

    #[test]
    fn test_symbolic_expression_display() {
        let x = Expr::int_var("x", -10, 10);
        let e = Expr::int_binary(IntOp::Add, &x, &Expr::int(3)).unwrap();
        let e = Expr::int_binary(IntOp::Xor, &e, &x).unwrap();
        assert_eq!(e.to_string(), "((x + 3) ^ x)");
    }

    #[test]
    fn test_real_remainder_unsupported() {
        let y = Expr::real_var("y", -1.0, 1.0);
        let err = Expr::real_binary(RealOp::Rem, &y, &Expr::real(2.0)).unwrap_err();
        assert!(matches!(err, SymbolicError::Unsupported(_)));
    }

    #[test]
    fn test_sort_mismatch() {
        let x = Expr::int_var("x", 0, 1);
        let err = Expr::real_binary(RealOp::Add, &x, &Expr::real(1.0)).unwrap_err();
        assert!(matches!(err, SymbolicError::SortMismatch { .. }));
    }

    #[test]
    fn test_identity_by_name() {
        let a = Expr::int_var("n", 0, 5);
        let b = Expr::int_var("n", 0, 5);
        assert_eq!(a, b);
        let mut vars = Vec::new();
        Expr::int_binary(IntOp::Sub, &a, &b).unwrap().variables(&mut vars);
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn test_ushr_is_logical() {
        assert_eq!(IntOp::UShr.apply(-1, 60), Some(0xf));
        assert_eq!(IntOp::Shr.apply(-16, 2), Some(-4));
    }
}
