//! Constraints: `left <comparator> right` over symbolic expressions.

use crate::expr::{Expr, ExprRef, Sort};
use crate::{SymbolicError, SymbolicResult};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    /// The comparator selecting exactly the complementary outcomes.
    pub fn negate(self) -> Self {
        match self {
            Comparator::Eq => Comparator::Ne,
            Comparator::Ne => Comparator::Eq,
            Comparator::Lt => Comparator::Ge,
            Comparator::Le => Comparator::Gt,
            Comparator::Gt => Comparator::Le,
            Comparator::Ge => Comparator::Lt,
        }
    }

    /// The comparator with its operands swapped: `a < b` iff `b > a`.
    pub fn flip(self) -> Self {
        match self {
            Comparator::Eq => Comparator::Eq,
            Comparator::Ne => Comparator::Ne,
            Comparator::Lt => Comparator::Gt,
            Comparator::Le => Comparator::Ge,
            Comparator::Gt => Comparator::Lt,
            Comparator::Ge => Comparator::Le,
        }
    }

    pub fn holds_int(self, a: i64, b: i64) -> bool {
        match self {
            Comparator::Eq => a == b,
            Comparator::Ne => a != b,
            Comparator::Lt => a < b,
            Comparator::Le => a <= b,
            Comparator::Gt => a > b,
            Comparator::Ge => a >= b,
        }
    }

    pub fn holds_real(self, a: f64, b: f64) -> bool {
        match self {
            Comparator::Eq => a == b,
            Comparator::Ne => a != b,
            Comparator::Lt => a < b,
            Comparator::Le => a <= b,
            Comparator::Gt => a > b,
            Comparator::Ge => a >= b,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// One conjunct of a path condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub comparator: Comparator,
    pub left: ExprRef,
    pub right: ExprRef,
}

impl Constraint {
    /// Both sides must have the same sort.
    pub fn new(comparator: Comparator, left: ExprRef, right: ExprRef) -> SymbolicResult<Self> {
        if left.sort() != right.sort() {
            return Err(SymbolicError::SortMismatch {
                op: comparator.symbol().to_string(),
                expected: left.sort(),
                found: right.sort(),
            });
        }
        Ok(Self {
            comparator,
            left,
            right,
        })
    }

    pub fn sort(&self) -> Sort {
        self.left.sort()
    }

    pub fn negate(&self) -> Self {
        Self {
            comparator: self.comparator.negate(),
            left: self.left.clone(),
            right: self.right.clone(),
        }
    }

    /// Truth value when both sides are constants.
    pub fn evaluate_constant(&self) -> Option<bool> {
        match (self.left.as_ref(), self.right.as_ref()) {
            (Expr::IntConst(a), Expr::IntConst(b)) => Some(self.comparator.holds_int(*a, *b)),
            (Expr::RealConst(a), Expr::RealConst(b)) => Some(self.comparator.holds_real(*a, *b)),
            _ => None,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.comparator, self.right)
    }
}
