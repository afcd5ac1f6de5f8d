//! Symbolic values for the Cortex virtual machine.
//!
//! Expressions ride alongside concrete values as attributes. Branches on
//! symbolic operands accumulate a [`PathCondition`]; lazy heap
//! initialization records materialized objects in a [`SymbolicInputHeap`].
//! Only cheap interval reasoning happens here; a full solver consumes
//! [`PathCondition::constraints`] from outside.

pub mod constraint;
pub mod expr;
pub mod heap;
pub mod interval;
pub mod path_condition;

pub use constraint::{Comparator, Constraint};
pub use expr::{Expr, ExprRef, IntOp, RealOp, Sort, SymbolicInteger, SymbolicReal};
pub use heap::{HeapNode, SymbolicInputHeap};
pub use interval::{IntInterval, RealInterval};
pub use path_condition::PathCondition;

use thiserror::Error;

/// Errors from building symbolic expressions or constraints.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SymbolicError {
    #[error("unsupported symbolic operation: {0}")]
    Unsupported(String),
    #[error("sort mismatch in '{op}': expected {expected}, found {found}")]
    SortMismatch {
        op: String,
        expected: Sort,
        found: Sort,
    },
}

pub type SymbolicResult<T> = Result<T, SymbolicError>;
