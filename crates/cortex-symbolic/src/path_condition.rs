//! Path conditions: the conjunction of constraints along one path.

use crate::constraint::{Comparator, Constraint};
use crate::expr::ExprRef;
use crate::interval::{Bounds, Refinement};
use crate::SymbolicResult;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Rounds of bound propagation before `simplify` gives up narrowing.
const MAX_ROUNDS: usize = 16;

/// An ordered conjunction of constraints.
///
/// Append-only: a branch extends a copy of its parent's condition, so the
/// parent is never modified once a child exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathCondition {
    constraints: Vec<Constraint>,
}

impl PathCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// The committed constraints in insertion order, as handed to a solver.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn push(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// Append `left cmp right`.
    pub fn add(&mut self, comparator: Comparator, left: ExprRef, right: ExprRef) -> SymbolicResult<()> {
        self.constraints
            .push(Constraint::new(comparator, left, right)?);
        Ok(())
    }

    /// A copy of this condition extended by one constraint.
    pub fn with(&self, constraint: Constraint) -> PathCondition {
        let mut next = self.clone();
        next.push(constraint);
        next
    }

    /// True if `self` is `other` plus zero or more appended constraints.
    pub fn extends(&self, other: &PathCondition) -> bool {
        self.constraints.len() >= other.constraints.len()
            && self.constraints[..other.constraints.len()] == other.constraints[..]
    }

    /// Cheap feasibility check by interval propagation.
    ///
    /// Returns false only when the constraints are certainly unsatisfiable
    /// within the variables' declared bounds. A true result does not prove
    /// satisfiability.
    pub fn simplify(&self) -> bool {
        let mut bounds = Bounds::default();
        for _ in 0..MAX_ROUNDS {
            let mut changed = false;
            for constraint in &self.constraints {
                match bounds.refine(constraint) {
                    Refinement::Infeasible => {
                        trace!(constraint = %constraint, "path condition infeasible");
                        return false;
                    }
                    Refinement::Narrowed => changed = true,
                    Refinement::Unchanged => {}
                }
            }
            if !changed {
                break;
            }
        }
        true
    }

    /// Variable names in order of first occurrence.
    pub fn variables(&self) -> Vec<Arc<str>> {
        let mut out = Vec::new();
        for c in &self.constraints {
            c.left.variables(&mut out);
            c.right.variables(&mut out);
        }
        out
    }
}

impl fmt::Display for PathCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "constraint # = {}", self.constraints.len())?;
        for (i, c) in self.constraints.iter().enumerate() {
            if i == 0 {
                write!(f, "\n{}", c)?;
            } else {
                write!(f, " &&\n{}", c)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, IntOp};

    fn x() -> ExprRef {
        Expr::int_var("x", i32::MIN as i64, i32::MAX as i64)
    }

    #[test]
    fn test_both_branches_feasible_from_empty() {
        let base = PathCondition::new();
        let lt = base.with(Constraint::new(Comparator::Lt, x(), Expr::int(0)).unwrap());
        let ge = base.with(Constraint::new(Comparator::Ge, x(), Expr::int(0)).unwrap());
        assert!(lt.simplify());
        assert!(ge.simplify());
        assert!(base.is_empty());
    }

    #[test]
    fn test_contradiction_pruned() {
        let mut pc = PathCondition::new();
        pc.add(Comparator::Ge, x(), Expr::int(0)).unwrap();
        pc.add(Comparator::Lt, x(), Expr::int(0)).unwrap();
        assert!(!pc.simplify());
    }

    #[test]
    fn test_transitive_propagation() {
        let y = Expr::int_var("y", 0, 100);
        let mut pc = PathCondition::new();
        // x < y, y < 5, x > 10
        pc.add(Comparator::Lt, x(), y.clone()).unwrap();
        pc.add(Comparator::Lt, y, Expr::int(5)).unwrap();
        pc.add(Comparator::Gt, x(), Expr::int(10)).unwrap();
        assert!(!pc.simplify());
    }

    #[test]
    fn test_bounds_respected() {
        let small = Expr::int_var("s", 0, 9);
        let mut pc = PathCondition::new();
        pc.add(Comparator::Gt, small, Expr::int(9)).unwrap();
        assert!(!pc.simplify());
    }

    #[test]
    fn test_compound_expression_interval() {
        let small = Expr::int_var("s", 0, 9);
        let sum = Expr::int_binary(IntOp::Add, &small, &Expr::int(1)).unwrap();
        let mut pc = PathCondition::new();
        pc.add(Comparator::Eq, sum.clone(), Expr::int(0)).unwrap();
        assert!(!pc.simplify());
        let mut pc = PathCondition::new();
        pc.add(Comparator::Eq, sum, Expr::int(10)).unwrap();
        assert!(pc.simplify());
    }

    #[test]
    fn test_extends() {
        let mut parent = PathCondition::new();
        parent.add(Comparator::Ne, x(), Expr::int(3)).unwrap();
        let child = parent.with(Constraint::new(Comparator::Gt, x(), Expr::int(0)).unwrap());
        assert!(child.extends(&parent));
        assert!(!parent.extends(&child));
        assert_eq!(child.len(), parent.len() + 1);
    }

    #[test]
    fn test_display() {
        let mut pc = PathCondition::new();
        pc.add(Comparator::Lt, x(), Expr::int(0)).unwrap();
        pc.add(Comparator::Ne, x(), Expr::int(-4)).unwrap();
        assert_eq!(pc.to_string(), "constraint # = 2\nx < 0 &&\nx != -4");
    }
}
