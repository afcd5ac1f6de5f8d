//! Property: `simplify` never prunes a satisfiable path condition.
//!
//! Constraints are generated around a concrete witness assignment and
//! oriented so that the witness satisfies every one of them. Interval
//! propagation may fail to prove infeasibility, but it must never report
//! infeasible for such a conjunction.

use cortex_symbolic::{Comparator, Constraint, Expr, ExprRef, IntOp, PathCondition};
use proptest::prelude::*;

const NAMES: [&str; 3] = ["a", "b", "c"];

fn var(i: usize) -> ExprRef {
    Expr::int_var(NAMES[i], -50, 50)
}

fn comparator() -> impl Strategy<Value = Comparator> {
    prop_oneof![
        Just(Comparator::Eq),
        Just(Comparator::Ne),
        Just(Comparator::Lt),
        Just(Comparator::Le),
        Just(Comparator::Gt),
        Just(Comparator::Ge),
    ]
}

/// (left var, right var or constant, offset added to the left, comparator)
fn shape() -> impl Strategy<Value = (usize, Option<usize>, i64, i64, Comparator)> {
    (0..3usize, prop::option::of(0..3usize), -5i64..=5, -60i64..=60, comparator())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 512,
        .. ProptestConfig::default()
    })]

    #[test]
    fn simplify_keeps_satisfiable_conditions(
        witness in prop::array::uniform3(-50i64..=50),
        shapes in prop::collection::vec(shape(), 1..8),
    ) {
        let mut pc = PathCondition::new();
        for (l, r, offset, constant, cmp) in shapes {
            let left = Expr::int_binary(IntOp::Add, &var(l), &Expr::int(offset)).unwrap();
            let left_value = witness[l] + offset;
            let (right, right_value) = match r {
                Some(r) => (var(r), witness[r]),
                None => (Expr::int(constant), constant),
            };
            // orient the comparator so the witness satisfies it
            let cmp = if cmp.holds_int(left_value, right_value) { cmp } else { cmp.negate() };
            pc.push(Constraint::new(cmp, left, right).unwrap());
        }
        prop_assert!(pc.simplify(), "pruned a satisfiable condition:\n{}", pc);
    }

    #[test]
    fn contradictory_bounds_are_pruned(k in -50i64..=50) {
        let mut pc = PathCondition::new();
        pc.add(Comparator::Ge, var(0), Expr::int(k)).unwrap();
        pc.add(Comparator::Lt, var(0), Expr::int(k)).unwrap();
        prop_assert!(!pc.simplify());
    }
}
