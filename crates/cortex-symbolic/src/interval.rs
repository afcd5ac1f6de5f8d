//! Interval domain used by `PathCondition::simplify`.
//!
//! Integer intervals are kept in `i128` so that bound arithmetic on 64-bit
//! values cannot overflow; any result leaving the `i64` range widens to the
//! full range because concrete arithmetic wraps.

use crate::constraint::{Comparator, Constraint};
use crate::expr::{Expr, IntOp, RealOp, Sort};
use std::collections::HashMap;
use std::sync::Arc;

const I64_MIN: i128 = i64::MIN as i128;
const I64_MAX: i128 = i64::MAX as i128;

/// Closed integer interval; `min > max` is bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntInterval {
    pub min: i128,
    pub max: i128,
}

impl IntInterval {
    pub fn new(min: i128, max: i128) -> Self {
        Self { min, max }
    }

    pub fn singleton(value: i128) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn top() -> Self {
        Self {
            min: I64_MIN,
            max: I64_MAX,
        }
    }

    pub fn bottom() -> Self {
        Self { min: 1, max: 0 }
    }

    pub fn is_bottom(&self) -> bool {
        self.min > self.max
    }

    pub fn is_singleton(&self) -> bool {
        self.min == self.max
    }

    pub fn contains(&self, value: i128) -> bool {
        !self.is_bottom() && value >= self.min && value <= self.max
    }

    pub fn meet(&self, other: &IntInterval) -> IntInterval {
        if self.is_bottom() || other.is_bottom() {
            return IntInterval::bottom();
        }
        IntInterval {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Widen to the full range if the bounds left `i64`.
    fn wrap_check(self) -> IntInterval {
        if self.is_bottom() || (self.min >= I64_MIN && self.max <= I64_MAX) {
            self
        } else {
            IntInterval::top()
        }
    }

    fn from_corners(corners: [i128; 4]) -> IntInterval {
        let mut min = corners[0];
        let mut max = corners[0];
        for c in corners {
            min = min.min(c);
            max = max.max(c);
        }
        IntInterval { min, max }
    }

    pub fn add(&self, other: &IntInterval) -> IntInterval {
        IntInterval::new(self.min + other.min, self.max + other.max).wrap_check()
    }

    pub fn sub(&self, other: &IntInterval) -> IntInterval {
        IntInterval::new(self.min - other.max, self.max - other.min).wrap_check()
    }

    pub fn mul(&self, other: &IntInterval) -> IntInterval {
        let corners = [
            self.min.saturating_mul(other.min),
            self.min.saturating_mul(other.max),
            self.max.saturating_mul(other.min),
            self.max.saturating_mul(other.max),
        ];
        IntInterval::from_corners(corners).wrap_check()
    }

    pub fn div(&self, other: &IntInterval) -> IntInterval {
        if other.contains(0) {
            return IntInterval::top();
        }
        let corners = [
            self.min / other.min,
            self.min / other.max,
            self.max / other.min,
            self.max / other.max,
        ];
        IntInterval::from_corners(corners).wrap_check()
    }

    pub fn rem(&self, other: &IntInterval) -> IntInterval {
        let bound = other.min.abs().max(other.max.abs()) - 1;
        if bound < 0 {
            return IntInterval::top();
        }
        if self.min >= 0 {
            IntInterval::new(0, bound.min(self.max))
        } else if self.max <= 0 {
            IntInterval::new((-bound).max(self.min), 0)
        } else {
            IntInterval::new(-bound, bound)
        }
    }

    pub fn neg(&self) -> IntInterval {
        IntInterval::new(-self.max, -self.min).wrap_check()
    }
}

/// Closed real interval; `min > max` (or a NaN bound) is bottom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealInterval {
    pub min: f64,
    pub max: f64,
}

impl RealInterval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn singleton(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn top() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn is_bottom(&self) -> bool {
        !(self.min <= self.max)
    }

    pub fn meet(&self, other: &RealInterval) -> RealInterval {
        RealInterval {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    fn from_corners(corners: [f64; 4]) -> RealInterval {
        if corners.iter().any(|c| c.is_nan()) {
            return RealInterval::top();
        }
        let mut min = corners[0];
        let mut max = corners[0];
        for c in corners {
            min = min.min(c);
            max = max.max(c);
        }
        RealInterval { min, max }
    }

    pub fn add(&self, other: &RealInterval) -> RealInterval {
        RealInterval::from_corners([
            self.min + other.min,
            self.min + other.min,
            self.max + other.max,
            self.max + other.max,
        ])
    }

    pub fn sub(&self, other: &RealInterval) -> RealInterval {
        RealInterval::from_corners([
            self.min - other.max,
            self.min - other.max,
            self.max - other.min,
            self.max - other.min,
        ])
    }

    pub fn mul(&self, other: &RealInterval) -> RealInterval {
        RealInterval::from_corners([
            self.min * other.min,
            self.min * other.max,
            self.max * other.min,
            self.max * other.max,
        ])
    }

    pub fn div(&self, other: &RealInterval) -> RealInterval {
        if other.min <= 0.0 && other.max >= 0.0 {
            return RealInterval::top();
        }
        RealInterval::from_corners([
            self.min / other.min,
            self.min / other.max,
            self.max / other.min,
            self.max / other.max,
        ])
    }

    pub fn neg(&self) -> RealInterval {
        RealInterval::new(-self.max, -self.min)
    }
}

/// Outcome of refining the environment with one constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Refinement {
    Unchanged,
    Narrowed,
    Infeasible,
}

/// Current bounds of every variable seen so far.
#[derive(Debug, Default, Clone)]
pub(crate) struct Bounds {
    ints: HashMap<Arc<str>, IntInterval>,
    reals: HashMap<Arc<str>, RealInterval>,
}

impl Bounds {
    pub(crate) fn eval_int(&self, expr: &Expr) -> IntInterval {
        match expr {
            Expr::IntConst(n) => IntInterval::singleton(*n as i128),
            Expr::IntVar(v) => self
                .ints
                .get(&v.name)
                .copied()
                .unwrap_or_else(|| IntInterval::new(v.min as i128, v.max as i128)),
            Expr::IntBinary { op, left, right } => {
                let l = self.eval_int(left);
                let r = self.eval_int(right);
                if l.is_bottom() || r.is_bottom() {
                    return IntInterval::bottom();
                }
                match op {
                    IntOp::Add => l.add(&r),
                    IntOp::Sub => l.sub(&r),
                    IntOp::Mul => l.mul(&r),
                    IntOp::Div => l.div(&r),
                    IntOp::Rem => l.rem(&r),
                    IntOp::And
                    | IntOp::Or
                    | IntOp::Xor
                    | IntOp::Shl
                    | IntOp::Shr
                    | IntOp::UShr => IntInterval::top(),
                }
            }
            Expr::IntNeg(e) => self.eval_int(e).neg(),
            _ => IntInterval::top(),
        }
    }

    pub(crate) fn eval_real(&self, expr: &Expr) -> RealInterval {
        match expr {
            Expr::RealConst(r) => RealInterval::singleton(*r),
            Expr::RealVar(v) => self
                .reals
                .get(&v.name)
                .copied()
                .unwrap_or_else(|| RealInterval::new(v.min, v.max)),
            Expr::RealBinary { op, left, right } => {
                let l = self.eval_real(left);
                let r = self.eval_real(right);
                match op {
                    RealOp::Add => l.add(&r),
                    RealOp::Sub => l.sub(&r),
                    RealOp::Mul => l.mul(&r),
                    RealOp::Div => l.div(&r),
                    RealOp::Rem => RealInterval::top(),
                }
            }
            Expr::RealNeg(e) => self.eval_real(e).neg(),
            _ => RealInterval::top(),
        }
    }

    /// Narrow variable bounds with `constraint`; report infeasibility.
    pub(crate) fn refine(&mut self, constraint: &Constraint) -> Refinement {
        match constraint.sort() {
            Sort::Int => self.refine_int(constraint),
            Sort::Real => self.refine_real(constraint),
        }
    }

    fn refine_int(&mut self, c: &Constraint) -> Refinement {
        let l = self.eval_int(&c.left);
        let r = self.eval_int(&c.right);
        if l.is_bottom() || r.is_bottom() || !int_possible(c.comparator, &l, &r) {
            return Refinement::Infeasible;
        }
        let mut result = Refinement::Unchanged;
        if let Expr::IntVar(v) = c.left.as_ref() {
            result = self.narrow_int(&v.name, l, int_allowed(c.comparator, &l, &r));
        }
        if result == Refinement::Infeasible {
            return result;
        }
        if let Expr::IntVar(v) = c.right.as_ref() {
            // re-evaluate: the left side may have narrowed the same variable
            let l = self.eval_int(&c.left);
            let r = self.eval_int(&c.right);
            let narrowed = self.narrow_int(&v.name, r, int_allowed(c.comparator.flip(), &r, &l));
            if narrowed != Refinement::Unchanged {
                result = narrowed;
            }
        }
        result
    }

    fn narrow_int(&mut self, name: &Arc<str>, current: IntInterval, allowed: IntInterval) -> Refinement {
        let next = current.meet(&allowed);
        if next.is_bottom() {
            return Refinement::Infeasible;
        }
        if next == current {
            return Refinement::Unchanged;
        }
        self.ints.insert(name.clone(), next);
        Refinement::Narrowed
    }

    fn refine_real(&mut self, c: &Constraint) -> Refinement {
        let l = self.eval_real(&c.left);
        let r = self.eval_real(&c.right);
        if l.is_bottom() || r.is_bottom() || !real_possible(c.comparator, &l, &r) {
            return Refinement::Infeasible;
        }
        let mut result = Refinement::Unchanged;
        if let Expr::RealVar(v) = c.left.as_ref() {
            result = self.narrow_real(&v.name, l, real_allowed(c.comparator, &r));
        }
        if result == Refinement::Infeasible {
            return result;
        }
        if let Expr::RealVar(v) = c.right.as_ref() {
            let l = self.eval_real(&c.left);
            let r = self.eval_real(&c.right);
            let narrowed = self.narrow_real(&v.name, r, real_allowed(c.comparator.flip(), &l));
            if narrowed != Refinement::Unchanged {
                result = narrowed;
            }
        }
        result
    }

    fn narrow_real(&mut self, name: &Arc<str>, current: RealInterval, allowed: RealInterval) -> Refinement {
        let next = current.meet(&allowed);
        if next.is_bottom() {
            return Refinement::Infeasible;
        }
        if next == current {
            return Refinement::Unchanged;
        }
        self.reals.insert(name.clone(), next);
        Refinement::Narrowed
    }

    #[cfg(test)]
    pub(crate) fn int_bounds(&self, name: &str) -> Option<IntInterval> {
        self.ints.get(name).copied()
    }
}

/// Is there some `a` in `l` and `b` in `r` with `a cmp b`?
fn int_possible(cmp: Comparator, l: &IntInterval, r: &IntInterval) -> bool {
    match cmp {
        Comparator::Eq => !l.meet(r).is_bottom(),
        Comparator::Ne => !(l.is_singleton() && r.is_singleton() && l.min == r.min),
        Comparator::Lt => l.min < r.max,
        Comparator::Le => l.min <= r.max,
        Comparator::Gt => l.max > r.min,
        Comparator::Ge => l.max >= r.min,
    }
}

/// Values of the left side compatible with some value of the right side.
fn int_allowed(cmp: Comparator, l: &IntInterval, r: &IntInterval) -> IntInterval {
    match cmp {
        Comparator::Eq => *r,
        Comparator::Ne => {
            if r.is_singleton() && l.min == r.min {
                IntInterval::new(l.min + 1, l.max)
            } else if r.is_singleton() && l.max == r.min {
                IntInterval::new(l.min, l.max - 1)
            } else {
                *l
            }
        }
        Comparator::Lt => IntInterval::new(i128::MIN, r.max - 1),
        Comparator::Le => IntInterval::new(i128::MIN, r.max),
        Comparator::Gt => IntInterval::new(r.min + 1, i128::MAX),
        Comparator::Ge => IntInterval::new(r.min, i128::MAX),
    }
}

fn real_possible(cmp: Comparator, l: &RealInterval, r: &RealInterval) -> bool {
    match cmp {
        Comparator::Eq => !l.meet(r).is_bottom(),
        Comparator::Ne => !(l.min == l.max && r.min == r.max && l.min == r.min),
        Comparator::Lt => l.min < r.max,
        Comparator::Le => l.min <= r.max,
        Comparator::Gt => l.max > r.min,
        Comparator::Ge => l.max >= r.min,
    }
}

/// Strictness is dropped for reals; the result over-approximates.
fn real_allowed(cmp: Comparator, r: &RealInterval) -> RealInterval {
    match cmp {
        Comparator::Eq => *r,
        Comparator::Ne => RealInterval::top(),
        Comparator::Lt | Comparator::Le => RealInterval::new(f64::NEG_INFINITY, r.max),
        Comparator::Gt | Comparator::Ge => RealInterval::new(r.min, f64::INFINITY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_meet_and_bottom() {
        let a = IntInterval::new(0, 10);
        let b = IntInterval::new(5, 20);
        assert_eq!(a.meet(&b), IntInterval::new(5, 10));
        assert!(a.meet(&IntInterval::new(11, 12)).is_bottom());
    }

    #[test]
    fn test_int_arithmetic() {
        let a = IntInterval::new(-2, 3);
        let b = IntInterval::new(4, 5);
        assert_eq!(a.add(&b), IntInterval::new(2, 8));
        assert_eq!(a.sub(&b), IntInterval::new(-7, -1));
        assert_eq!(a.mul(&b), IntInterval::new(-10, 15));
        assert_eq!(a.neg(), IntInterval::new(-3, 2));
        assert_eq!(IntInterval::new(10, 20).div(&b), IntInterval::new(2, 5));
        assert_eq!(a.div(&IntInterval::new(-1, 1)), IntInterval::top());
    }

    #[test]
    fn test_overflow_widens() {
        let big = IntInterval::new(0, I64_MAX);
        assert_eq!(big.add(&IntInterval::singleton(1)), IntInterval::top());
    }

    #[test]
    fn test_rem_bounds() {
        assert_eq!(
            IntInterval::new(0, 100).rem(&IntInterval::singleton(7)),
            IntInterval::new(0, 6)
        );
        assert_eq!(
            IntInterval::new(-3, 100).rem(&IntInterval::singleton(7)),
            IntInterval::new(-6, 6)
        );
    }

    #[test]
    fn test_refine_var_against_const() {
        let mut bounds = Bounds::default();
        let x = Expr::int_var("x", -100, 100);
        let c = Constraint::new(Comparator::Ge, x.clone(), Expr::int(0)).unwrap();
        assert_eq!(bounds.refine(&c), Refinement::Narrowed);
        assert_eq!(bounds.int_bounds("x"), Some(IntInterval::new(0, 100)));
        let c = Constraint::new(Comparator::Lt, x, Expr::int(0)).unwrap();
        assert_eq!(bounds.refine(&c), Refinement::Infeasible);
    }

    #[test]
    fn test_refine_const_on_left() {
        let mut bounds = Bounds::default();
        let x = Expr::int_var("x", -5, 5);
        let c = Constraint::new(Comparator::Lt, Expr::int(2), x).unwrap();
        bounds.refine(&c);
        assert_eq!(bounds.int_bounds("x"), Some(IntInterval::new(3, 5)));
    }

    #[test]
    fn test_refine_ne_edge() {
        let mut bounds = Bounds::default();
        let x = Expr::int_var("x", 0, 1);
        let c = Constraint::new(Comparator::Ne, x.clone(), Expr::int(0)).unwrap();
        bounds.refine(&c);
        assert_eq!(bounds.int_bounds("x"), Some(IntInterval::singleton(1)));
        let c = Constraint::new(Comparator::Ne, x, Expr::int(1)).unwrap();
        assert_eq!(bounds.refine(&c), Refinement::Infeasible);
    }

    #[test]
    fn test_real_refinement() {
        let mut bounds = Bounds::default();
        let y = Expr::real_var("y", -1.0, 1.0);
        let c = Constraint::new(Comparator::Gt, y.clone(), Expr::real(2.0)).unwrap();
        assert_eq!(bounds.refine(&c), Refinement::Infeasible);
        let c = Constraint::new(Comparator::Le, y, Expr::real(0.5)).unwrap();
        assert_eq!(bounds.refine(&c), Refinement::Narrowed);
    }
}
