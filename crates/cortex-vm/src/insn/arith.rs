//! Arithmetic, conversions and three-way compares.
//!
//! With a symbolic operand the result carries a new expression and its
//! concrete value is a placeholder. Only division by a symbolic divisor
//! and the compares branch.

use super::branch::{self, int_expr, real_expr};
use super::{Exec, Next};
use crate::error::{VmError, VmResult};
use crate::value::{Slot, Value};
use cortex_symbolic::{Comparator, Constraint, Expr, ExprRef, IntOp, RealOp};
use std::cmp::Ordering;

fn push_result(exec: &mut Exec<'_>, slot: Slot) -> VmResult<Next> {
    exec.record.value = Some(slot.clone());
    exec.push(slot)?;
    Ok(exec.next())
}

pub(super) fn int_arith(exec: &mut Exec<'_>, op: IntOp) -> VmResult<Next> {
    let right = exec.peek(0)?;
    let left = exec.peek(1)?;
    if matches!(op, IntOp::Div | IntOp::Rem) {
        if let Some(divisor) = right.attr.clone() {
            return symbolic_division(exec, op, &left, divisor);
        }
        if exec.int_of(&right)? == 0 {
            exec.pop()?;
            exec.pop()?;
            return exec.throw("ArithmeticException", "/ by zero");
        }
    }
    let result = if left.is_symbolic() || right.is_symbolic() {
        let expr = Expr::int_binary(op, &int_expr(exec, &left)?, &int_expr(exec, &right)?)?;
        Slot::symbolic(Value::Int(0), expr)
    } else {
        let (a, b) = (exec.int_of(&left)?, exec.int_of(&right)?);
        let v = op
            .apply(a, b)
            .ok_or_else(|| VmError::Invariant(format!("{} {} {} has no value", a, op.symbol(), b)))?;
        Slot::concrete(Value::Int(v))
    };
    exec.pop()?;
    exec.pop()?;
    push_result(exec, result)
}

/// Outcome 0: divisor != 0, the quotient stays symbolic. Outcome 1:
/// divisor == 0 raises ArithmeticException.
fn symbolic_division(exec: &mut Exec<'_>, op: IntOp, left: &Slot, divisor: ExprRef) -> VmResult<Next> {
    let Some(choice) = branch::decide(exec, 2, "divisionGuard")? else {
        return Ok(Next::Repeat);
    };
    let dividend = int_expr(exec, left)?;
    exec.pop()?;
    exec.pop()?;
    let comparator = if choice == 0 {
        Comparator::Ne
    } else {
        Comparator::Eq
    };
    let guard = Constraint::new(comparator, divisor.clone(), Expr::int(0))?;
    if !branch::commit(exec, vec![guard])? {
        return Ok(exec.next());
    }
    if choice == 1 {
        return exec.throw("ArithmeticException", "/ by zero");
    }
    let expr = Expr::int_binary(op, &dividend, &divisor)?;
    push_result(exec, Slot::symbolic(Value::Int(0), expr))
}

pub(super) fn int_neg(exec: &mut Exec<'_>) -> VmResult<Next> {
    let operand = exec.pop()?;
    let result = match &operand.attr {
        Some(attr) => Slot::symbolic(Value::Int(0), Expr::neg(attr)),
        None => Slot::concrete(Value::Int(exec.int_of(&operand)?.wrapping_neg())),
    };
    push_result(exec, result)
}

pub(super) fn real_arith(exec: &mut Exec<'_>, op: RealOp) -> VmResult<Next> {
    let right = exec.peek(0)?;
    let left = exec.peek(1)?;
    let result = if left.is_symbolic() || right.is_symbolic() {
        let expr = Expr::real_binary(op, &real_expr(exec, &left)?, &real_expr(exec, &right)?)?;
        Slot::symbolic(Value::Real(0.0), expr)
    } else {
        let (a, b) = (exec.real_of(&left)?, exec.real_of(&right)?);
        Slot::concrete(Value::Real(op.apply(a, b)))
    };
    exec.pop()?;
    exec.pop()?;
    push_result(exec, result)
}

pub(super) fn real_neg(exec: &mut Exec<'_>) -> VmResult<Next> {
    let operand = exec.pop()?;
    let result = match &operand.attr {
        Some(attr) => Slot::symbolic(Value::Real(0.0), Expr::neg(attr)),
        None => Slot::concrete(Value::Real(-exec.real_of(&operand)?)),
    };
    push_result(exec, result)
}

pub(super) fn int_to_real(exec: &mut Exec<'_>) -> VmResult<Next> {
    let operand = exec.peek(0)?;
    if let Some(attr) = &operand.attr {
        return Err(VmError::Unsupported(format!("symbolic int-to-real conversion of {}", attr)));
    }
    let v = exec.int_of(&operand)?;
    exec.pop()?;
    push_result(exec, Slot::concrete(Value::Real(v as f64)))
}

/// Saturating, NaN converts to 0.
pub(super) fn real_to_int(exec: &mut Exec<'_>) -> VmResult<Next> {
    let operand = exec.peek(0)?;
    if let Some(attr) = &operand.attr {
        return Err(VmError::Unsupported(format!("symbolic real-to-int conversion of {}", attr)));
    }
    let v = exec.real_of(&operand)?;
    exec.pop()?;
    push_result(exec, Slot::concrete(Value::Int(v as i64)))
}

/// Symbolic compares choose among less, equal and greater.
fn symbolic_compare(exec: &mut Exec<'_>, left: ExprRef, right: ExprRef) -> VmResult<Next> {
    let Some(choice) = branch::decide(exec, 3, "compare")? else {
        return Ok(Next::Repeat);
    };
    exec.pop()?;
    exec.pop()?;
    let (comparator, result) = match choice {
        0 => (Comparator::Lt, -1),
        1 => (Comparator::Eq, 0),
        _ => (Comparator::Gt, 1),
    };
    if !branch::commit(exec, vec![Constraint::new(comparator, left, right)?])? {
        return Ok(exec.next());
    }
    push_result(exec, Slot::concrete(Value::Int(result)))
}

fn ordering_value(ordering: Ordering) -> i64 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

pub(super) fn int_cmp(exec: &mut Exec<'_>) -> VmResult<Next> {
    let right = exec.peek(0)?;
    let left = exec.peek(1)?;
    if left.is_symbolic() || right.is_symbolic() {
        let (l, r) = (int_expr(exec, &left)?, int_expr(exec, &right)?);
        return symbolic_compare(exec, l, r);
    }
    let (a, b) = (exec.int_of(&left)?, exec.int_of(&right)?);
    exec.pop()?;
    exec.pop()?;
    push_result(exec, Slot::concrete(Value::Int(ordering_value(a.cmp(&b)))))
}

pub(super) fn real_cmp(exec: &mut Exec<'_>, nan_greater: bool) -> VmResult<Next> {
    let right = exec.peek(0)?;
    let left = exec.peek(1)?;
    if left.is_symbolic() || right.is_symbolic() {
        let (l, r) = (real_expr(exec, &left)?, real_expr(exec, &right)?);
        return symbolic_compare(exec, l, r);
    }
    let (a, b) = (exec.real_of(&left)?, exec.real_of(&right)?);
    exec.pop()?;
    exec.pop()?;
    let result = match a.partial_cmp(&b) {
        Some(ordering) => ordering_value(ordering),
        None if nan_greater => 1,
        None => -1,
    };
    push_result(exec, Slot::concrete(Value::Int(result)))
}
