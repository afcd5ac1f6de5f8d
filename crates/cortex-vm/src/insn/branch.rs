//! Conditional branches. A branch whose operands carry symbolic attributes
//! becomes a choice over its outcomes, each committing the matching
//! constraint to the path condition.

use super::{Exec, Next};
use crate::choice::CgKind;
use crate::error::{VmError, VmResult};
use crate::value::Slot;
use cortex_symbolic::{Comparator, Constraint, Expr, ExprRef};
use tracing::debug;

/// Top half: register an `outcomes`-way path-condition choice and return
/// `None`. Bottom half: the resumed outcome.
pub(super) fn decide(exec: &mut Exec<'_>, outcomes: usize, reason: &'static str) -> VmResult<Option<usize>> {
    if let Some(choice) = exec.resumed_choice(|k| matches!(k, CgKind::Branch { .. })) {
        exec.record.choice = Some(choice);
        return Ok(Some(choice));
    }
    if exec.register(reason, CgKind::branch(outcomes)) {
        Ok(None)
    } else {
        Err(VmError::Invariant(format!(
            "{} at {} found a choice already pending",
            reason,
            exec.site()
        )))
    }
}

/// Extend the inherited path condition by `constraints` and commit it to
/// the current generator. On an infeasible result the path is marked
/// ignored and false is returned.
pub(super) fn commit(exec: &mut Exec<'_>, constraints: Vec<Constraint>) -> VmResult<bool> {
    // The chain may have changed since the top half ran: look it up again.
    let current = exec
        .system
        .current()
        .map(|cp| cp.id)
        .ok_or_else(|| VmError::Invariant("path condition commit without a generator".into()))?;
    let mut pc = exec.system.inherited_path_condition(current);
    for constraint in constraints {
        pc.push(constraint);
    }
    if !pc.simplify() {
        debug!(site = %exec.site(), constraints = pc.len(), "infeasible path condition, pruning");
        exec.system.set_ignored();
        return Ok(false);
    }
    exec.system.commit_path_condition(pc)?;
    Ok(true)
}

pub(super) fn int_expr(exec: &Exec<'_>, slot: &Slot) -> VmResult<ExprRef> {
    match &slot.attr {
        Some(attr) => Ok(attr.clone()),
        None => Ok(Expr::int(exec.int_of(slot)?)),
    }
}

pub(super) fn real_expr(exec: &Exec<'_>, slot: &Slot) -> VmResult<ExprRef> {
    match &slot.attr {
        Some(attr) => Ok(attr.clone()),
        None => Ok(Expr::real(exec.real_of(slot)?)),
    }
}

/// Two-way decision on `left cond right`: outcome 0 falls through with the
/// negated condition, outcome 1 takes the branch.
fn decide_condition(
    exec: &mut Exec<'_>,
    cond: Comparator,
    left: ExprRef,
    right: ExprRef,
    target: usize,
    operands: usize,
) -> VmResult<Next> {
    let Some(choice) = decide(exec, 2, "branch")? else {
        return Ok(Next::Repeat);
    };
    for _ in 0..operands {
        exec.pop()?;
    }
    let taken = choice == 1;
    let comparator = if taken { cond } else { cond.negate() };
    if !commit(exec, vec![Constraint::new(comparator, left, right)?])? {
        return Ok(exec.next());
    }
    Ok(if taken { Next::Goto(target) } else { exec.next() })
}

pub(super) fn if_zero(exec: &mut Exec<'_>, cond: Comparator, target: usize) -> VmResult<Next> {
    let operand = exec.peek(0)?;
    match &operand.attr {
        None => {
            let v = exec.int_of(&operand)?;
            exec.pop()?;
            Ok(if cond.holds_int(v, 0) {
                Next::Goto(target)
            } else {
                exec.next()
            })
        }
        Some(attr) => decide_condition(exec, cond, attr.clone(), Expr::int(0), target, 1),
    }
}

pub(super) fn if_cmp(exec: &mut Exec<'_>, cond: Comparator, target: usize) -> VmResult<Next> {
    let right = exec.peek(0)?;
    let left = exec.peek(1)?;
    if !left.is_symbolic() && !right.is_symbolic() {
        let (a, b) = (exec.int_of(&left)?, exec.int_of(&right)?);
        exec.pop()?;
        exec.pop()?;
        return Ok(if cond.holds_int(a, b) {
            Next::Goto(target)
        } else {
            exec.next()
        });
    }
    let (l, r) = (int_expr(exec, &left)?, int_expr(exec, &right)?);
    decide_condition(exec, cond, l, r, target, 2)
}

pub(super) fn if_null(exec: &mut Exec<'_>, when_null: bool, target: usize) -> VmResult<Next> {
    let operand = exec.pop()?;
    let is_null = exec.object_of(&operand)?.is_none();
    Ok(if is_null == when_null {
        Next::Goto(target)
    } else {
        exec.next()
    })
}

pub(super) fn if_ref_cmp(exec: &mut Exec<'_>, equal: bool, target: usize) -> VmResult<Next> {
    let right = exec.pop()?;
    let left = exec.pop()?;
    let same = exec.object_of(&left)? == exec.object_of(&right)?;
    Ok(if same == equal {
        Next::Goto(target)
    } else {
        exec.next()
    })
}

/// Symbolic keys branch `keys.len() + 1` ways: one per case, then the
/// default with the key differing from every case.
pub(super) fn switch(exec: &mut Exec<'_>, keys: &[i64], targets: &[usize], default: usize) -> VmResult<Next> {
    let key = exec.peek(0)?;
    let Some(attr) = key.attr.clone() else {
        let k = exec.int_of(&key)?;
        exec.pop()?;
        let target = keys
            .iter()
            .position(|c| *c == k)
            .and_then(|i| targets.get(i).copied())
            .unwrap_or(default);
        return Ok(Next::Goto(target));
    };
    let Some(choice) = decide(exec, keys.len() + 1, "switch")? else {
        return Ok(Next::Repeat);
    };
    exec.pop()?;
    let (constraints, target) = match (keys.get(choice), targets.get(choice)) {
        (Some(k), Some(t)) => (
            vec![Constraint::new(Comparator::Eq, attr, Expr::int(*k))?],
            *t,
        ),
        _ => {
            let differs = keys
                .iter()
                .map(|k| Constraint::new(Comparator::Ne, attr.clone(), Expr::int(*k)))
                .collect::<Result<Vec<_>, _>>()?;
            (differs, default)
        }
    };
    if !commit(exec, constraints)? {
        return Ok(exec.next());
    }
    Ok(Next::Goto(target))
}
