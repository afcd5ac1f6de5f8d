//! Operand stack and local variable instructions.

use super::lazy::{self, LazySlot, LazyStep};
use super::{Exec, Next};
use crate::error::VmResult;
use crate::value::{Slot, Value};
use cortex_symbolic::{Expr, IntOp, Sort};

pub(super) fn push(exec: &mut Exec<'_>, value: Value) -> VmResult<Next> {
    exec.push(Slot::concrete(value))?;
    Ok(exec.next())
}

pub(super) fn pop(exec: &mut Exec<'_>) -> VmResult<Next> {
    exec.pop()?;
    Ok(exec.next())
}

pub(super) fn dup(exec: &mut Exec<'_>) -> VmResult<Next> {
    let top = exec.peek(0)?;
    exec.push(top)?;
    Ok(exec.next())
}

pub(super) fn swap(exec: &mut Exec<'_>) -> VmResult<Next> {
    let a = exec.pop()?;
    let b = exec.pop()?;
    exec.push(a)?;
    exec.push(b)?;
    Ok(exec.next())
}

/// Loading a reference local that still holds a symbolic reference
/// resolves it first.
pub(super) fn load(exec: &mut Exec<'_>, index: usize) -> VmResult<Next> {
    let slot = exec.frame()?.local(index)?.clone();
    let program = exec.program;
    let declared = program
        .method(exec.method)
        .local_type(index)
        .and_then(|t| t.class_name());
    if let (Some(attr), Some(class), true) = (&slot.attr, declared, exec.config.lazy_init) {
        return match lazy::initialize(exec, LazySlot::Local(index), attr, class)? {
            LazyStep::Suspend => Ok(Next::Repeat),
            LazyStep::Resolved(value) => {
                exec.push(Slot::concrete(value))?;
                exec.record.value = Some(Slot::concrete(value));
                Ok(exec.next())
            }
        };
    }
    exec.record.value = Some(slot.clone());
    exec.push(slot)?;
    Ok(exec.next())
}

pub(super) fn store(exec: &mut Exec<'_>, index: usize) -> VmResult<Next> {
    let slot = exec.pop()?;
    exec.record.value = Some(slot.clone());
    exec.frame_mut()?.set_local(index, slot)?;
    Ok(exec.next())
}

pub(super) fn inc(exec: &mut Exec<'_>, index: usize, delta: i64) -> VmResult<Next> {
    let slot = exec.frame()?.local(index)?.clone();
    let value = exec.int_of(&slot)?.wrapping_add(delta);
    let attr = match &slot.attr {
        Some(attr) => Some(Expr::int_binary(IntOp::Add, attr, &Expr::int(delta))?),
        None => None,
    };
    let updated = Slot {
        value: Value::Int(value),
        attr,
    };
    exec.record.value = Some(updated.clone());
    exec.frame_mut()?.set_local(index, updated)?;
    Ok(exec.next())
}

/// Push a fresh symbolic input named after `name`.
pub(super) fn symbolic(exec: &mut Exec<'_>, name: &str, sort: Sort) -> VmResult<Next> {
    let name = exec.kernel.fresh_name(name);
    let config = exec.config;
    let slot = match sort {
        Sort::Int => Slot::symbolic(
            Value::Int(0),
            Expr::int_var(name, config.min_int, config.max_int),
        ),
        Sort::Real => Slot::symbolic(
            Value::Real(0.0),
            Expr::real_var(name, config.min_real, config.max_real),
        ),
    };
    exec.record.value = Some(slot.clone());
    exec.push(slot)?;
    Ok(exec.next())
}
