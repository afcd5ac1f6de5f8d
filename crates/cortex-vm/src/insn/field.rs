//! Instance and static field access.
//!
//! Null checks come first and are deterministic. An access the scheduling
//! filter deems relevant breaks the transition in its top half; the bottom
//! half commits the access and records it for sharedness and lockset
//! tracking. References moved through a shared object or a static field
//! become reachable from the threads that reach it.

use super::lazy::{self, LazySlot, LazyStep};
use super::{Exec, FieldRef, Next};
use crate::choice::CgKind;
use crate::error::{VmError, VmResult};
use crate::program::FieldInfo;
use crate::schedule::{SchedulerFactory, SchedulingFilter};
use crate::value::{ObjRef, Slot};

fn instance_field<'p>(exec: &Exec<'p>, fref: &FieldRef) -> VmResult<&'p FieldInfo> {
    let program = exec.program;
    program
        .field(fref.class, fref.slot)
        .ok_or_else(|| VmError::Invariant(format!("unresolved field {}", fref.name)))
}

fn static_field<'p>(exec: &Exec<'p>, fref: &FieldRef) -> VmResult<&'p FieldInfo> {
    let program = exec.program;
    program
        .static_field(fref.class, fref.slot)
        .ok_or_else(|| VmError::Invariant(format!("unresolved static field {}", fref.name)))
}

/// Top half of a field access: true if a thread choice was registered.
fn break_on_access(exec: &mut Exec<'_>, obj: ObjRef, field: &FieldInfo) -> VmResult<bool> {
    if exec.first_step {
        return Ok(false);
    }
    let filter = SchedulingFilter::new(exec.config);
    let method = exec.program.method(exec.method);
    let ei = exec.kernel.heap.get(obj)?;
    let relevant = if field.is_static {
        filter.is_static_access_relevant(exec.kernel, exec.tid, ei, field, method, exec.pc)
    } else {
        filter.is_field_access_relevant(exec.kernel, exec.tid, ei, field, method, exec.pc)
    };
    if !relevant {
        return Ok(false);
    }
    let Some(threads) = SchedulerFactory::new(exec.config).shared_access_choice(exec.kernel) else {
        return Ok(false);
    };
    let reason = if field.is_static {
        "sharedStatic"
    } else {
        "sharedField"
    };
    Ok(exec.register(reason, CgKind::threads(threads)))
}

/// Read `field` of `obj`, resolving a symbolic reference first. `operands`
/// is the number of stack entries the instruction consumes.
fn read(exec: &mut Exec<'_>, obj: ObjRef, field: &FieldInfo, operands: usize) -> VmResult<Next> {
    if break_on_access(exec, obj, field)? {
        return Ok(Next::Repeat);
    }
    let mut slot = exec.kernel.heap.get(obj)?.slot(field.slot)?.clone();
    if let (Some(attr), Some(class), true) = (&slot.attr, field.ty.class_name(), exec.config.lazy_init) {
        let target = LazySlot::Field {
            obj,
            slot: field.slot,
        };
        match lazy::initialize(exec, target, attr, class)? {
            LazyStep::Suspend => return Ok(Next::Repeat),
            LazyStep::Resolved(value) => slot = Slot::concrete(value),
        }
    }
    for _ in 0..operands {
        exec.pop()?;
    }
    exec.commit_access(obj, Some(field.slot))?;
    exec.share_reachable(obj, &slot)?;
    exec.record.value = Some(slot.clone());
    exec.push(slot)?;
    Ok(exec.next())
}

/// Store the top of the stack into `field` of `obj`. The operand's
/// attribute replaces the field's.
fn write(exec: &mut Exec<'_>, obj: ObjRef, field: &FieldInfo, operands: usize) -> VmResult<Next> {
    if break_on_access(exec, obj, field)? {
        return Ok(Next::Repeat);
    }
    let value = exec.peek(0)?;
    for _ in 0..operands {
        exec.pop()?;
    }
    exec.kernel
        .heap
        .get_mut(obj)?
        .set_slot(field.slot, value.clone())?;
    exec.commit_access(obj, Some(field.slot))?;
    exec.share_reachable(obj, &value)?;
    exec.record.value = Some(value);
    Ok(exec.next())
}

pub(super) fn get_field(exec: &mut Exec<'_>, fref: &FieldRef) -> VmResult<Next> {
    let field = instance_field(exec, fref)?;
    let Some(obj) = exec.object_of(&exec.peek(0)?)? else {
        exec.pop()?;
        return exec.throw("NullPointerException", format!("reading field {} of null", fref.name));
    };
    read(exec, obj, field, 1)
}

pub(super) fn put_field(exec: &mut Exec<'_>, fref: &FieldRef) -> VmResult<Next> {
    let field = instance_field(exec, fref)?;
    let Some(obj) = exec.object_of(&exec.peek(1)?)? else {
        exec.pop()?;
        exec.pop()?;
        return exec.throw("NullPointerException", format!("writing field {} of null", fref.name));
    };
    write(exec, obj, field, 2)
}

pub(super) fn get_static(exec: &mut Exec<'_>, fref: &FieldRef) -> VmResult<Next> {
    let field = static_field(exec, fref)?;
    let statics = exec.kernel.heap.statics(field.declaring);
    read(exec, statics, field, 0)
}

pub(super) fn put_static(exec: &mut Exec<'_>, fref: &FieldRef) -> VmResult<Next> {
    let field = static_field(exec, fref)?;
    let statics = exec.kernel.heap.statics(field.declaring);
    write(exec, statics, field, 1)
}
