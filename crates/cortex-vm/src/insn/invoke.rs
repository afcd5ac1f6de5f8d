//! Method invocation, return, thread start and yield.
//!
//! The caller's pc stays on the invoke while the callee runs; `return`
//! advances it. Arguments keep their attributes when moved into the
//! callee's locals.

use super::monitor::{self, Entry};
use super::{Exec, Next};
use crate::choice::CgKind;
use crate::error::{VmError, VmResult};
use crate::program::MethodId;
use crate::schedule::SchedulerFactory;
use crate::thread::{StackFrame, ThreadStatus};
use crate::value::{Slot, Value};

pub(super) fn invoke(exec: &mut Exec<'_>, target: MethodId, dispatch: bool) -> VmResult<Next> {
    let program = exec.program;
    let declared = program.method(target);
    let mut callee = declared;
    let mut receiver = None;
    if !declared.is_static {
        let Some(obj) = exec.object_of(&exec.peek(declared.params.len())?)? else {
            for _ in 0..declared.arg_count() {
                exec.pop()?;
            }
            let message = format!("invoking {} on null", declared.full_name);
            return exec.throw("NullPointerException", message);
        };
        receiver = Some(obj);
        if dispatch {
            let class = exec
                .kernel
                .heap
                .get(obj)?
                .class()
                .ok_or_else(|| exec.type_error("object"))?;
            let resolved = program.resolve_method(class, &declared.name).ok_or_else(|| {
                VmError::Invariant(format!(
                    "no implementation of {} for {}",
                    declared.full_name,
                    program.class(class).name
                ))
            })?;
            callee = program.method(resolved);
        }
    }

    let lock = match (callee.is_synchronized, receiver) {
        (false, _) => None,
        (true, Some(obj)) => Some(obj),
        (true, None) => Some(exec.kernel.heap.statics(callee.class)),
    };
    if let Some(lock) = lock {
        if let Entry::Suspend = monitor::enter(exec, lock, "syncMethodEnter")? {
            return Ok(Next::Repeat);
        }
    }

    let mut frame = StackFrame::new(callee.id, callee.max_locals);
    for i in (0..callee.arg_count()).rev() {
        let arg = exec.pop()?;
        frame.set_local(i, arg)?;
    }
    if let Some(lock) = lock {
        monitor::acquire(exec.kernel, lock, exec.tid)?;
        frame.sync_lock = Some(lock);
    }
    exec.record.object = receiver;
    exec.kernel.thread_mut(exec.tid)?.frames.push(frame);
    Ok(Next::Continue)
}

pub(super) fn return_(exec: &mut Exec<'_>) -> VmResult<Next> {
    let returns = exec.program.method(exec.method).returns.is_some();
    let result = if returns { Some(exec.pop()?) } else { None };
    let tid = exec.tid;
    let frame = exec
        .kernel
        .thread_mut(tid)?
        .frames
        .pop()
        .ok_or_else(|| VmError::Invariant(format!("{} returned without a frame", tid)))?;
    if let Some(lock) = frame.sync_lock {
        monitor::release(exec.kernel, lock, tid)?;
    }
    exec.record.value = result.clone();
    let thread = exec.kernel.thread_mut(tid)?;
    match thread.frames.last_mut() {
        Some(caller) => {
            if let Some(value) = result {
                caller.push(value);
            }
            caller.pc += 1;
            Ok(Next::Continue)
        }
        None => {
            thread.status = ThreadStatus::Terminated;
            Ok(Next::Terminated)
        }
    }
}

/// Start a thread running the static method `target`. Every object passed
/// as an argument becomes reachable from the new thread.
pub(super) fn spawn(exec: &mut Exec<'_>, target: MethodId) -> VmResult<Next> {
    let callee = exec.program.method(target);
    let mut frame = StackFrame::new(callee.id, callee.max_locals);
    for i in (0..callee.arg_count()).rev() {
        let arg = exec.pop()?;
        frame.set_local(i, arg)?;
    }
    let shared: Vec<_> = frame
        .locals
        .iter()
        .filter_map(|s| match s.value {
            Value::Ref(r) => Some(r),
            _ => None,
        })
        .collect();
    let child = exec.kernel.spawn(frame);
    for obj in shared {
        exec.kernel.heap.get_mut(obj)?.add_referencing_thread(child);
    }
    exec.record.value = Some(Slot::concrete(Value::Int(child.0 as i64)));
    if let Some(threads) = SchedulerFactory::new(exec.config).start_choice(exec.kernel) {
        exec.register("start", CgKind::threads(threads));
    }
    Ok(exec.next())
}

pub(super) fn yield_(exec: &mut Exec<'_>) -> VmResult<Next> {
    if !exec.first_step {
        if let Some(threads) = SchedulerFactory::new(exec.config).yield_choice(exec.kernel) {
            if exec.register("yield", CgKind::threads(threads)) {
                return Ok(Next::Repeat);
            }
        }
    }
    Ok(exec.next())
}
