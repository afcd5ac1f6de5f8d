//! Exception objects and handler dispatch.

use crate::error::{VmError, VmResult};
use crate::insn::release_on_unwind;
use crate::kernel::KernelState;
use crate::program::Program;
use crate::thread::ThreadStatus;
use crate::value::{ObjRef, Slot, ThreadId, Value};
use std::sync::Arc;

/// An exception that unwound every frame of its thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UncaughtException {
    pub thread: ThreadId,
    pub class: Arc<str>,
    pub message: Option<Arc<str>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Control moved to a handler.
    Handled,
    /// The thread terminated.
    Uncaught(UncaughtException),
}

/// Allocate an exception of the named class. The heap limit does not
/// apply, so running out of memory can always be reported.
pub(crate) fn create(
    kernel: &mut KernelState,
    program: &Program,
    class: &str,
    message: Option<Arc<str>>,
    tid: ThreadId,
) -> VmResult<ObjRef> {
    let info = program
        .class_by_name(class)
        .ok_or_else(|| VmError::Invariant(format!("exception class '{}' is not loaded", class)))?;
    let exc = kernel.heap.allocate_object(info, tid);
    kernel.heap.get_mut(exc)?.message = message;
    Ok(exc)
}

/// Unwind `tid` until a handler covering the current pc accepts `exc`.
/// Frames left behind release their synchronized-method lock.
pub(crate) fn dispatch(kernel: &mut KernelState, program: &Program, tid: ThreadId, exc: ObjRef) -> VmResult<Dispatch> {
    let ei = kernel.heap.get(exc)?;
    let class = ei
        .class()
        .ok_or_else(|| VmError::Invariant(format!("thrown array {}", exc)))?;
    let message = ei.message.clone();

    loop {
        let thread = kernel.thread_mut(tid)?;
        let Some(frame) = thread.frames.last_mut() else {
            break;
        };
        let method = program.method(frame.method);
        let handler = method
            .handlers
            .iter()
            .find(|h| h.start <= frame.pc && frame.pc < h.end && program.is_subclass(class, h.class));
        if let Some(handler) = handler {
            frame.operands.clear();
            frame.push(Slot::concrete(Value::Ref(exc)));
            frame.pc = handler.target;
            return Ok(Dispatch::Handled);
        }
        let popped = thread.frames.pop();
        if let Some(lock) = popped.and_then(|f| f.sync_lock) {
            release_on_unwind(kernel, lock, tid)?;
        }
    }

    kernel.thread_mut(tid)?.status = ThreadStatus::Terminated;
    Ok(Dispatch::Uncaught(UncaughtException {
        thread: tid,
        class: program.class(class).name.clone(),
        message,
    }))
}
