//! Monitors: `monitorenter`, `monitorexit` and synchronized method entry.
//!
//! A thread that finds the monitor owned blocks and registers a mandatory
//! choice among the remaining runnable threads. Releasing the last hold
//! unblocks the waiters; acquiring re-blocks any unblocked contender.

use super::{Exec, Next};
use crate::choice::CgKind;
use crate::error::{VmError, VmResult};
use crate::kernel::KernelState;
use crate::schedule::SchedulerFactory;
use crate::thread::ThreadStatus;
use crate::value::{ObjRef, ThreadId};

pub(super) enum Entry {
    Suspend,
    Acquire,
}

/// Top half of a monitor entry on `lock`.
///
/// A contended entry marks the thread `Blocked` before suspending. That
/// status change is the one mutation a top half may make: the scheduler
/// must see the thread as not runnable when it builds the choice, and
/// [`KernelState::data_fingerprint`] leaves thread status out for this
/// reason.
pub(super) fn enter(exec: &mut Exec<'_>, lock: ObjRef, reason: &'static str) -> VmResult<Entry> {
    let factory = SchedulerFactory::new(exec.config);
    if !exec.kernel.heap.get(lock)?.can_lock(exec.tid) {
        exec.kernel.thread_mut(exec.tid)?.status = ThreadStatus::Blocked(lock);
        let threads = factory
            .monitor_enter_choice(exec.kernel, true)
            .unwrap_or_default();
        if !exec.register(reason, CgKind::threads(threads)) {
            return Err(VmError::ChoiceOverride {
                site: exec.site().to_string(),
            });
        }
        return Ok(Entry::Suspend);
    }
    if !exec.first_step {
        let ei = exec.kernel.heap.get(lock)?;
        if let Some(threads) = factory.sync_entry_choice(exec.kernel, exec.tid, lock, ei) {
            if exec.register(reason, CgKind::threads(threads)) {
                return Ok(Entry::Suspend);
            }
        }
    }
    Ok(Entry::Acquire)
}

pub(crate) fn acquire(kernel: &mut KernelState, lock: ObjRef, tid: ThreadId) -> VmResult<()> {
    let monitor = &mut kernel.heap.get_mut(lock)?.monitor;
    monitor.owner = Some(tid);
    monitor.count += 1;
    let thread = kernel.thread_mut(tid)?;
    thread.held_locks.push(lock);
    thread.status = ThreadStatus::Runnable;
    for other in kernel.threads.iter_mut() {
        if other.id != tid && other.status == ThreadStatus::Unblocked(lock) {
            other.status = ThreadStatus::Blocked(lock);
        }
    }
    Ok(())
}

/// Release one hold of `lock` by `tid`. False if `tid` does not own it.
pub(crate) fn release(kernel: &mut KernelState, lock: ObjRef, tid: ThreadId) -> VmResult<bool> {
    let monitor = &mut kernel.heap.get_mut(lock)?.monitor;
    if monitor.owner != Some(tid) {
        return Ok(false);
    }
    monitor.count = monitor.count.saturating_sub(1);
    let freed = monitor.count == 0;
    if freed {
        monitor.owner = None;
    }
    let thread = kernel.thread_mut(tid)?;
    if let Some(i) = thread.held_locks.iter().rposition(|l| *l == lock) {
        thread.held_locks.remove(i);
    }
    if freed {
        for other in kernel.threads.iter_mut() {
            if other.status == ThreadStatus::Blocked(lock) {
                other.status = ThreadStatus::Unblocked(lock);
            }
        }
    }
    Ok(true)
}

/// Release the lock of a synchronized frame popped by exception unwinding.
pub(crate) fn release_on_unwind(kernel: &mut KernelState, lock: ObjRef, tid: ThreadId) -> VmResult<()> {
    release(kernel, lock, tid).map(|_| ())
}

pub(super) fn monitor_enter(exec: &mut Exec<'_>) -> VmResult<Next> {
    let Some(lock) = exec.object_of(&exec.peek(0)?)? else {
        exec.pop()?;
        return exec.throw("NullPointerException", "monitorenter on null");
    };
    match enter(exec, lock, "monitorEnter")? {
        Entry::Suspend => Ok(Next::Repeat),
        Entry::Acquire => {
            exec.pop()?;
            acquire(exec.kernel, lock, exec.tid)?;
            exec.record.object = Some(lock);
            Ok(exec.next())
        }
    }
}

pub(super) fn monitor_exit(exec: &mut Exec<'_>) -> VmResult<Next> {
    let operand = exec.pop()?;
    let Some(lock) = exec.object_of(&operand)? else {
        return exec.throw("NullPointerException", "monitorexit on null");
    };
    if !release(exec.kernel, lock, exec.tid)? {
        let message = format!("{} does not own {}", exec.tid, lock);
        return exec.throw("IllegalMonitorStateException", message);
    }
    exec.record.object = Some(lock);
    Ok(exec.next())
}
