//! Modeled threads and their stack frames.

use crate::error::{VmError, VmResult};
use crate::program::MethodId;
use crate::value::{ObjRef, Slot, ThreadId, Value};
use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThreadStatus {
    Runnable,
    /// Waiting for the monitor of an object.
    Blocked(ObjRef),
    /// Was blocked; the monitor has been released and the thread may retry.
    Unblocked(ObjRef),
    Terminated,
}

/// One activation record: locals and operand stack of attributed slots.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StackFrame {
    pub method: MethodId,
    pub pc: usize,
    pub locals: Vec<Slot>,
    pub operands: Vec<Slot>,
    /// Monitor taken on entry to a synchronized method.
    pub sync_lock: Option<ObjRef>,
}

impl StackFrame {
    pub fn new(method: MethodId, max_locals: usize) -> Self {
        Self {
            method,
            pc: 0,
            locals: vec![Slot::concrete(Value::Int(0)); max_locals],
            operands: Vec::new(),
            sync_lock: None,
        }
    }

    pub fn push(&mut self, slot: Slot) {
        self.operands.push(slot);
    }

    pub fn pop(&mut self) -> Option<Slot> {
        self.operands.pop()
    }

    /// Operand `depth` entries below the top.
    pub fn peek(&self, depth: usize) -> Option<&Slot> {
        self.operands
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.operands.get(i))
    }

    pub fn local(&self, index: usize) -> VmResult<&Slot> {
        self.locals
            .get(index)
            .ok_or_else(|| VmError::Invariant(format!("local {} out of range", index)))
    }

    pub fn set_local(&mut self, index: usize, slot: Slot) -> VmResult<()> {
        let target = self
            .locals
            .get_mut(index)
            .ok_or_else(|| VmError::Invariant(format!("local {} out of range", index)))?;
        *target = slot;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub status: ThreadStatus,
    pub frames: Vec<StackFrame>,
    /// One entry per monitor acquisition, innermost last.
    pub held_locks: SmallVec<[ObjRef; 4]>,
}

impl ThreadInfo {
    pub fn new(id: ThreadId, frame: StackFrame) -> Self {
        Self {
            id,
            status: ThreadStatus::Runnable,
            frames: vec![frame],
            held_locks: SmallVec::new(),
        }
    }

    pub fn is_runnable(&self) -> bool {
        matches!(
            self.status,
            ThreadStatus::Runnable | ThreadStatus::Unblocked(_)
        )
    }

    pub fn is_alive(&self) -> bool {
        self.status != ThreadStatus::Terminated
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.status, ThreadStatus::Blocked(_))
    }

    pub fn top_frame(&self) -> VmResult<&StackFrame> {
        self.frames
            .last()
            .ok_or_else(|| VmError::Invariant(format!("thread {} has no frame", self.id)))
    }

    pub fn top_frame_mut(&mut self) -> VmResult<&mut StackFrame> {
        let id = self.id;
        self.frames
            .last_mut()
            .ok_or_else(|| VmError::Invariant(format!("thread {} has no frame", id)))
    }

    pub fn holds_lock(&self, obj: ObjRef) -> bool {
        self.held_locks.contains(&obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_depth() {
        let mut frame = StackFrame::new(MethodId(0), 1);
        frame.push(Slot::concrete(Value::Int(1)));
        frame.push(Slot::concrete(Value::Int(2)));
        assert_eq!(frame.peek(0).map(|s| s.value), Some(Value::Int(2)));
        assert_eq!(frame.peek(1).map(|s| s.value), Some(Value::Int(1)));
        assert!(frame.peek(2).is_none());
        assert!(frame.set_local(3, Slot::concrete(Value::Null)).is_err());
    }

    #[test]
    fn test_unblocked_thread_is_runnable() {
        let mut thread = ThreadInfo::new(ThreadId(1), StackFrame::new(MethodId(0), 0));
        thread.status = ThreadStatus::Blocked(ObjRef(4));
        assert!(!thread.is_runnable());
        assert!(thread.is_alive());
        thread.status = ThreadStatus::Unblocked(ObjRef(4));
        assert!(thread.is_runnable());
    }
}
