//! Kernel state: everything a snapshot captures and a restore replaces.

use crate::config::Config;
use crate::error::{VmError, VmResult};
use crate::fingerprint::Fingerprint;
use crate::heap::Heap;
use crate::program::{MethodId, Program, TypeDesc};
use crate::thread::{StackFrame, ThreadInfo};
use crate::value::{Slot, ThreadId, Value};
use cortex_symbolic::Expr;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KernelState {
    pub heap: Heap,
    pub threads: Vec<ThreadInfo>,
    /// Counter behind fresh symbol names; part of the state so replays
    /// name symbols identically.
    symbols: u32,
}

impl KernelState {
    /// Statics for every class and a main thread about to run `entry`.
    /// `@symbolic` parameters of the entry receive fresh symbolic inputs.
    pub fn boot(program: &Program, config: &Config, entry: MethodId) -> VmResult<Self> {
        let method = program.method(entry);
        if !method.is_static {
            return Err(VmError::Invariant(format!(
                "entry method {} is not static",
                method.full_name
            )));
        }
        let mut kernel = Self {
            heap: Heap::new(program.classes()),
            threads: Vec::new(),
            symbols: 0,
        };
        let mut frame = StackFrame::new(entry, method.max_locals);
        for (i, param) in method.params.iter().enumerate() {
            let slot = if param.symbolic {
                kernel.fresh_input(&param.name, &param.ty, config)?
            } else {
                Slot::concrete(param.ty.default_value())
            };
            frame.set_local(i, slot)?;
        }
        kernel.threads.push(ThreadInfo::new(ThreadId(0), frame));
        Ok(kernel)
    }

    /// A unique symbol name `prefix_N`.
    pub fn fresh_name(&mut self, prefix: &str) -> Arc<str> {
        self.symbols += 1;
        format!("{}_{}", prefix, self.symbols).into()
    }

    /// A fresh symbolic slot of type `ty`. References are symbolic integers
    /// in `[-1, max_int]`, with -1 standing for null.
    pub fn fresh_input(&mut self, prefix: &str, ty: &TypeDesc, config: &Config) -> VmResult<Slot> {
        let name = self.fresh_name(prefix);
        let slot = match ty {
            TypeDesc::Int => Slot::symbolic(
                Value::Int(0),
                Expr::int_var(name, config.min_int, config.max_int),
            ),
            TypeDesc::Real => Slot::symbolic(
                Value::Real(0.0),
                Expr::real_var(name, config.min_real, config.max_real),
            ),
            TypeDesc::Class(_) => Slot::symbolic(Value::Null, Expr::int_var(name, -1, config.max_int)),
            TypeDesc::Array(_) => {
                return Err(VmError::Unsupported(format!(
                    "symbolic array input '{}'",
                    name
                )))
            }
        };
        Ok(slot)
    }

    pub fn thread(&self, tid: ThreadId) -> VmResult<&ThreadInfo> {
        self.threads
            .get(tid.index())
            .ok_or_else(|| VmError::Invariant(format!("unknown thread {}", tid)))
    }

    pub fn thread_mut(&mut self, tid: ThreadId) -> VmResult<&mut ThreadInfo> {
        self.threads
            .get_mut(tid.index())
            .ok_or_else(|| VmError::Invariant(format!("unknown thread {}", tid)))
    }

    /// Start a new thread running `frame`.
    pub fn spawn(&mut self, frame: StackFrame) -> ThreadId {
        let tid = ThreadId(self.threads.len() as u32);
        self.threads.push(ThreadInfo::new(tid, frame));
        tid
    }

    /// Runnable threads in id order.
    pub fn runnable_threads(&self) -> Vec<ThreadId> {
        self.threads
            .iter()
            .filter(|t| t.is_runnable())
            .map(|t| t.id)
            .collect()
    }

    pub fn blocked_threads(&self) -> Vec<ThreadId> {
        self.threads
            .iter()
            .filter(|t| t.is_blocked())
            .map(|t| t.id)
            .collect()
    }

    pub fn is_runnable(&self, tid: ThreadId) -> bool {
        self.threads
            .get(tid.index())
            .map_or(false, |t| t.is_runnable())
    }

    pub fn has_live_threads(&self) -> bool {
        self.threads.iter().any(|t| t.is_alive())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }

    /// Fingerprint of heap and stacks only. Thread statuses are left out:
    /// a contended monitor entry blocks its thread before suspending.
    pub fn data_fingerprint(&self) -> Fingerprint {
        let stacks: Vec<_> = self
            .threads
            .iter()
            .map(|t| (&t.frames, &t.held_locks))
            .collect();
        Fingerprint::of(&(&self.heap, stacks, self.symbols))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_names_are_sequential() {
        let mut kernel = KernelState {
            heap: Heap::default(),
            threads: Vec::new(),
            symbols: 0,
        };
        assert_eq!(&*kernel.fresh_name("x"), "x_1");
        assert_eq!(&*kernel.fresh_name("x"), "x_2");
        let config = Config::default();
        let slot = kernel
            .fresh_input("next", &TypeDesc::Class("Node".into()), &config)
            .unwrap();
        assert_eq!(slot.value, Value::Null);
        let var = slot.attr.as_ref().and_then(|a| a.as_int_var().cloned()).unwrap();
        assert_eq!((var.min, var.max), (-1, config.max_int));
        assert!(kernel
            .fresh_input("a", &TypeDesc::Array(Box::new(TypeDesc::Int)), &config)
            .is_err());
    }

    #[test]
    fn test_snapshot_fingerprint_tracks_changes() {
        let mut kernel = KernelState {
            heap: Heap::default(),
            threads: Vec::new(),
            symbols: 0,
        };
        let before = kernel.fingerprint();
        let snapshot = kernel.clone();
        kernel.spawn(StackFrame::new(MethodId(0), 0));
        assert_ne!(kernel.fingerprint(), before);
        assert_eq!(snapshot.fingerprint(), before);
    }
}
