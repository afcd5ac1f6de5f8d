//! Model-checking virtual machine for Cortex assembly programs.
//!
//! Programs are loaded from the syntax tree into a [`Program`], then
//! explored by [`Explorer`]: every thread interleaving that matters and
//! every feasible outcome of a branch on symbolic input is visited in
//! depth-first order.

pub mod choice;
pub mod config;
pub mod error;
pub mod exception;
pub mod explorer;
pub mod fingerprint;
pub mod heap;
pub mod insn;
pub mod kernel;
pub mod listener;
pub mod loader;
pub mod program;
pub mod schedule;
pub mod system;
pub mod thread;
pub mod value;

pub use choice::{CgId, CgKind, ChoiceGenerator, ChoicePoint, HeapState, Site};
pub use config::Config;
pub use error::{LoadError, LoadResult, VmError, VmResult};
pub use exception::UncaughtException;
pub use explorer::{
    CheckError, CheckOutcome, CheckResult, Explorer, PathEnd, PathRecord, ReplayResult, SearchReport, SearchStats,
};
pub use fingerprint::Fingerprint;
pub use insn::{Exec, InsnRecord, Instruction, Next};
pub use kernel::KernelState;
pub use listener::{ExecTracker, InstructionEvent, PathConditionReporter, PathSummary, VmListener};
pub use loader::load;
pub use program::{ClassId, ClassInfo, MethodId, MethodInfo, Program, TypeDesc};
pub use schedule::{SchedulerFactory, SchedulingFilter};
pub use system::SystemState;
pub use thread::{StackFrame, ThreadInfo, ThreadStatus};
pub use value::{ObjRef, Slot, ThreadId, Value};
