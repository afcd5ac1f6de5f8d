//! Search observers.
//!
//! Listeners see the machine through shared references only. They cannot
//! register choice generators; only instructions can.

use crate::choice::ChoicePoint;
use crate::explorer::{PathEnd, PathRecord, SearchReport};
use crate::insn::{InsnRecord, Instruction};
use crate::kernel::KernelState;
use crate::program::MethodInfo;
use crate::value::ThreadId;
use cortex_symbolic::PathCondition;
use std::fmt;
use tracing::trace;

/// One executed instruction.
pub struct InstructionEvent<'a> {
    pub thread: ThreadId,
    pub method: &'a MethodInfo,
    pub pc: usize,
    pub insn: &'a Instruction,
    pub record: &'a InsnRecord,
    /// State after the instruction.
    pub kernel: &'a KernelState,
}

/// Callbacks from the explorer. Every method defaults to doing nothing.
pub trait VmListener {
    fn instruction_executed(&mut self, _event: &InstructionEvent<'_>) {}

    /// A transition ended with `cp` pending, before the explorer adopts it.
    fn choice_generator_registered(&mut self, _cp: &ChoicePoint) {}

    /// A new state was entered at `depth`.
    fn state_advanced(&mut self, _depth: usize, _kernel: &KernelState) {}

    /// The search returned to `depth`.
    fn state_backtracked(&mut self, _depth: usize) {}

    fn path_ended(&mut self, _path: &PathRecord) {}

    fn search_finished(&mut self, _report: &SearchReport) {}
}

/// Logs every executed instruction at trace level.
#[derive(Debug, Default)]
pub struct ExecTracker {
    executed: u64,
}

impl ExecTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }
}

impl VmListener for ExecTracker {
    fn instruction_executed(&mut self, event: &InstructionEvent<'_>) {
        self.executed += 1;
        trace!(
            thread = %event.thread,
            method = %event.method.full_name,
            pc = event.pc,
            line = event.method.line(event.pc),
            insn = %event.insn,
            object = ?event.record.object,
            value = ?event.record.value.as_ref().map(|s| s.to_string()),
            choice = ?event.record.choice,
            "executed"
        );
    }

    fn choice_generator_registered(&mut self, cp: &ChoicePoint) {
        trace!(cg = %cp, "choice generator pending");
    }

    fn state_backtracked(&mut self, depth: usize) {
        trace!(depth, "backtrack");
    }
}

/// One path as seen by [`PathConditionReporter`].
#[derive(Debug, Clone)]
pub struct PathSummary {
    pub trace: Vec<usize>,
    pub end: PathEnd,
    pub path_condition: PathCondition,
    pub heap_condition: PathCondition,
}

/// Collects the path condition of every path that was not pruned.
#[derive(Debug, Default)]
pub struct PathConditionReporter {
    summaries: Vec<PathSummary>,
}

impl PathConditionReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summaries(&self) -> &[PathSummary] {
        &self.summaries
    }
}

impl VmListener for PathConditionReporter {
    fn path_ended(&mut self, path: &PathRecord) {
        if matches!(path.end, PathEnd::Pruned) {
            return;
        }
        self.summaries.push(PathSummary {
            trace: path.trace.clone(),
            end: path.end.clone(),
            path_condition: path.path_condition.clone(),
            heap_condition: path.heap_condition.clone(),
        });
    }
}

impl fmt::Display for PathConditionReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, summary) in self.summaries.iter().enumerate() {
            writeln!(f, "path {}: {}", i + 1, summary.end)?;
            writeln!(f, "{}", summary.path_condition)?;
            if !summary.heap_condition.is_empty() {
                writeln!(f, "heap {}", summary.heap_condition)?;
            }
        }
        Ok(())
    }
}
