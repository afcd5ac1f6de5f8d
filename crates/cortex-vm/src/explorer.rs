//! Depth-first exploration of the choice-generator tree.
//!
//! A transition runs one thread from a resumed choice generator until the
//! next one is registered or the path ends. Every adopted generator gets a
//! frame holding a snapshot of the kernel state taken before any of its
//! choices ran; backtracking restores the snapshot and truncates the
//! generator chain to the frame's depth.

use crate::choice::{CgKind, ChoicePoint, HeapState, Site};
use crate::config::Config;
use crate::error::{VmError, VmResult};
use crate::exception::{self, Dispatch, UncaughtException};
use crate::fingerprint::Fingerprint;
use crate::insn::{Exec, Next};
use crate::kernel::KernelState;
use crate::listener::{InstructionEvent, VmListener};
use crate::program::{MethodId, Program};
use crate::schedule::SchedulerFactory;
use crate::system::SystemState;
use crate::value::ThreadId;
use ahash::AHashSet;
use cortex_symbolic::{PathCondition, SymbolicInputHeap};
use memory_stats::memory_stats;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Returns current process memory usage in MB, or None if unavailable.
fn current_memory_mb() -> Option<usize> {
    memory_stats().map(|stats| stats.physical_mem / (1024 * 1024))
}

/// Search error.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{0}")]
    Vm(#[from] VmError),

    #[error("program has no entry point")]
    NoEntryPoint,

    #[error("invalid trace at step {step}: {reason}")]
    InvalidTrace { step: usize, reason: String },
}

pub type CheckResult<T> = Result<T, CheckError>;

/// How one path of the search ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PathEnd {
    /// Every thread terminated.
    Completed,
    /// The path condition became infeasible.
    Pruned,
    UncaughtException(UncaughtException),
    /// Live threads remain but none can run.
    Deadlock { blocked: Vec<ThreadId> },
    /// An operation outside the supported fragment; the subtree is dropped.
    Unsupported { message: String },
    DepthLimit,
    /// State matching found this state already explored.
    Revisited,
}

impl PathEnd {
    /// Ends reported as errors and honored by `stop_on_error`.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            PathEnd::UncaughtException(_) | PathEnd::Deadlock { .. } | PathEnd::Unsupported { .. }
        )
    }
}

impl fmt::Display for PathEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathEnd::Completed => write!(f, "completed"),
            PathEnd::Pruned => write!(f, "pruned"),
            PathEnd::UncaughtException(e) => match &e.message {
                Some(message) => write!(f, "uncaught {} in {}: {}", e.class, e.thread, message),
                None => write!(f, "uncaught {} in {}", e.class, e.thread),
            },
            PathEnd::Deadlock { blocked } => {
                write!(f, "deadlock")?;
                for (i, t) in blocked.iter().enumerate() {
                    write!(f, "{}{}", if i == 0 { ", blocked: " } else { " " }, t)?;
                }
                Ok(())
            }
            PathEnd::Unsupported { message } => write!(f, "unsupported: {}", message),
            PathEnd::DepthLimit => write!(f, "depth limit"),
            PathEnd::Revisited => write!(f, "revisited"),
        }
    }
}

/// One finished path.
#[derive(Debug, Clone)]
pub struct PathRecord {
    pub end: PathEnd,
    /// Choice indices from the root.
    pub trace: Vec<usize>,
    pub path_condition: PathCondition,
    pub heap_condition: PathCondition,
    pub input_heap: SymbolicInputHeap,
    pub depth: usize,
}

impl PathRecord {
    fn new(end: PathEnd, system: &SystemState) -> Self {
        let HeapState { condition, heap } = system.heap_state();
        Self {
            end,
            trace: system.choice_trace(),
            path_condition: system.path_condition(),
            heap_condition: condition,
            input_heap: heap,
            depth: system.depth(),
        }
    }
}

/// Result of model checking.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// The whole tree was explored.
    Exhausted,
    StateLimitReached,
    TimeLimitReached,
    MemoryLimitReached { memory_mb: usize },
    /// `stop_on_error` ended the search at an error path.
    StoppedOnError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Adopted choice generators.
    pub states: usize,
    pub transitions: usize,
    pub instructions: usize,
    pub max_depth: usize,
    pub paths: usize,
    pub pruned: usize,
    pub revisited: usize,
}

#[derive(Debug, Clone)]
pub struct SearchReport {
    pub outcome: CheckOutcome,
    pub paths: Vec<PathRecord>,
    pub stats: SearchStats,
    pub elapsed: Duration,
}

impl SearchReport {
    pub fn errors(&self) -> impl Iterator<Item = &PathRecord> {
        self.paths.iter().filter(|p| p.end.is_error())
    }
}

/// State reached by [`Explorer::replay`].
#[derive(Debug, Clone)]
pub struct ReplayResult {
    pub kernel: KernelState,
    pub fingerprint: Fingerprint,
    pub path_condition: PathCondition,
    /// `None` when the trace stops at a pending choice.
    pub end: Option<PathEnd>,
}

enum Step {
    /// A choice generator is pending.
    Choice,
    End(PathEnd),
}

/// One adopted choice generator.
struct Frame {
    kernel: KernelState,
    /// Chain length with this generator on top.
    depth: usize,
    order: Vec<usize>,
    next: usize,
}

pub struct Explorer {
    program: Program,
    config: Config,
    entry: MethodId,
    rng: Option<StdRng>,
    visited: AHashSet<Fingerprint>,
    stats: SearchStats,
}

impl Explorer {
    pub fn new(program: Program, config: Config) -> CheckResult<Self> {
        let entry = program.entry().ok_or(CheckError::NoEntryPoint)?;
        let rng = config.choice_shuffle_seed.map(StdRng::seed_from_u64);
        Ok(Self {
            program,
            config,
            entry,
            rng,
            visited: AHashSet::new(),
            stats: SearchStats::default(),
        })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Explore every path.
    pub fn check(&mut self) -> CheckResult<SearchReport> {
        self.check_with(&mut [])
    }

    /// Explore every path, reporting to `listeners`.
    pub fn check_with(&mut self, listeners: &mut [&mut dyn VmListener]) -> CheckResult<SearchReport> {
        let start = Instant::now();
        let deadline = (self.config.max_time_secs > 0)
            .then(|| start + Duration::from_secs(self.config.max_time_secs));
        self.visited.clear();
        self.stats = SearchStats::default();
        info!(
            entry = %self.program.method(self.entry).full_name,
            state_matching = self.config.state_matching,
            max_depth = self.config.max_depth,
            "starting search"
        );

        let kernel = KernelState::boot(&self.program, &self.config, self.entry)?;
        let mut system = SystemState::new();
        self.register_root(&mut system);
        let mut stack = Vec::new();
        let mut paths = Vec::new();
        let mut outcome = CheckOutcome::Exhausted;
        if let Some(end) = self.adopt(kernel, &mut system, &mut stack, listeners)? {
            self.end_path(PathRecord::new(end, &system), &mut paths, listeners);
        }

        while let Some(frame) = stack.last_mut() {
            let Some(&choice) = frame.order.get(frame.next) else {
                stack.pop();
                for l in listeners.iter_mut() {
                    l.state_backtracked(stack.len());
                }
                continue;
            };
            frame.next += 1;
            let mut kernel = frame.kernel.clone();
            system.truncate(frame.depth);
            system.select(choice)?;

            if let Some(limit) = self.limit_reached(deadline) {
                outcome = limit;
                break;
            }
            self.stats.transitions += 1;

            let step = match run_transition(&self.program, &self.config, &mut kernel, &mut system, listeners, &mut self.stats) {
                Ok(step) => step,
                Err(e) if e.is_run_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, trace = ?system.choice_trace(), "abandoning subtree");
                    Step::End(PathEnd::Unsupported {
                        message: e.to_string(),
                    })
                }
            };
            let end = match step {
                Step::End(end) => Some(end),
                Step::Choice => self.adopt(kernel, &mut system, &mut stack, listeners)?,
            };
            if let Some(end) = end {
                let error = end.is_error();
                self.end_path(PathRecord::new(end, &system), &mut paths, listeners);
                if error && self.config.stop_on_error {
                    info!("stopping at first error");
                    outcome = CheckOutcome::StoppedOnError;
                    break;
                }
            }
        }

        let report = SearchReport {
            outcome,
            paths,
            stats: self.stats.clone(),
            elapsed: start.elapsed(),
        };
        info!(
            outcome = ?report.outcome,
            states = report.stats.states,
            transitions = report.stats.transitions,
            paths = report.stats.paths,
            pruned = report.stats.pruned,
            max_depth = report.stats.max_depth,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "search finished"
        );
        for l in listeners.iter_mut() {
            l.search_finished(&report);
        }
        Ok(report)
    }

    /// Re-execute a choice trace from the initial state.
    pub fn replay(&self, trace: &[usize]) -> CheckResult<ReplayResult> {
        let mut kernel = KernelState::boot(&self.program, &self.config, self.entry)?;
        let mut system = SystemState::new();
        self.register_root(&mut system);
        let mut stats = SearchStats::default();
        let mut end = None;
        for (step, &choice) in trace.iter().enumerate() {
            if end.is_some() {
                return Err(CheckError::InvalidTrace {
                    step,
                    reason: "the path already ended".into(),
                });
            }
            let cp = system.take_next().ok_or_else(|| CheckError::InvalidTrace {
                step,
                reason: "no pending choice".into(),
            })?;
            if choice >= cp.len() {
                return Err(CheckError::InvalidTrace {
                    step,
                    reason: format!("choice {} out of range for {}", choice, cp),
                });
            }
            system.push(cp)?;
            system.select(choice)?;
            match run_transition(&self.program, &self.config, &mut kernel, &mut system, &mut [], &mut stats) {
                Ok(Step::Choice) => {}
                Ok(Step::End(e)) => end = Some(e),
                Err(e) if e.is_run_fatal() => return Err(e.into()),
                Err(e) => {
                    end = Some(PathEnd::Unsupported {
                        message: e.to_string(),
                    })
                }
            }
        }
        debug!(steps = trace.len(), instructions = stats.instructions, "replayed trace");
        Ok(ReplayResult {
            fingerprint: kernel.fingerprint(),
            kernel,
            path_condition: system.path_condition(),
            end,
        })
    }

    fn register_root(&self, system: &mut SystemState) {
        let site = Site {
            thread: ThreadId(0),
            method: self.entry,
            pc: 0,
        };
        system.set_next_choice_generator(site, "root", CgKind::threads(vec![ThreadId(0)]));
    }

    /// Adopt the pending generator and push its frame, or end the path.
    fn adopt(
        &mut self,
        kernel: KernelState,
        system: &mut SystemState,
        stack: &mut Vec<Frame>,
        listeners: &mut [&mut dyn VmListener],
    ) -> VmResult<Option<PathEnd>> {
        let cp = system
            .take_next()
            .ok_or_else(|| VmError::Invariant("transition ended without a choice".into()))?;
        for l in listeners.iter_mut() {
            l.choice_generator_registered(&cp);
        }
        if cp.is_empty() {
            return Ok(Some(PathEnd::Deadlock {
                blocked: kernel.blocked_threads(),
            }));
        }
        if self.config.max_depth > 0 && system.depth() >= self.config.max_depth {
            return Ok(Some(PathEnd::DepthLimit));
        }
        if self.config.state_matching {
            let fp = state_fingerprint(&kernel, system, &cp);
            if !self.visited.insert(fp) {
                return Ok(Some(PathEnd::Revisited));
            }
        }

        let mut order: Vec<usize> = (0..cp.len()).collect();
        if let Some(rng) = self.rng.as_mut() {
            order.shuffle(rng);
        }
        system.push(cp)?;
        let depth = system.depth();
        self.stats.states += 1;
        self.stats.max_depth = self.stats.max_depth.max(depth);
        for l in listeners.iter_mut() {
            l.state_advanced(depth, &kernel);
        }
        stack.push(Frame {
            kernel,
            depth,
            order,
            next: 0,
        });
        Ok(None)
    }

    fn end_path(&mut self, record: PathRecord, paths: &mut Vec<PathRecord>, listeners: &mut [&mut dyn VmListener]) {
        self.stats.paths += 1;
        match record.end {
            PathEnd::Pruned => self.stats.pruned += 1,
            PathEnd::Revisited => self.stats.revisited += 1,
            _ => {}
        }
        if record.end.is_error() {
            info!(end = %record.end, trace = ?record.trace, "error path");
        } else {
            debug!(end = %record.end, depth = record.depth, "path ended");
        }
        for l in listeners.iter_mut() {
            l.path_ended(&record);
        }
        paths.push(record);
    }

    fn limit_reached(&self, deadline: Option<Instant>) -> Option<CheckOutcome> {
        if self.config.max_states > 0 && self.stats.states >= self.config.max_states {
            info!(states = self.stats.states, "reached state limit");
            return Some(CheckOutcome::StateLimitReached);
        }
        // Check memory and time every 1000 transitions to reduce overhead
        if self.stats.transitions % 1000 != 0 {
            return None;
        }
        if self.config.memory_limit_mb > 0 {
            if let Some(memory_mb) = current_memory_mb() {
                if memory_mb >= self.config.memory_limit_mb {
                    info!(memory_mb, limit_mb = self.config.memory_limit_mb, "reached memory limit");
                    return Some(CheckOutcome::MemoryLimitReached { memory_mb });
                }
            }
        }
        if deadline.map_or(false, |d| Instant::now() >= d) {
            info!("reached time limit");
            return Some(CheckOutcome::TimeLimitReached);
        }
        None
    }
}

/// Kernel state plus the committed conditions and the pending choice.
fn state_fingerprint(kernel: &KernelState, system: &SystemState, cp: &ChoicePoint) -> Fingerprint {
    kernel
        .fingerprint()
        .combine(Fingerprint::of(&system.path_condition()))
        .combine(Fingerprint::of(&system.heap_state()))
        .combine(Fingerprint::of(&(cp.site, cp.reason, cp.len())))
}

/// Run the thread selected by the current generator until a generator is
/// pending or the path ends.
fn run_transition(
    program: &Program,
    config: &Config,
    kernel: &mut KernelState,
    system: &mut SystemState,
    listeners: &mut [&mut dyn VmListener],
    stats: &mut SearchStats,
) -> VmResult<Step> {
    let current = system
        .current()
        .ok_or_else(|| VmError::Invariant("transition without a generator".into()))?;
    let tid = current.chosen_thread().unwrap_or(current.site.thread);
    let mut first_step = true;
    let mut executed = 0usize;

    loop {
        let frame = kernel.thread(tid)?.top_frame()?;
        let (method_id, pc) = (frame.method, frame.pc);
        let method = program.method(method_id);
        let insn = method.code.get(pc).ok_or_else(|| {
            VmError::Invariant(format!("{} ran past the end of {}", tid, method.full_name))
        })?;
        let before = (config.check_top_half_purity && insn.may_suspend()).then(|| kernel.data_fingerprint());

        let mut exec = Exec::new(program, config, kernel, system, tid, first_step)?;
        let next = insn.execute(&mut exec)?;
        let record = exec.into_record();
        first_step = false;
        executed += 1;
        stats.instructions += 1;

        for l in listeners.iter_mut() {
            l.instruction_executed(&InstructionEvent {
                thread: tid,
                method,
                pc,
                insn,
                record: &record,
                kernel: &*kernel,
            });
        }
        if system.is_ignored() {
            return Ok(Step::End(PathEnd::Pruned));
        }

        match next {
            Next::Repeat => {
                if !system.has_next_choice_generator() {
                    return Err(VmError::Invariant(format!("'{}' suspended without a choice", insn)));
                }
                if before.map_or(false, |fp| fp != kernel.data_fingerprint()) {
                    return Err(VmError::TopHalfMutation {
                        insn: insn.to_string(),
                        site: Site {
                            thread: tid,
                            method: method_id,
                            pc,
                        }
                        .to_string(),
                    });
                }
                return Ok(Step::Choice);
            }
            Next::Goto(target) => {
                kernel.thread_mut(tid)?.top_frame_mut()?.pc = target;
                if system.has_next_choice_generator() {
                    return Ok(Step::Choice);
                }
                let long = config.max_transition_length > 0 && executed >= config.max_transition_length;
                if long && target <= pc {
                    let threads = SchedulerFactory::new(config).preemption_choice(kernel);
                    let site = Site {
                        thread: tid,
                        method: method_id,
                        pc: target,
                    };
                    system.set_next_choice_generator(site, "preemption", CgKind::threads(threads));
                    return Ok(Step::Choice);
                }
            }
            Next::Continue => {
                if system.has_next_choice_generator() {
                    return Ok(Step::Choice);
                }
            }
            Next::Throw(exc) => {
                if let Dispatch::Uncaught(e) = exception::dispatch(kernel, program, tid, exc)? {
                    return Ok(Step::End(PathEnd::UncaughtException(e)));
                }
            }
            Next::Terminated => {
                if !kernel.has_live_threads() {
                    return Ok(Step::End(PathEnd::Completed));
                }
                let threads = SchedulerFactory::new(config).termination_choice(kernel);
                let site = Site {
                    thread: tid,
                    method: method_id,
                    pc,
                };
                system.set_next_choice_generator(site, "terminate", CgKind::threads(threads));
                return Ok(Step::Choice);
            }
        }
    }
}
