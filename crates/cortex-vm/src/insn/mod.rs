//! Decoded instructions and the two-phase execution protocol.
//!
//! The first attempt at a nondeterministic instruction is its top half: it
//! may only inspect state, register a choice generator and return
//! [`Next::Repeat`]. When the driver resumes the generator the same
//! instruction runs again as its bottom half, reads the chosen index and
//! commits its effect. Deterministic instructions have no top half.
//!
//! Instructions are immutable. Whatever one invocation wants to report
//! (the object it touched, the value it moved, the choice it consumed)
//! goes into the [`InsnRecord`] of that invocation.

mod arith;
mod array;
mod branch;
mod field;
mod invoke;
mod lazy;
mod monitor;
mod object;
mod stack;

pub(crate) use monitor::release_on_unwind;

use crate::choice::{CgKind, Site};
use crate::config::Config;
use crate::error::{VmError, VmResult};
use crate::exception;
use crate::kernel::KernelState;
use crate::program::{ClassId, MethodId, Program, TypeDesc};
use crate::system::SystemState;
use crate::thread::StackFrame;
use crate::value::{ObjRef, Slot, ThreadId, Value};
use cortex_symbolic::{Comparator, IntOp, RealOp, Sort};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Resolved `Class.field` operand.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRef {
    pub class: ClassId,
    pub slot: usize,
    pub name: Arc<str>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassRef {
    pub id: ClassId,
    pub name: Arc<str>,
}

/// Resolved `Class.method` operand.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodRef {
    pub id: MethodId,
    pub name: Arc<str>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    // === Stack and locals ===
    Push(Value),
    Pop,
    Dup,
    Swap,
    Load(usize),
    Store(usize),
    Inc { local: usize, delta: i64 },
    /// Push a fresh symbolic input.
    Symbolic { name: Arc<str>, sort: Sort },

    // === Arithmetic ===
    IntArith(IntOp),
    IntNeg,
    RealArith(RealOp),
    RealNeg,
    IntToReal,
    RealToInt,
    /// Three-way integer compare pushing -1, 0 or 1.
    IntCmp,
    /// Three-way real compare; NaN yields 1 when `nan_greater`, else -1.
    RealCmp { nan_greater: bool },

    // === Control transfer ===
    /// Compare the top of the stack against zero.
    If { cond: Comparator, target: usize },
    IfCmp { cond: Comparator, target: usize },
    IfNull { target: usize },
    IfNonNull { target: usize },
    IfRefCmp { equal: bool, target: usize },
    Goto(usize),
    Switch {
        keys: Vec<i64>,
        targets: Vec<usize>,
        default: usize,
    },

    // === Fields and arrays ===
    GetField(FieldRef),
    PutField(FieldRef),
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    /// Operand is the element type.
    NewArray(TypeDesc),
    ArrayLoad,
    ArrayStore,
    ArrayLength,

    // === Objects and exceptions ===
    New(ClassRef),
    CheckCast(ClassRef),
    InstanceOf(ClassRef),
    Throw,

    // === Invocation ===
    InvokeStatic(MethodRef),
    InvokeVirtual(MethodRef),
    InvokeSpecial(MethodRef),
    Return,

    // === Locking and threads ===
    MonitorEnter,
    MonitorExit,
    /// Start a thread running a static method with popped arguments.
    Spawn(MethodRef),
    Yield,
}

/// Where control goes after an invocation of `execute`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    /// Continue at this offset of the current method.
    Goto(usize),
    /// The instruction already moved control (frame push or pop).
    Continue,
    /// Suspend: a choice generator was registered and the instruction
    /// runs again once it is resumed.
    Repeat,
    /// Dispatch this exception object through the handler tables.
    Throw(ObjRef),
    /// The thread returned from its last frame.
    Terminated,
}

/// What one invocation of an instruction observed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InsnRecord {
    /// Object or array accessed, locked, allocated or invoked on.
    pub object: Option<ObjRef>,
    /// Value read, written or pushed.
    pub value: Option<Slot>,
    /// Choice index consumed by a bottom half.
    pub choice: Option<usize>,
}

/// Per-invocation execution context.
pub struct Exec<'a> {
    pub(crate) program: &'a Program,
    pub(crate) config: &'a Config,
    pub(crate) kernel: &'a mut KernelState,
    pub(crate) system: &'a mut SystemState,
    pub(crate) tid: ThreadId,
    pub(crate) method: MethodId,
    pub(crate) pc: usize,
    pub(crate) first_step: bool,
    pub(crate) record: InsnRecord,
}

impl<'a> Exec<'a> {
    /// Context for the instruction at the top frame of `tid`.
    pub fn new(
        program: &'a Program,
        config: &'a Config,
        kernel: &'a mut KernelState,
        system: &'a mut SystemState,
        tid: ThreadId,
        first_step: bool,
    ) -> VmResult<Self> {
        let frame = kernel.thread(tid)?.top_frame()?;
        let (method, pc) = (frame.method, frame.pc);
        Ok(Self {
            program,
            config,
            kernel,
            system,
            tid,
            method,
            pc,
            first_step,
            record: InsnRecord::default(),
        })
    }

    /// True for the first instruction of a transition, which never
    /// re-checks scheduling: the thread choice was just made.
    pub fn is_first_step(&self) -> bool {
        self.first_step
    }

    pub fn record(&self) -> &InsnRecord {
        &self.record
    }

    pub fn into_record(self) -> InsnRecord {
        self.record
    }

    pub fn site(&self) -> Site {
        Site {
            thread: self.tid,
            method: self.method,
            pc: self.pc,
        }
    }

    pub(crate) fn insn_name(&self) -> String {
        self.program
            .method(self.method)
            .code
            .get(self.pc)
            .map(|i| i.to_string())
            .unwrap_or_default()
    }

    pub(crate) fn next(&self) -> Next {
        Next::Goto(self.pc + 1)
    }

    pub(crate) fn frame(&self) -> VmResult<&StackFrame> {
        self.kernel.thread(self.tid)?.top_frame()
    }

    pub(crate) fn frame_mut(&mut self) -> VmResult<&mut StackFrame> {
        self.kernel.thread_mut(self.tid)?.top_frame_mut()
    }

    pub(crate) fn push(&mut self, slot: Slot) -> VmResult<()> {
        self.frame_mut()?.push(slot);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> VmResult<Slot> {
        let insn = self.insn_name();
        self.frame_mut()?
            .pop()
            .ok_or(VmError::StackUnderflow { insn })
    }

    pub(crate) fn peek(&self, depth: usize) -> VmResult<Slot> {
        self.frame()?
            .peek(depth)
            .cloned()
            .ok_or_else(|| VmError::StackUnderflow {
                insn: self.insn_name(),
            })
    }

    pub(crate) fn type_error(&self, expected: &'static str) -> VmError {
        VmError::TypeMismatch {
            insn: self.insn_name(),
            expected,
        }
    }

    pub(crate) fn int_of(&self, slot: &Slot) -> VmResult<i64> {
        slot.value.as_int().ok_or_else(|| self.type_error("int"))
    }

    pub(crate) fn real_of(&self, slot: &Slot) -> VmResult<f64> {
        slot.value.as_real().ok_or_else(|| self.type_error("real"))
    }

    /// `None` for null.
    pub(crate) fn object_of(&self, slot: &Slot) -> VmResult<Option<ObjRef>> {
        slot.value
            .as_object()
            .ok_or_else(|| self.type_error("reference"))
    }

    pub(crate) fn held_locks(&self) -> VmResult<SmallVec<[ObjRef; 4]>> {
        Ok(self.kernel.thread(self.tid)?.held_locks.clone())
    }

    /// Record a committed access to `obj` (and `slot` of it) by this thread.
    pub(crate) fn commit_access(&mut self, obj: ObjRef, slot: Option<usize>) -> VmResult<()> {
        let held = self.held_locks()?;
        if self.kernel.heap.get(obj)?.access_changes(self.tid, slot, &held) {
            self.kernel
                .heap
                .get_mut(obj)?
                .record_access(self.tid, slot, &held);
        }
        self.record.object = Some(obj);
        Ok(())
    }

    /// A reference moved into or out of `container` makes its target
    /// reachable from every thread that reaches `container`.
    pub(crate) fn share_reachable(&mut self, container: ObjRef, moved: &Slot) -> VmResult<()> {
        let Value::Ref(target) = moved.value else {
            return Ok(());
        };
        let source = self.kernel.heap.get(container)?;
        if !source.is_shared(self.tid, |_| true) {
            return Ok(());
        }
        let global = source.is_global();
        let threads: SmallVec<[ThreadId; 4]> = source
            .referencing_threads()
            .iter()
            .copied()
            .chain(std::iter::once(self.tid))
            .collect();
        if self.kernel.heap.get(target)?.reachability_changes(global, &threads) {
            self.kernel
                .heap
                .get_mut(target)?
                .inherit_reachability(global, &threads);
        }
        Ok(())
    }

    /// Register the generator that suspends this instruction.
    pub(crate) fn register(&mut self, reason: &'static str, kind: CgKind) -> bool {
        let site = self.site();
        self.system.set_next_choice_generator(site, reason, kind)
    }

    /// The resumed choice if this is the bottom half of a decision of the
    /// given kind registered at this very site.
    pub(crate) fn resumed_choice(&self, matches: impl Fn(&CgKind) -> bool) -> Option<usize> {
        if !self.first_step {
            return None;
        }
        let cp = self.system.current()?;
        if cp.site != self.site() || !matches(&cp.kind) {
            return None;
        }
        cp.cursor()
    }

    /// Allocate an exception of `class` and dispatch it.
    pub(crate) fn throw(&mut self, class: &str, message: impl Into<Arc<str>>) -> VmResult<Next> {
        let exc = exception::create(self.kernel, self.program, class, Some(message.into()), self.tid)?;
        Ok(Next::Throw(exc))
    }
}

impl Instruction {
    /// Run this instruction for the thread and frame in `exec`.
    pub fn execute(&self, exec: &mut Exec<'_>) -> VmResult<Next> {
        match self {
            Instruction::Push(v) => stack::push(exec, *v),
            Instruction::Pop => stack::pop(exec),
            Instruction::Dup => stack::dup(exec),
            Instruction::Swap => stack::swap(exec),
            Instruction::Load(index) => stack::load(exec, *index),
            Instruction::Store(index) => stack::store(exec, *index),
            Instruction::Inc { local, delta } => stack::inc(exec, *local, *delta),
            Instruction::Symbolic { name, sort } => stack::symbolic(exec, name, *sort),

            Instruction::IntArith(op) => arith::int_arith(exec, *op),
            Instruction::IntNeg => arith::int_neg(exec),
            Instruction::RealArith(op) => arith::real_arith(exec, *op),
            Instruction::RealNeg => arith::real_neg(exec),
            Instruction::IntToReal => arith::int_to_real(exec),
            Instruction::RealToInt => arith::real_to_int(exec),
            Instruction::IntCmp => arith::int_cmp(exec),
            Instruction::RealCmp { nan_greater } => arith::real_cmp(exec, *nan_greater),

            Instruction::If { cond, target } => branch::if_zero(exec, *cond, *target),
            Instruction::IfCmp { cond, target } => branch::if_cmp(exec, *cond, *target),
            Instruction::IfNull { target } => branch::if_null(exec, true, *target),
            Instruction::IfNonNull { target } => branch::if_null(exec, false, *target),
            Instruction::IfRefCmp { equal, target } => branch::if_ref_cmp(exec, *equal, *target),
            Instruction::Goto(target) => Ok(Next::Goto(*target)),
            Instruction::Switch {
                keys,
                targets,
                default,
            } => branch::switch(exec, keys, targets, *default),

            Instruction::GetField(field) => field::get_field(exec, field),
            Instruction::PutField(field) => field::put_field(exec, field),
            Instruction::GetStatic(field) => field::get_static(exec, field),
            Instruction::PutStatic(field) => field::put_static(exec, field),
            Instruction::NewArray(elem) => array::new_array(exec, elem),
            Instruction::ArrayLoad => array::array_load(exec),
            Instruction::ArrayStore => array::array_store(exec),
            Instruction::ArrayLength => array::array_length(exec),

            Instruction::New(class) => object::new_object(exec, class),
            Instruction::CheckCast(class) => object::check_cast(exec, class),
            Instruction::InstanceOf(class) => object::instance_of(exec, class),
            Instruction::Throw => object::throw(exec),

            Instruction::InvokeStatic(m) | Instruction::InvokeSpecial(m) => invoke::invoke(exec, m.id, false),
            Instruction::InvokeVirtual(m) => invoke::invoke(exec, m.id, true),
            Instruction::Return => invoke::return_(exec),

            Instruction::MonitorEnter => monitor::monitor_enter(exec),
            Instruction::MonitorExit => monitor::monitor_exit(exec),
            Instruction::Spawn(m) => invoke::spawn(exec, m.id),
            Instruction::Yield => invoke::yield_(exec),
        }
    }

    /// True for instructions that can have a top half.
    pub fn may_suspend(&self) -> bool {
        matches!(
            self,
            Instruction::Load(_)
                | Instruction::IntArith(IntOp::Div | IntOp::Rem)
                | Instruction::IntCmp
                | Instruction::RealCmp { .. }
                | Instruction::If { .. }
                | Instruction::IfCmp { .. }
                | Instruction::Switch { .. }
                | Instruction::GetField(_)
                | Instruction::PutField(_)
                | Instruction::GetStatic(_)
                | Instruction::PutStatic(_)
                | Instruction::ArrayLoad
                | Instruction::ArrayStore
                | Instruction::InvokeStatic(_)
                | Instruction::InvokeVirtual(_)
                | Instruction::InvokeSpecial(_)
                | Instruction::MonitorEnter
                | Instruction::Yield
        )
    }

    /// Jump targets, fall-through excluded.
    pub fn targets(&self) -> SmallVec<[usize; 2]> {
        match self {
            Instruction::If { target, .. }
            | Instruction::IfCmp { target, .. }
            | Instruction::IfNull { target }
            | Instruction::IfNonNull { target }
            | Instruction::IfRefCmp { target, .. }
            | Instruction::Goto(target) => smallvec::smallvec![*target],
            Instruction::Switch {
                targets, default, ..
            } => targets.iter().copied().chain(std::iter::once(*default)).collect(),
            _ => SmallVec::new(),
        }
    }

    /// True if control never falls through to the next offset.
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            Instruction::Goto(_) | Instruction::Switch { .. } | Instruction::Return | Instruction::Throw
        )
    }
}

fn comparator_suffix(cond: Comparator) -> &'static str {
    match cond {
        Comparator::Eq => "eq",
        Comparator::Ne => "ne",
        Comparator::Lt => "lt",
        Comparator::Le => "le",
        Comparator::Gt => "gt",
        Comparator::Ge => "ge",
    }
}

fn int_mnemonic(op: IntOp) -> &'static str {
    match op {
        IntOp::Add => "add",
        IntOp::Sub => "sub",
        IntOp::Mul => "mul",
        IntOp::Div => "div",
        IntOp::Rem => "rem",
        IntOp::And => "and",
        IntOp::Or => "or",
        IntOp::Xor => "xor",
        IntOp::Shl => "shl",
        IntOp::Shr => "shr",
        IntOp::UShr => "ushr",
    }
}

fn real_mnemonic(op: RealOp) -> &'static str {
    match op {
        RealOp::Add => "fadd",
        RealOp::Sub => "fsub",
        RealOp::Mul => "fmul",
        RealOp::Div => "fdiv",
        RealOp::Rem => "frem",
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Push(Value::Null) => write!(f, "pushnull"),
            Instruction::Push(v) => write!(f, "push {}", v),
            Instruction::Pop => write!(f, "pop"),
            Instruction::Dup => write!(f, "dup"),
            Instruction::Swap => write!(f, "swap"),
            Instruction::Load(i) => write!(f, "load {}", i),
            Instruction::Store(i) => write!(f, "store {}", i),
            Instruction::Inc { local, delta } => write!(f, "inc {} {}", local, delta),
            Instruction::Symbolic { name, sort } => write!(f, "sym {} {}", name, sort),
            Instruction::IntArith(op) => write!(f, "{}", int_mnemonic(*op)),
            Instruction::IntNeg => write!(f, "neg"),
            Instruction::RealArith(op) => write!(f, "{}", real_mnemonic(*op)),
            Instruction::RealNeg => write!(f, "fneg"),
            Instruction::IntToReal => write!(f, "i2f"),
            Instruction::RealToInt => write!(f, "f2i"),
            Instruction::IntCmp => write!(f, "cmp"),
            Instruction::RealCmp { nan_greater: true } => write!(f, "fcmpg"),
            Instruction::RealCmp { nan_greater: false } => write!(f, "fcmpl"),
            Instruction::If { cond, target } => write!(f, "if{} {}", comparator_suffix(*cond), target),
            Instruction::IfCmp { cond, target } => {
                write!(f, "if_cmp{} {}", comparator_suffix(*cond), target)
            }
            Instruction::IfNull { target } => write!(f, "ifnull {}", target),
            Instruction::IfNonNull { target } => write!(f, "ifnonnull {}", target),
            Instruction::IfRefCmp { equal: true, target } => write!(f, "if_acmpeq {}", target),
            Instruction::IfRefCmp { equal: false, target } => write!(f, "if_acmpne {}", target),
            Instruction::Goto(target) => write!(f, "goto {}", target),
            Instruction::Switch {
                keys,
                targets,
                default,
            } => {
                write!(f, "switch")?;
                for (key, target) in keys.iter().zip(targets) {
                    write!(f, " {} -> {},", key, target)?;
                }
                write!(f, " default -> {}", default)
            }
            Instruction::GetField(r) => write!(f, "getfield {}", r.name),
            Instruction::PutField(r) => write!(f, "putfield {}", r.name),
            Instruction::GetStatic(r) => write!(f, "getstatic {}", r.name),
            Instruction::PutStatic(r) => write!(f, "putstatic {}", r.name),
            Instruction::NewArray(elem) => write!(f, "newarray {}", elem),
            Instruction::ArrayLoad => write!(f, "arrayload"),
            Instruction::ArrayStore => write!(f, "arraystore"),
            Instruction::ArrayLength => write!(f, "arraylength"),
            Instruction::New(c) => write!(f, "new {}", c.name),
            Instruction::CheckCast(c) => write!(f, "checkcast {}", c.name),
            Instruction::InstanceOf(c) => write!(f, "instanceof {}", c.name),
            Instruction::Throw => write!(f, "throw"),
            Instruction::InvokeStatic(m) => write!(f, "invokestatic {}", m.name),
            Instruction::InvokeVirtual(m) => write!(f, "invokevirtual {}", m.name),
            Instruction::InvokeSpecial(m) => write!(f, "invokespecial {}", m.name),
            Instruction::Return => write!(f, "return"),
            Instruction::MonitorEnter => write!(f, "monitorenter"),
            Instruction::MonitorExit => write!(f, "monitorexit"),
            Instruction::Spawn(m) => write!(f, "spawn {}", m.name),
            Instruction::Yield => write!(f, "yield"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_mnemonics() {
        assert_eq!(Instruction::Push(Value::Null).to_string(), "pushnull");
        assert_eq!(
            Instruction::If {
                cond: Comparator::Lt,
                target: 7
            }
            .to_string(),
            "iflt 7"
        );
        assert_eq!(
            Instruction::RealCmp { nan_greater: true }.to_string(),
            "fcmpg"
        );
        assert_eq!(
            Instruction::Switch {
                keys: vec![1, 2],
                targets: vec![4, 6],
                default: 8
            }
            .to_string(),
            "switch 1 -> 4, 2 -> 6, default -> 8"
        );
    }

    #[test]
    fn test_targets_and_block_ends() {
        let switch = Instruction::Switch {
            keys: vec![1],
            targets: vec![3],
            default: 5,
        };
        assert_eq!(switch.targets().as_slice(), &[3, 5]);
        assert!(switch.ends_block());
        assert!(!Instruction::IfNull { target: 2 }.ends_block());
        assert!(Instruction::IntArith(IntOp::Div).may_suspend());
        assert!(!Instruction::IntArith(IntOp::Add).may_suspend());
    }
}
