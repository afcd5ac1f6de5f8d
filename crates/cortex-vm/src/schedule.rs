//! Scheduling points: which accesses may interleave, and the thread
//! choices registered for them.

use crate::config::Config;
use crate::heap::ElementInfo;
use crate::insn::Instruction;
use crate::kernel::KernelState;
use crate::program::{FieldInfo, MethodInfo};
use crate::value::{ObjRef, ThreadId};

/// Decides whether a memory access is an interleaving point.
///
/// Every rule here only removes choice points. With all of them disabled
/// each access to an object reachable by another runnable thread breaks
/// the transition.
pub struct SchedulingFilter<'a> {
    config: &'a Config,
}

impl<'a> SchedulingFilter<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Instance field access by `tid` at `method`/`pc`.
    pub fn is_field_access_relevant(
        &self,
        kernel: &KernelState,
        tid: ThreadId,
        ei: &ElementInfo,
        field: &FieldInfo,
        method: &MethodInfo,
        pc: usize,
    ) -> bool {
        if !self.config.por_field_boundaries || field.never_shared {
            return false;
        }
        if !ei.is_shared(tid, |t| kernel.is_runnable(t)) || ei.immutable {
            return false;
        }
        if !has_other_runnables(kernel, tid) {
            return false;
        }
        if !self.config.por_sync_detection {
            return true;
        }
        if field.always_shared {
            return true;
        }
        if self.config.skip_finals && field.is_final {
            return false;
        }
        if field.name.starts_with("this$") {
            return false;
        }
        if is_monitor_enter_prologue(method, pc) || !method.is_sync_relevant() {
            return false;
        }
        !is_lock_protected(kernel, tid, ei, field.slot)
    }

    /// Static field access by `tid` at `method`/`pc`. Statics are reachable
    /// from every thread, so only the other rules apply.
    pub fn is_static_access_relevant(
        &self,
        kernel: &KernelState,
        tid: ThreadId,
        statics: &ElementInfo,
        field: &FieldInfo,
        method: &MethodInfo,
        pc: usize,
    ) -> bool {
        if !self.config.por_field_boundaries || field.never_shared {
            return false;
        }
        if !has_other_runnables(kernel, tid) {
            return false;
        }
        if !self.config.por_sync_detection {
            return true;
        }
        if field.always_shared {
            return true;
        }
        if (self.config.skip_finals || self.config.skip_static_finals) && field.is_final {
            return false;
        }
        // class initializer of the declaring class
        if &*method.name == "<clinit>" && method.class == field.declaring {
            return false;
        }
        if is_monitor_enter_prologue(method, pc) || statics.immutable {
            return false;
        }
        !is_lock_protected(kernel, tid, statics, field.slot)
    }

    /// Array element access by `tid`.
    pub fn is_array_access_relevant(&self, kernel: &KernelState, tid: ThreadId, array: &ElementInfo) -> bool {
        self.config.break_arrays
            && has_other_runnables(kernel, tid)
            && array.is_shared(tid, |t| kernel.is_runnable(t))
    }
}

fn has_other_runnables(kernel: &KernelState, tid: ThreadId) -> bool {
    kernel
        .threads
        .iter()
        .any(|t| t.id != tid && t.is_runnable())
}

fn is_lock_protected(kernel: &KernelState, tid: ThreadId, ei: &ElementInfo, slot: usize) -> bool {
    kernel
        .thread(tid)
        .map_or(false, |t| ei.is_lock_protected(slot, &t.held_locks))
}

/// `getfield x; dup; [store n;] monitorenter` reads the lock object of a
/// synchronized block.
fn is_monitor_enter_prologue(method: &MethodInfo, pc: usize) -> bool {
    let at = |i: usize| method.code.get(pc + i);
    match (at(1), at(2), at(3)) {
        (Some(Instruction::Dup), Some(Instruction::MonitorEnter), _) => true,
        (Some(Instruction::Dup), Some(Instruction::Store(_)), Some(Instruction::MonitorEnter)) => true,
        _ => false,
    }
}

/// Builds the thread choices for scheduling points.
pub struct SchedulerFactory<'a> {
    config: &'a Config,
}

impl<'a> SchedulerFactory<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Runnable threads, or `None` when an optional choice would be
    /// trivial.
    fn optional(&self, kernel: &KernelState) -> Option<Vec<ThreadId>> {
        let runnable = kernel.runnable_threads();
        if runnable.len() > 1 || (runnable.len() == 1 && self.config.break_single_choice) {
            Some(runnable)
        } else {
            None
        }
    }

    pub fn shared_access_choice(&self, kernel: &KernelState) -> Option<Vec<ThreadId>> {
        self.optional(kernel)
    }

    /// Monitor entry. A blocking entry always yields a choice, possibly
    /// empty when nothing else can run.
    pub fn monitor_enter_choice(&self, kernel: &KernelState, blocking: bool) -> Option<Vec<ThreadId>> {
        if blocking {
            Some(kernel.runnable_threads())
        } else {
            self.optional(kernel)
        }
    }

    /// After a thread ended: whoever can still run.
    pub fn termination_choice(&self, kernel: &KernelState) -> Vec<ThreadId> {
        kernel.runnable_threads()
    }

    pub fn start_choice(&self, kernel: &KernelState) -> Option<Vec<ThreadId>> {
        if self.config.break_start {
            self.optional(kernel)
        } else {
            None
        }
    }

    pub fn yield_choice(&self, kernel: &KernelState) -> Option<Vec<ThreadId>> {
        if self.config.break_yield {
            self.optional(kernel)
        } else {
            None
        }
    }

    /// Forced preemption of a long transition at a backward jump.
    pub fn preemption_choice(&self, kernel: &KernelState) -> Vec<ThreadId> {
        kernel.runnable_threads()
    }

    /// Optional choice at entry to an uncontended but shared monitor.
    pub fn sync_entry_choice(
        &self,
        kernel: &KernelState,
        tid: ThreadId,
        lock: ObjRef,
        ei: &ElementInfo,
    ) -> Option<Vec<ThreadId>> {
        let holds = kernel.thread(tid).map_or(false, |t| t.holds_lock(lock));
        if holds || !ei.is_shared(tid, |t| kernel.is_runnable(t)) {
            return None;
        }
        self.optional(kernel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load;
    use crate::program::{Program, TypeDesc};
    use crate::thread::{StackFrame, ThreadStatus};

    const SRC: &str = r#"
immutable class Point {
    field x: int
}
class Box {
    field value: int
    field lock: Box
    final field limit: int
    @nonshared field scratch: int
    @shared field flag: int
}
class Main {
    static field count: int
    static final field max: int
    static method main() {
        return
    }
    static method read(b: Box) -> int {
        load b
        getfield Box.value
        return
    }
    static method enter(b: Box) {
        load b
        getfield Box.lock
        dup
        store l
        monitorenter
        load l
        monitorexit
        return
    }
}
entry Main.main
"#;

    fn program() -> Program {
        load(&cortex_syntax::parse(SRC).unwrap()).unwrap()
    }

    /// Main thread plus `workers` runnable threads.
    fn kernel(program: &Program, workers: usize) -> KernelState {
        let entry = program.entry().unwrap();
        let mut kernel = KernelState::boot(program, &Config::default(), entry).unwrap();
        let main = program.method(entry);
        for _ in 0..workers {
            kernel.spawn(StackFrame::new(main.id, main.max_locals));
        }
        kernel
    }

    /// A `class` object created by thread 0 and reached by thread 1.
    fn shared_object(program: &Program, kernel: &mut KernelState, class: &str) -> ObjRef {
        let obj = kernel
            .heap
            .allocate_object(program.class_by_name(class).unwrap(), ThreadId(0));
        kernel.heap.get_mut(obj).unwrap().add_referencing_thread(ThreadId(1));
        obj
    }

    fn field_relevant(
        config: &Config,
        program: &Program,
        kernel: &KernelState,
        obj: ObjRef,
        field: &str,
        method: &str,
        pc: usize,
    ) -> bool {
        let ei = kernel.heap.get(obj).unwrap();
        let class = ei.class().unwrap();
        let field = program.find_field(class, field).unwrap();
        let method = program.method_by_name("Main", method).unwrap();
        SchedulingFilter::new(config).is_field_access_relevant(kernel, ThreadId(0), ei, field, method, pc)
    }

    fn static_relevant(
        config: &Config,
        program: &Program,
        kernel: &KernelState,
        field: &str,
        method: &MethodInfo,
    ) -> bool {
        let class = program.class_by_name("Main").unwrap().id;
        let field = program.find_static_field(class, field).unwrap();
        let statics = kernel.heap.get(kernel.heap.statics(class)).unwrap();
        SchedulingFilter::new(config).is_static_access_relevant(kernel, ThreadId(0), statics, field, method, 0)
    }

    #[test]
    fn test_shared_field_access_is_relevant() {
        let program = program();
        let config = Config::default();
        let mut kernel = kernel(&program, 1);
        let obj = shared_object(&program, &mut kernel, "Box");
        assert!(field_relevant(&config, &program, &kernel, obj, "value", "read", 1));

        let private = kernel
            .heap
            .allocate_object(program.class_by_name("Box").unwrap(), ThreadId(0));
        assert!(!field_relevant(&config, &program, &kernel, private, "value", "read", 1));

        let off = Config {
            por_field_boundaries: false,
            ..Config::default()
        };
        assert!(!field_relevant(&off, &program, &kernel, obj, "value", "read", 1));
    }

    #[test]
    fn test_sharedness_counts_only_runnable_threads() {
        let program = program();
        let config = Config::default();
        let mut kernel = kernel(&program, 1);
        let obj = shared_object(&program, &mut kernel, "Box");
        kernel.thread_mut(ThreadId(1)).unwrap().status = ThreadStatus::Terminated;
        assert!(!field_relevant(&config, &program, &kernel, obj, "value", "read", 1));
    }

    #[test]
    fn test_field_annotations() {
        let program = program();
        let config = Config::default();
        let mut kernel = kernel(&program, 1);
        let obj = shared_object(&program, &mut kernel, "Box");
        assert!(!field_relevant(&config, &program, &kernel, obj, "scratch", "read", 1));

        // @shared wins over lock protection
        let lock = kernel
            .heap
            .allocate_object(program.class_by_name("Box").unwrap(), ThreadId(0));
        let flag = program.find_field(program.class_by_name("Box").unwrap().id, "flag").unwrap().slot;
        kernel.heap.get_mut(obj).unwrap().record_access(ThreadId(0), Some(flag), &[lock]);
        kernel.thread_mut(ThreadId(0)).unwrap().held_locks.push(lock);
        assert!(field_relevant(&config, &program, &kernel, obj, "flag", "read", 1));
    }

    #[test]
    fn test_immutable_objects_are_not_relevant() {
        let program = program();
        let mut kernel = kernel(&program, 1);
        let point = shared_object(&program, &mut kernel, "Point");
        assert!(!field_relevant(&Config::default(), &program, &kernel, point, "x", "read", 1));
    }

    #[test]
    fn test_final_fields() {
        let program = program();
        let mut kernel = kernel(&program, 1);
        let obj = shared_object(&program, &mut kernel, "Box");
        let main = program.method_by_name("Main", "main").unwrap();

        let config = Config::default();
        assert!(!field_relevant(&config, &program, &kernel, obj, "limit", "read", 1));
        assert!(!static_relevant(&config, &program, &kernel, "max", main));

        let finals_only = Config {
            skip_finals: false,
            skip_static_finals: true,
            ..Config::default()
        };
        assert!(field_relevant(&finals_only, &program, &kernel, obj, "limit", "read", 1));
        assert!(!static_relevant(&finals_only, &program, &kernel, "max", main));

        let none = Config {
            skip_finals: false,
            skip_static_finals: false,
            ..Config::default()
        };
        assert!(static_relevant(&none, &program, &kernel, "max", main));
    }

    #[test]
    fn test_lock_protected_field_is_not_relevant() {
        let program = program();
        let config = Config::default();
        let mut kernel = kernel(&program, 1);
        let obj = shared_object(&program, &mut kernel, "Box");
        let lock = kernel
            .heap
            .allocate_object(program.class_by_name("Box").unwrap(), ThreadId(0));
        let value = program.find_field(program.class_by_name("Box").unwrap().id, "value").unwrap().slot;
        {
            let ei = kernel.heap.get_mut(obj).unwrap();
            ei.record_access(ThreadId(0), Some(value), &[lock]);
            ei.record_access(ThreadId(1), Some(value), &[lock]);
        }
        assert!(field_relevant(&config, &program, &kernel, obj, "value", "read", 1));
        kernel.thread_mut(ThreadId(0)).unwrap().held_locks.push(lock);
        assert!(!field_relevant(&config, &program, &kernel, obj, "value", "read", 1));

        let no_sync = Config {
            por_sync_detection: false,
            ..Config::default()
        };
        assert!(field_relevant(&no_sync, &program, &kernel, obj, "value", "read", 1));
    }

    #[test]
    fn test_monitor_enter_prologue_is_not_relevant() {
        let program = program();
        let config = Config::default();
        let mut kernel = kernel(&program, 1);
        let obj = shared_object(&program, &mut kernel, "Box");
        assert!(!field_relevant(&config, &program, &kernel, obj, "lock", "enter", 1));
        assert!(field_relevant(&config, &program, &kernel, obj, "lock", "read", 1));
    }

    #[test]
    fn test_statics_are_relevant_before_any_access() {
        let program = program();
        let config = Config::default();
        let main = program.method_by_name("Main", "main").unwrap();
        let kernel = kernel(&program, 2);
        assert!(static_relevant(&config, &program, &kernel, "count", main));

        let alone = self::kernel(&program, 0);
        assert!(!static_relevant(&config, &program, &alone, "count", main));
    }

    #[test]
    fn test_class_initializer_is_exempt() {
        let program = program();
        let config = Config::default();
        let kernel = kernel(&program, 1);
        let mut clinit = program.method_by_name("Main", "main").unwrap().clone();
        clinit.name = "<clinit>".into();
        assert!(!static_relevant(&config, &program, &kernel, "count", &clinit));

        clinit.class = program.class_by_name("Box").unwrap().id;
        assert!(static_relevant(&config, &program, &kernel, "count", &clinit));
    }

    #[test]
    fn test_array_breaks_are_opt_in() {
        let program = program();
        let mut kernel = kernel(&program, 1);
        let array = kernel.heap.allocate_array(TypeDesc::Int, 2, ThreadId(0)).unwrap();
        kernel.heap.get_mut(array).unwrap().add_referencing_thread(ThreadId(1));
        let ei = kernel.heap.get(array).unwrap();

        let config = Config::default();
        assert!(!SchedulingFilter::new(&config).is_array_access_relevant(&kernel, ThreadId(0), ei));
        let arrays = Config {
            break_arrays: true,
            ..Config::default()
        };
        assert!(SchedulingFilter::new(&arrays).is_array_access_relevant(&kernel, ThreadId(0), ei));
    }

    #[test]
    fn test_single_runnable_thread_gets_no_optional_choice() {
        let program = program();
        let config = Config::default();
        let mut kernel = kernel(&program, 1);
        let factory = SchedulerFactory::new(&config);
        assert_eq!(factory.shared_access_choice(&kernel), Some(vec![ThreadId(0), ThreadId(1)]));

        kernel.thread_mut(ThreadId(1)).unwrap().status = ThreadStatus::Terminated;
        assert_eq!(factory.shared_access_choice(&kernel), None);
        assert_eq!(factory.monitor_enter_choice(&kernel, true), Some(vec![ThreadId(0)]));

        let single = Config {
            break_single_choice: true,
            ..Config::default()
        };
        let factory = SchedulerFactory::new(&single);
        assert_eq!(factory.shared_access_choice(&kernel), Some(vec![ThreadId(0)]));
    }
}
