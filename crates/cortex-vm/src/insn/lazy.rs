//! Lazy initialization of symbolic references.
//!
//! A reference input starts out as a symbolic integer in `[-1, max_int]`.
//! Its first dereference chooses among aliasing each compatible object
//! already materialized on this path, null, and a fresh object whose
//! fields are again symbolic. The choice is recorded in the symbolic input
//! heap and the heap path condition of the generator.

use super::Exec;
use crate::choice::{CgKind, HeapState};
use crate::error::{VmError, VmResult};
use crate::program::{ClassInfo, Program, TypeDesc};
use crate::value::{ObjRef, Slot, Value};
use cortex_symbolic::{Comparator, Expr, ExprRef, HeapNode, SymbolicInputHeap};
use tracing::debug;

/// Where the symbolic reference lives.
#[derive(Clone, Copy, Debug)]
pub(super) enum LazySlot {
    Local(usize),
    Field { obj: ObjRef, slot: usize },
}

pub(super) enum LazyStep {
    /// A heap choice was registered.
    Suspend,
    /// The reference now holds this concrete value.
    Resolved(Value),
}

fn candidates(program: &Program, heap: &SymbolicInputHeap, declared: &str) -> Vec<HeapNode> {
    heap.nodes_of_type(|t| program.is_assignable(t, declared))
        .cloned()
        .collect()
}

pub(super) fn initialize(exec: &mut Exec<'_>, slot: LazySlot, attr: &ExprRef, declared: &str) -> VmResult<LazyStep> {
    let program = exec.program;
    let class = program
        .class_by_name(declared)
        .ok_or_else(|| VmError::Invariant(format!("unknown class '{}'", declared)))?;
    if let Some(choice) = exec.resumed_choice(|k| matches!(k, CgKind::Heap { .. })) {
        exec.record.choice = Some(choice);
        return resolve(exec, slot, attr, class, choice).map(LazyStep::Resolved);
    }
    let aliases = candidates(program, &exec.system.heap_state().heap, declared).len();
    let outcomes = if class.is_abstract {
        aliases + 1
    } else {
        aliases + 2
    };
    if !exec.register("lazyInit", CgKind::heap(outcomes)) {
        return Err(VmError::Invariant(format!(
            "lazy initialization at {} found a choice already pending",
            exec.site()
        )));
    }
    Ok(LazyStep::Suspend)
}

/// Bottom half: choice `< M` aliases the M-th candidate, `M` is null and
/// `M + 1` a fresh object.
fn resolve(exec: &mut Exec<'_>, slot: LazySlot, attr: &ExprRef, class: &ClassInfo, choice: usize) -> VmResult<Value> {
    let current = exec
        .system
        .current()
        .map(|cp| cp.id)
        .ok_or_else(|| VmError::Invariant("heap commit without a generator".into()))?;
    let HeapState { mut condition, mut heap } = exec.system.inherited_heap_state(current);
    let aliases = candidates(exec.program, &heap, &class.name);

    let value = if let Some(node) = aliases.get(choice) {
        condition.add(Comparator::Eq, attr.clone(), node.discriminator.clone())?;
        Value::Ref(ObjRef(node.index))
    } else if choice == aliases.len() {
        condition.add(Comparator::Eq, attr.clone(), Expr::int(-1))?;
        Value::Null
    } else if choice == aliases.len() + 1 && !class.is_abstract {
        let obj = materialize(exec, class)?;
        let discriminator = Expr::int_var(exec.kernel.fresh_name(&class.name), 0, exec.config.max_int);
        condition.add(Comparator::Eq, attr.clone(), discriminator.clone())?;
        heap.push(HeapNode {
            index: obj.0,
            type_name: class.name.clone(),
            discriminator,
        });
        Value::Ref(obj)
    } else {
        return Err(VmError::Invariant(format!(
            "heap choice {} out of range for {}",
            choice, class.name
        )));
    };
    debug!(site = %exec.site(), class = %class.name, choice, "lazy initialization");

    let resolved = Slot::concrete(value);
    match slot {
        LazySlot::Local(index) => exec.frame_mut()?.set_local(index, resolved)?,
        LazySlot::Field { obj, slot } => exec.kernel.heap.get_mut(obj)?.set_slot(slot, resolved)?,
    }
    exec.system.commit_heap_state(HeapState { condition, heap })?;
    exec.record.object = value.as_object().flatten();
    Ok(value)
}

/// A fresh object whose fields are symbolic inputs. Array fields start out
/// null. The heap limit does not apply.
fn materialize(exec: &mut Exec<'_>, class: &ClassInfo) -> VmResult<ObjRef> {
    let obj = exec.kernel.heap.allocate_object(class, exec.tid);
    for field in &class.fields {
        let slot = match field.ty {
            TypeDesc::Array(_) => Slot::concrete(Value::Null),
            _ => exec.kernel.fresh_input(&field.name, &field.ty, exec.config)?,
        };
        exec.kernel.heap.get_mut(obj)?.set_slot(field.slot, slot)?;
    }
    Ok(obj)
}
