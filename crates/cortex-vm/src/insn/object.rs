use super::{ClassRef, Exec, Next};
use crate::error::VmResult;
use crate::heap::ElementKind;
use crate::value::{ObjRef, Slot, Value};

pub(super) fn new_object(exec: &mut Exec<'_>, class: &ClassRef) -> VmResult<Next> {
    if exec.kernel.heap.is_out_of_memory(exec.config.max_heap_objects) {
        return exec.throw("OutOfMemoryError", "heap limit reached");
    }
    let info = exec.program.class(class.id);
    let obj = exec.kernel.heap.allocate_object(info, exec.tid);
    exec.record.object = Some(obj);
    exec.push(Slot::concrete(Value::Ref(obj)))?;
    Ok(exec.next())
}

fn is_instance(exec: &Exec<'_>, obj: ObjRef, class: &ClassRef) -> VmResult<bool> {
    Ok(match &exec.kernel.heap.get(obj)?.kind {
        ElementKind::Object(id) => exec.program.is_subclass(*id, class.id),
        ElementKind::Array(_) => &*class.name == "Object",
        ElementKind::Statics(_) => false,
    })
}

pub(super) fn check_cast(exec: &mut Exec<'_>, class: &ClassRef) -> VmResult<Next> {
    let operand = exec.peek(0)?;
    let Some(obj) = exec.object_of(&operand)? else {
        return Ok(exec.next());
    };
    if is_instance(exec, obj, class)? {
        return Ok(exec.next());
    }
    exec.pop()?;
    exec.throw("ClassCastException", format!("{} is not a {}", obj, class.name))
}

pub(super) fn instance_of(exec: &mut Exec<'_>, class: &ClassRef) -> VmResult<Next> {
    let operand = exec.pop()?;
    let result = match exec.object_of(&operand)? {
        Some(obj) => is_instance(exec, obj, class)?,
        None => false,
    };
    exec.push(Slot::concrete(Value::Int(result as i64)))?;
    Ok(exec.next())
}

pub(super) fn throw(exec: &mut Exec<'_>) -> VmResult<Next> {
    let operand = exec.pop()?;
    match exec.object_of(&operand)? {
        Some(exc) => {
            exec.record.object = Some(exc);
            Ok(Next::Throw(exc))
        }
        None => exec.throw("NullPointerException", "throw of null"),
    }
}
