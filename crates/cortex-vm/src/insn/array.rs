//! Array allocation and element access.

use super::{Exec, Next};
use crate::choice::CgKind;
use crate::error::{VmError, VmResult};
use crate::program::TypeDesc;
use crate::schedule::{SchedulerFactory, SchedulingFilter};
use crate::value::{ObjRef, Slot, Value};

fn concrete_index(exec: &Exec<'_>, slot: &Slot) -> VmResult<i64> {
    if let Some(attr) = &slot.attr {
        return Err(VmError::Unsupported(format!("symbolic array index {}", attr)));
    }
    exec.int_of(slot)
}

fn break_on_element(exec: &mut Exec<'_>, array: ObjRef) -> VmResult<bool> {
    if exec.first_step {
        return Ok(false);
    }
    let ei = exec.kernel.heap.get(array)?;
    if !SchedulingFilter::new(exec.config).is_array_access_relevant(exec.kernel, exec.tid, ei) {
        return Ok(false);
    }
    let Some(threads) = SchedulerFactory::new(exec.config).shared_access_choice(exec.kernel) else {
        return Ok(false);
    };
    Ok(exec.register("sharedArray", CgKind::threads(threads)))
}

/// Resolve `array[index]` from the stack at `depth` and `depth + 1`,
/// throwing for null arrays and bad indices.
fn element(exec: &mut Exec<'_>, depth: usize, operands: usize) -> VmResult<Result<(ObjRef, usize), Next>> {
    let index = exec.peek(depth)?;
    let Some(array) = exec.object_of(&exec.peek(depth + 1)?)? else {
        for _ in 0..operands {
            exec.pop()?;
        }
        return exec
            .throw("NullPointerException", "array access on null")
            .map(Err);
    };
    let i = concrete_index(exec, &index)?;
    let len = exec.kernel.heap.get(array)?.len();
    match usize::try_from(i) {
        Ok(i) if i < len => Ok(Ok((array, i))),
        _ => {
            for _ in 0..operands {
                exec.pop()?;
            }
            exec.throw(
                "ArrayIndexOutOfBoundsException",
                format!("index {} out of bounds for length {}", i, len),
            )
            .map(Err)
        }
    }
}

pub(super) fn new_array(exec: &mut Exec<'_>, elem: &TypeDesc) -> VmResult<Next> {
    let length = exec.pop()?;
    if let Some(attr) = &length.attr {
        return Err(VmError::Unsupported(format!("symbolic array length {}", attr)));
    }
    let n = exec.int_of(&length)?;
    let Ok(len) = usize::try_from(n) else {
        return exec.throw("NegativeArraySizeException", n.to_string());
    };
    if exec.kernel.heap.is_out_of_memory(exec.config.max_heap_objects) {
        return exec.throw("OutOfMemoryError", "heap limit reached");
    }
    let limit = exec.config.max_array_length;
    if limit != 0 && len > limit {
        return exec.throw("OutOfMemoryError", format!("array length {} exceeds {}", len, limit));
    }
    let Some(array) = exec.kernel.heap.allocate_array(elem.clone(), len, exec.tid) else {
        return exec.throw("OutOfMemoryError", format!("cannot allocate array of length {}", len));
    };
    exec.record.object = Some(array);
    exec.push(Slot::concrete(Value::Ref(array)))?;
    Ok(exec.next())
}

pub(super) fn array_load(exec: &mut Exec<'_>) -> VmResult<Next> {
    let (array, index) = match element(exec, 0, 2)? {
        Ok(found) => found,
        Err(next) => return Ok(next),
    };
    if break_on_element(exec, array)? {
        return Ok(Next::Repeat);
    }
    let slot = exec.kernel.heap.get(array)?.slot(index)?.clone();
    exec.pop()?;
    exec.pop()?;
    exec.commit_access(array, None)?;
    exec.share_reachable(array, &slot)?;
    exec.record.value = Some(slot.clone());
    exec.push(slot)?;
    Ok(exec.next())
}

pub(super) fn array_store(exec: &mut Exec<'_>) -> VmResult<Next> {
    let (array, index) = match element(exec, 1, 3)? {
        Ok(found) => found,
        Err(next) => return Ok(next),
    };
    if break_on_element(exec, array)? {
        return Ok(Next::Repeat);
    }
    let value = exec.pop()?;
    exec.pop()?;
    exec.pop()?;
    exec.kernel
        .heap
        .get_mut(array)?
        .set_slot(index, value.clone())?;
    exec.commit_access(array, None)?;
    exec.share_reachable(array, &value)?;
    exec.record.value = Some(value);
    Ok(exec.next())
}

pub(super) fn array_length(exec: &mut Exec<'_>) -> VmResult<Next> {
    let operand = exec.pop()?;
    let Some(array) = exec.object_of(&operand)? else {
        return exec.throw("NullPointerException", "length of null array");
    };
    let ei = exec.kernel.heap.get(array)?;
    if !ei.is_array() {
        return Err(exec.type_error("array"));
    }
    let len = ei.len() as i64;
    exec.record.object = Some(array);
    exec.push(Slot::concrete(Value::Int(len)))?;
    Ok(exec.next())
}
