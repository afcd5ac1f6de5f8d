//! Values, attributed slots and handles.

use cortex_symbolic::ExprRef;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Index of an object in the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(pub u32);

impl ObjRef {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Index of a modeled thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl ThreadId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// A concrete value.
#[derive(Clone, Copy, Debug)]
pub enum Value {
    Int(i64),
    Real(f64),
    Ref(ObjRef),
    Null,
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// `Some(None)` for null, `None` for non-references.
    pub fn as_object(&self) -> Option<Option<ObjRef>> {
        match self {
            Value::Ref(r) => Some(Some(*r)),
            Value::Null => Some(None),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Ref(_) | Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(n) => n.hash(state),
            Value::Real(r) => r.to_bits().hash(state),
            Value::Ref(r) => r.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Real(r) => write!(f, "{:?}", r),
            Value::Ref(r) => write!(f, "{}", r),
            Value::Null => write!(f, "null"),
        }
    }
}

/// An operand, local, field or array element: a concrete value plus an
/// optional symbolic attribute. With an attribute present the concrete
/// value is a placeholder.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    pub value: Value,
    pub attr: Option<ExprRef>,
}

impl Slot {
    pub fn concrete(value: Value) -> Self {
        Self { value, attr: None }
    }

    pub fn symbolic(value: Value, attr: ExprRef) -> Self {
        Self {
            value,
            attr: Some(attr),
        }
    }

    pub fn is_symbolic(&self) -> bool {
        self.attr.is_some()
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Slot::concrete(value)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attr {
            Some(attr) => write!(f, "{}", attr),
            None => write!(f, "{}", self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_symbolic::Expr;

    #[test]
    fn test_real_equality_is_bitwise() {
        assert_eq!(Value::Real(f64::NAN), Value::Real(f64::NAN));
        assert_ne!(Value::Real(0.0), Value::Real(-0.0));
        assert_ne!(Value::Int(0), Value::Real(0.0));
    }

    #[test]
    fn test_slot_display_prefers_attribute() {
        let slot = Slot::symbolic(Value::Int(0), Expr::int_var("x_1", 0, 9));
        assert_eq!(slot.to_string(), "x_1");
        assert_eq!(Slot::concrete(Value::Null).to_string(), "null");
        assert_eq!(Value::Null.as_object(), Some(None));
        assert_eq!(Value::Int(3).as_object(), None);
    }
}
