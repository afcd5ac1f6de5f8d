//! Loaded program model: classes, fields and methods with decoded code.

use crate::insn::Instruction;
use crate::value::Value;
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl ClassId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

impl MethodId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Declared type of a field, parameter or array element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Int,
    Real,
    Class(Arc<str>),
    Array(Box<TypeDesc>),
}

impl TypeDesc {
    pub fn is_reference(&self) -> bool {
        matches!(self, TypeDesc::Class(_) | TypeDesc::Array(_))
    }

    /// The class name for class types.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            TypeDesc::Class(name) => Some(name),
            _ => None,
        }
    }

    /// Zero value a freshly allocated slot of this type holds.
    pub fn default_value(&self) -> Value {
        match self {
            TypeDesc::Int => Value::Int(0),
            TypeDesc::Real => Value::Real(0.0),
            TypeDesc::Class(_) | TypeDesc::Array(_) => Value::Null,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Int => write!(f, "int"),
            TypeDesc::Real => write!(f, "real"),
            TypeDesc::Class(name) => write!(f, "{}", name),
            TypeDesc::Array(elem) => write!(f, "{}[]", elem),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: Arc<str>,
    pub ty: TypeDesc,
    pub declaring: ClassId,
    /// Index into the object's (or the class statics') slots.
    pub slot: usize,
    pub is_static: bool,
    pub is_final: bool,
    /// `@nonshared`: accesses are never interleaving points.
    pub never_shared: bool,
    /// `@shared`: accesses are always interleaving points.
    pub always_shared: bool,
}

#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: Arc<str>,
    pub super_class: Option<ClassId>,
    pub is_abstract: bool,
    pub is_immutable: bool,
    /// Instance fields, inherited ones first.
    pub fields: Vec<FieldInfo>,
    pub static_fields: Vec<FieldInfo>,
    /// Methods declared by this class.
    pub methods: Vec<MethodId>,
}

#[derive(Clone, Debug)]
pub struct ParamInfo {
    pub name: Arc<str>,
    pub ty: TypeDesc,
    pub symbolic: bool,
}

/// Handler table entry covering code offsets `start..end`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start: usize,
    pub end: usize,
    pub target: usize,
    pub class: ClassId,
}

#[derive(Clone, Debug)]
pub struct MethodInfo {
    pub id: MethodId,
    pub class: ClassId,
    pub name: Arc<str>,
    /// `Class.method`
    pub full_name: Arc<str>,
    pub is_static: bool,
    pub is_synchronized: bool,
    pub params: Vec<ParamInfo>,
    pub returns: Option<TypeDesc>,
    pub max_locals: usize,
    /// Declared types of the locals that have one (`this` and parameters).
    pub local_types: Vec<Option<TypeDesc>>,
    pub code: Vec<Instruction>,
    /// Source line of each instruction.
    pub lines: Vec<u32>,
    pub handlers: Vec<ExceptionHandler>,
}

impl MethodInfo {
    /// Stack slots consumed by an invocation, receiver included.
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(!self.is_static)
    }

    /// Constructors and class initializers are never interleaving points.
    pub fn is_sync_relevant(&self) -> bool {
        !self.name.starts_with('<')
    }

    pub fn local_type(&self, index: usize) -> Option<&TypeDesc> {
        self.local_types.get(index).and_then(|t| t.as_ref())
    }

    pub fn line(&self, pc: usize) -> u32 {
        self.lines.get(pc).copied().unwrap_or(0)
    }
}

/// A fully loaded program.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub(crate) classes: Vec<ClassInfo>,
    pub(crate) methods: Vec<MethodInfo>,
    pub(crate) by_name: AHashMap<Arc<str>, ClassId>,
    pub(crate) entry: Option<MethodId>,
}

impl Program {
    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &MethodInfo {
        &self.methods[id.index()]
    }

    pub fn classes(&self) -> &[ClassInfo] {
        &self.classes
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    pub fn entry(&self) -> Option<MethodId> {
        self.entry
    }

    pub fn class_by_name(&self, name: &str) -> Option<&ClassInfo> {
        self.by_name.get(name).map(|id| self.class(*id))
    }

    pub fn method_by_name(&self, class: &str, name: &str) -> Option<&MethodInfo> {
        let class = self.class_by_name(class)?;
        class
            .methods
            .iter()
            .map(|id| self.method(*id))
            .find(|m| &*m.name == name)
    }

    /// True if `sub` is `sup` or inherits from it.
    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        let mut cursor = Some(sub);
        while let Some(id) = cursor {
            if id == sup {
                return true;
            }
            cursor = self.class(id).super_class;
        }
        false
    }

    /// Assignability by type name: class hierarchy for classes, identity
    /// for arrays, and every reference type is an `Object`.
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to || to == "Object" {
            return true;
        }
        match (self.by_name.get(from), self.by_name.get(to)) {
            (Some(sub), Some(sup)) => self.is_subclass(*sub, *sup),
            _ => false,
        }
    }

    /// Virtual lookup: the closest declaration of `name` at or above `class`.
    pub fn resolve_method(&self, class: ClassId, name: &str) -> Option<MethodId> {
        let mut cursor = Some(class);
        while let Some(id) = cursor {
            let info = self.class(id);
            if let Some(m) = info
                .methods
                .iter()
                .find(|m| &*self.method(**m).name == name)
            {
                return Some(*m);
            }
            cursor = info.super_class;
        }
        None
    }

    pub fn field(&self, class: ClassId, slot: usize) -> Option<&FieldInfo> {
        self.class(class).fields.get(slot)
    }

    pub fn static_field(&self, class: ClassId, slot: usize) -> Option<&FieldInfo> {
        self.class(class).static_fields.get(slot)
    }

    /// Instance field by name, searching inherited fields.
    pub fn find_field(&self, class: ClassId, name: &str) -> Option<&FieldInfo> {
        self.class(class)
            .fields
            .iter()
            .rev()
            .find(|f| &*f.name == name)
    }

    /// Static field by name, searching superclasses.
    pub fn find_static_field(&self, class: ClassId, name: &str) -> Option<&FieldInfo> {
        let mut cursor = Some(class);
        while let Some(id) = cursor {
            let info = self.class(id);
            if let Some(field) = info.static_fields.iter().find(|f| &*f.name == name) {
                return Some(field);
            }
            cursor = info.super_class;
        }
        None
    }
}
