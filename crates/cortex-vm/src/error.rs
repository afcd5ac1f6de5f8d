//! Load-time and run-time errors of the virtual machine.
//!
//! Faults of the modeled program (null dereference, bounds, casts) are not
//! errors here: they become heap exception objects and go through the
//! program's own handler tables.

use cortex_symbolic::SymbolicError;
use cortex_syntax::Span;
use thiserror::Error;

/// Error while turning a parsed program into a loaded [`crate::Program`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    #[error("unknown class '{name}'")]
    UnknownClass { name: String, span: Span },

    #[error("class '{name}' is already defined")]
    DuplicateClass { name: String, span: Span },

    #[error("class '{name}' inherits from itself")]
    CyclicInheritance { name: String, span: Span },

    #[error("'{member}' is already declared in class '{class}'")]
    DuplicateMember {
        class: String,
        member: String,
        span: Span,
    },

    #[error("unknown field '{class}.{field}'")]
    UnknownField {
        class: String,
        field: String,
        span: Span,
    },

    #[error("unknown method '{class}.{method}'")]
    UnknownMethod {
        class: String,
        method: String,
        span: Span,
    },

    #[error("unknown label '{name}'")]
    UnknownLabel { name: String, span: Span },

    #[error("label '{name}' is already defined")]
    DuplicateLabel { name: String, span: Span },

    #[error("unknown instruction '{name}'")]
    UnknownInstruction { name: String, span: Span },

    #[error("{message}")]
    InvalidOperand { message: String, span: Span },

    #[error("cannot instantiate abstract class '{name}'")]
    AbstractInstantiation { name: String, span: Span },

    #[error("method '{method}' can run past its last instruction")]
    FallsOffEnd { method: String, span: Span },

    #[error("entry method '{name}' must be static")]
    InvalidEntry { name: String, span: Span },
}

impl LoadError {
    /// Get the source span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            LoadError::UnknownClass { span, .. }
            | LoadError::DuplicateClass { span, .. }
            | LoadError::CyclicInheritance { span, .. }
            | LoadError::DuplicateMember { span, .. }
            | LoadError::UnknownField { span, .. }
            | LoadError::UnknownMethod { span, .. }
            | LoadError::UnknownLabel { span, .. }
            | LoadError::DuplicateLabel { span, .. }
            | LoadError::UnknownInstruction { span, .. }
            | LoadError::InvalidOperand { span, .. }
            | LoadError::AbstractInstantiation { span, .. }
            | LoadError::FallsOffEnd { span, .. }
            | LoadError::InvalidEntry { span, .. } => *span,
        }
    }
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Error raised while executing instructions.
///
/// Path-fatal errors abort the subtree below the current choice and the
/// search continues with its siblings. Run-fatal errors abort the search.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    #[error(transparent)]
    Symbolic(#[from] SymbolicError),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("operand type mismatch in '{insn}': expected {expected}")]
    TypeMismatch {
        insn: String,
        expected: &'static str,
    },

    #[error("operand stack underflow in '{insn}'")]
    StackUnderflow { insn: String },

    #[error("choice generator override at {site}: a blocking choice is already pending")]
    ChoiceOverride { site: String },

    #[error("top half of '{insn}' at {site} mutated state before suspending")]
    TopHalfMutation { insn: String, site: String },

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl VmError {
    /// True for programming-invariant violations that abort the whole run.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            VmError::ChoiceOverride { .. } | VmError::TopHalfMutation { .. } | VmError::Invariant(_)
        )
    }
}

pub type VmResult<T> = Result<T, VmError>;
