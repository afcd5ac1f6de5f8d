//! Abstract syntax tree for Cortex assembly.

use crate::token::Span;
use std::fmt;

/// An identifier with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A complete program: class declarations and an optional entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub classes: Vec<ClassDecl>,
    pub entry: Option<MemberRef>,
    pub span: Span,
}

/// `Class.member`
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRef {
    pub class: Ident,
    pub member: Ident,
    pub span: Span,
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.member)
    }
}

/// Type expressions used in field, parameter and operand positions.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Int,
    Real,
    /// Class type.
    Named(Ident),
    /// `T[]`
    Array(Box<TypeExpr>),
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Int => write!(f, "int"),
            TypeExpr::Real => write!(f, "real"),
            TypeExpr::Named(name) => write!(f, "{}", name),
            TypeExpr::Array(elem) => write!(f, "{}[]", elem),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Ident,
    pub super_class: Option<Ident>,
    pub is_abstract: bool,
    pub is_immutable: bool,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: Ident,
    pub ty: TypeExpr,
    pub is_static: bool,
    pub is_final: bool,
    /// `@nonshared`, `@shared`
    pub annotations: Vec<Ident>,
    pub span: Span,
}

impl FieldDecl {
    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: Ident,
    pub is_static: bool,
    pub is_synchronized: bool,
    pub params: Vec<Param>,
    pub returns: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    pub handlers: Vec<HandlerDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeExpr,
    /// Marked `@symbolic`: receives a fresh symbolic input when the
    /// method is the program entry.
    pub symbolic: bool,
    pub span: Span,
}

/// A line of a method body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Label(Ident),
    Insn(InsnStmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsnStmt {
    pub mnemonic: Ident,
    pub operands: Vec<Operand>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Int(i64, Span),
    Real(f64, Span),
    /// Label, local name, type name or keyword-like word.
    Name(Ident),
    /// `Class.member`
    Member(MemberRef),
    /// `T[]`
    ArrayType(TypeExpr, Span),
    /// `key -> label` or `default -> label` in a switch.
    Case {
        key: Option<i64>,
        target: Ident,
        span: Span,
    },
}

impl Operand {
    pub fn span(&self) -> Span {
        match self {
            Operand::Int(_, span) | Operand::Real(_, span) => *span,
            Operand::Name(ident) => ident.span,
            Operand::Member(member) => member.span,
            Operand::ArrayType(_, span) => *span,
            Operand::Case { span, .. } => *span,
        }
    }
}

/// `catch <Class> from <label> to <label> using <label>`
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerDecl {
    pub class: Ident,
    pub from: Ident,
    pub to: Ident,
    pub target: Ident,
    pub span: Span,
}
