//! Parsed program to loaded [`Program`].
//!
//! Resolves class, field and method names to ids, labels to code offsets
//! and local names to slots. Injects the built-in class hierarchy the
//! machine raises exceptions from.

use crate::error::{LoadError, LoadResult};
use crate::insn::{ClassRef, FieldRef, Instruction, MethodRef};
use crate::program::{
    ClassId, ClassInfo, ExceptionHandler, FieldInfo, MethodId, MethodInfo, ParamInfo, Program, TypeDesc,
};
use crate::value::Value;
use ahash::AHashMap;
use cortex_symbolic::{Comparator, IntOp, RealOp, Sort};
use cortex_syntax::ast::{self, InsnStmt, Operand, Stmt, TypeExpr};
use cortex_syntax::Span;
use std::sync::Arc;

/// Built-in classes and their superclasses, supers first.
const BUILTIN_CLASSES: &[(&str, Option<&str>)] = &[
    ("Object", None),
    ("Throwable", Some("Object")),
    ("Exception", Some("Throwable")),
    ("RuntimeException", Some("Exception")),
    ("Error", Some("Throwable")),
    ("NullPointerException", Some("RuntimeException")),
    ("ArithmeticException", Some("RuntimeException")),
    ("ArrayIndexOutOfBoundsException", Some("RuntimeException")),
    ("NegativeArraySizeException", Some("RuntimeException")),
    ("ClassCastException", Some("RuntimeException")),
    ("IllegalMonitorStateException", Some("RuntimeException")),
    ("OutOfMemoryError", Some("Error")),
    ("AssertionError", Some("Error")),
];

/// Load a parsed program.
pub fn load(program: &ast::Program) -> LoadResult<Program> {
    let mut loader = Loader::default();
    loader.declare_classes(program)?;
    loader.link_classes(program)?;
    loader.declare_methods(program)?;
    for (decl, class) in program.classes.iter().zip(loader.user_classes.clone()) {
        for (method, id) in decl.methods.iter().zip(loader.class_methods(class)) {
            loader.compile_method(method, id)?;
        }
    }
    loader.resolve_entry(program)?;
    Ok(loader.program)
}

#[derive(Default)]
struct Loader {
    program: Program,
    /// Ids of the classes declared in source, in declaration order.
    user_classes: Vec<ClassId>,
}

/// Per-method name resolution state.
struct MethodScope {
    locals: AHashMap<String, usize>,
    labels: AHashMap<String, usize>,
    max_locals: usize,
}

impl MethodScope {
    fn local(&mut self, operand: &Operand) -> LoadResult<usize> {
        let index = match operand {
            Operand::Name(ident) => {
                let next = self.max_locals;
                *self.locals.entry(ident.name.clone()).or_insert(next)
            }
            Operand::Int(n, span) => usize::try_from(*n).map_err(|_| LoadError::InvalidOperand {
                message: format!("invalid local index {}", n),
                span: *span,
            })?,
            other => {
                return Err(LoadError::InvalidOperand {
                    message: "expected a local variable".into(),
                    span: other.span(),
                })
            }
        };
        self.max_locals = self.max_locals.max(index + 1);
        Ok(index)
    }

    fn label(&self, ident: &ast::Ident) -> LoadResult<usize> {
        self.labels
            .get(&ident.name)
            .copied()
            .ok_or_else(|| LoadError::UnknownLabel {
                name: ident.name.clone(),
                span: ident.span,
            })
    }

    fn target(&self, operand: &Operand) -> LoadResult<usize> {
        match operand {
            Operand::Name(ident) => self.label(ident),
            other => Err(LoadError::InvalidOperand {
                message: "expected a label".into(),
                span: other.span(),
            }),
        }
    }
}

fn operand_count(insn: &InsnStmt, expected: usize) -> LoadResult<()> {
    if insn.operands.len() == expected {
        return Ok(());
    }
    Err(LoadError::InvalidOperand {
        message: format!(
            "'{}' takes {} operand{}, found {}",
            insn.mnemonic.name,
            expected,
            if expected == 1 { "" } else { "s" },
            insn.operands.len()
        ),
        span: insn.span,
    })
}

fn int_op(name: &str) -> Option<IntOp> {
    Some(match name {
        "add" => IntOp::Add,
        "sub" => IntOp::Sub,
        "mul" => IntOp::Mul,
        "div" => IntOp::Div,
        "rem" => IntOp::Rem,
        "and" => IntOp::And,
        "or" => IntOp::Or,
        "xor" => IntOp::Xor,
        "shl" => IntOp::Shl,
        "shr" => IntOp::Shr,
        "ushr" => IntOp::UShr,
        _ => return None,
    })
}

fn real_op(name: &str) -> Option<RealOp> {
    Some(match name {
        "fadd" => RealOp::Add,
        "fsub" => RealOp::Sub,
        "fmul" => RealOp::Mul,
        "fdiv" => RealOp::Div,
        "frem" => RealOp::Rem,
        _ => return None,
    })
}

fn comparator(suffix: &str) -> Option<Comparator> {
    Some(match suffix {
        "eq" => Comparator::Eq,
        "ne" => Comparator::Ne,
        "lt" => Comparator::Lt,
        "le" => Comparator::Le,
        "gt" => Comparator::Gt,
        "ge" => Comparator::Ge,
        _ => return None,
    })
}

impl Loader {
    fn add_class(&mut self, name: &str, span: Span) -> LoadResult<ClassId> {
        if self.program.by_name.contains_key(name) {
            return Err(LoadError::DuplicateClass {
                name: name.to_string(),
                span,
            });
        }
        let id = ClassId(self.program.classes.len() as u32);
        let name: Arc<str> = name.into();
        self.program.by_name.insert(name.clone(), id);
        self.program.classes.push(ClassInfo {
            id,
            name,
            super_class: None,
            is_abstract: false,
            is_immutable: false,
            fields: Vec::new(),
            static_fields: Vec::new(),
            methods: Vec::new(),
        });
        Ok(id)
    }

    fn class_id(&self, ident: &ast::Ident) -> LoadResult<ClassId> {
        self.program
            .by_name
            .get(ident.name.as_str())
            .copied()
            .ok_or_else(|| LoadError::UnknownClass {
                name: ident.name.clone(),
                span: ident.span,
            })
    }

    fn class_methods(&self, class: ClassId) -> Vec<MethodId> {
        self.program.class(class).methods.clone()
    }

    fn type_desc(&self, ty: &TypeExpr) -> LoadResult<TypeDesc> {
        Ok(match ty {
            TypeExpr::Int => TypeDesc::Int,
            TypeExpr::Real => TypeDesc::Real,
            TypeExpr::Named(ident) => {
                let id = self.class_id(ident)?;
                TypeDesc::Class(self.program.class(id).name.clone())
            }
            TypeExpr::Array(elem) => TypeDesc::Array(Box::new(self.type_desc(elem)?)),
        })
    }

    fn declare_classes(&mut self, program: &ast::Program) -> LoadResult<()> {
        for (name, sup) in BUILTIN_CLASSES {
            let id = self.add_class(name, Span::dummy())?;
            if let Some(sup) = sup {
                self.program.classes[id.index()].super_class = self.program.by_name.get(*sup).copied();
            }
        }
        for decl in &program.classes {
            let id = self.add_class(&decl.name.name, decl.name.span)?;
            let class = &mut self.program.classes[id.index()];
            class.is_abstract = decl.is_abstract;
            class.is_immutable = decl.is_immutable;
            self.user_classes.push(id);
        }
        Ok(())
    }

    /// Resolve superclasses, reject cycles and lay out fields.
    fn link_classes(&mut self, program: &ast::Program) -> LoadResult<()> {
        let object = self.program.by_name.get("Object").copied();
        for (decl, &id) in program.classes.iter().zip(&self.user_classes) {
            let sup = match &decl.super_class {
                Some(ident) => Some(self.class_id(ident)?),
                None => object,
            };
            self.program.classes[id.index()].super_class = sup;
        }
        for (decl, &id) in program.classes.iter().zip(&self.user_classes) {
            let mut cursor = self.program.class(id).super_class;
            let mut steps = 0;
            while let Some(c) = cursor {
                steps += 1;
                if c == id || steps > self.program.classes.len() {
                    return Err(LoadError::CyclicInheritance {
                        name: decl.name.name.clone(),
                        span: decl.name.span,
                    });
                }
                cursor = self.program.class(c).super_class;
            }
        }

        // Supers before subclasses so inherited fields are already laid out.
        let mut order: Vec<(usize, usize)> = self
            .user_classes
            .iter()
            .enumerate()
            .map(|(i, id)| (self.depth(*id), i))
            .collect();
        order.sort_unstable();
        for (_, i) in order {
            self.layout_fields(&program.classes[i], self.user_classes[i])?;
        }
        Ok(())
    }

    fn depth(&self, class: ClassId) -> usize {
        let mut depth = 0;
        let mut cursor = self.program.class(class).super_class;
        while let Some(c) = cursor {
            depth += 1;
            cursor = self.program.class(c).super_class;
        }
        depth
    }

    fn layout_fields(&mut self, decl: &ast::ClassDecl, id: ClassId) -> LoadResult<()> {
        let mut fields = match self.program.class(id).super_class {
            Some(sup) => self.program.class(sup).fields.clone(),
            None => Vec::new(),
        };
        let inherited = fields.len();
        let mut static_fields: Vec<FieldInfo> = Vec::new();
        for field in &decl.fields {
            let own = fields[inherited..]
                .iter()
                .chain(&static_fields)
                .any(|f| *f.name == *field.name.name);
            if own {
                return Err(LoadError::DuplicateMember {
                    class: decl.name.name.clone(),
                    member: field.name.name.clone(),
                    span: field.name.span,
                });
            }
            let target = if field.is_static {
                &mut static_fields
            } else {
                &mut fields
            };
            let info = FieldInfo {
                name: field.name.name.as_str().into(),
                ty: self.type_desc(&field.ty)?,
                declaring: id,
                slot: target.len(),
                is_static: field.is_static,
                is_final: field.is_final,
                never_shared: field.has_annotation("nonshared"),
                always_shared: field.has_annotation("shared"),
            };
            target.push(info);
        }
        let class = &mut self.program.classes[id.index()];
        class.fields = fields;
        class.static_fields = static_fields;
        Ok(())
    }

    /// Assign method ids up front so bodies can reference any method.
    fn declare_methods(&mut self, program: &ast::Program) -> LoadResult<()> {
        for (decl, &class) in program.classes.iter().zip(&self.user_classes) {
            for method in &decl.methods {
                let clash = self
                    .program
                    .class(class)
                    .methods
                    .iter()
                    .any(|m| *self.program.method(*m).name == *method.name.name)
                    || decl.fields.iter().any(|f| f.name.name == method.name.name);
                if clash {
                    return Err(LoadError::DuplicateMember {
                        class: decl.name.name.clone(),
                        member: method.name.name.clone(),
                        span: method.name.span,
                    });
                }
                let params = method
                    .params
                    .iter()
                    .map(|p| {
                        Ok(ParamInfo {
                            name: p.name.name.as_str().into(),
                            ty: self.type_desc(&p.ty)?,
                            symbolic: p.symbolic,
                        })
                    })
                    .collect::<LoadResult<Vec<_>>>()?;
                let returns = method.returns.as_ref().map(|t| self.type_desc(t)).transpose()?;
                let class_name = self.program.class(class).name.clone();
                let mut local_types = Vec::new();
                if !method.is_static {
                    local_types.push(Some(TypeDesc::Class(class_name.clone())));
                }
                local_types.extend(params.iter().map(|p| Some(p.ty.clone())));

                let id = MethodId(self.program.methods.len() as u32);
                self.program.methods.push(MethodInfo {
                    id,
                    class,
                    name: method.name.name.as_str().into(),
                    full_name: format!("{}.{}", class_name, method.name.name).into(),
                    is_static: method.is_static,
                    is_synchronized: method.is_synchronized,
                    max_locals: local_types.len(),
                    params,
                    returns,
                    local_types,
                    code: Vec::new(),
                    lines: Vec::new(),
                    handlers: Vec::new(),
                });
                self.program.classes[class.index()].methods.push(id);
            }
        }
        Ok(())
    }

    fn compile_method(&mut self, decl: &ast::MethodDecl, id: MethodId) -> LoadResult<()> {
        let mut scope = MethodScope {
            locals: AHashMap::new(),
            labels: AHashMap::new(),
            max_locals: self.program.method(id).max_locals,
        };
        if !decl.is_static {
            scope.locals.insert("this".to_string(), 0);
        }
        let first_param = usize::from(!decl.is_static);
        for (i, param) in decl.params.iter().enumerate() {
            scope.locals.insert(param.name.name.clone(), first_param + i);
        }

        let mut offset = 0;
        for stmt in &decl.body {
            match stmt {
                Stmt::Label(ident) => {
                    if scope.labels.insert(ident.name.clone(), offset).is_some() {
                        return Err(LoadError::DuplicateLabel {
                            name: ident.name.clone(),
                            span: ident.span,
                        });
                    }
                }
                Stmt::Insn(_) => offset += 1,
            }
        }

        let mut code = Vec::with_capacity(offset + 1);
        let mut lines = Vec::with_capacity(offset + 1);
        for stmt in &decl.body {
            if let Stmt::Insn(insn) = stmt {
                code.push(self.decode(insn, &mut scope)?);
                lines.push(insn.span.line);
            }
        }

        let returns_value = self.program.method(id).returns.is_some();
        if code.last().map_or(true, |i| !i.ends_block()) {
            if returns_value {
                return Err(LoadError::FallsOffEnd {
                    method: self.program.method(id).full_name.to_string(),
                    span: decl.span,
                });
            }
            code.push(Instruction::Return);
            lines.push(decl.span.line);
        }
        if code.iter().flat_map(|i| i.targets()).any(|t| t >= code.len()) {
            return Err(LoadError::FallsOffEnd {
                method: self.program.method(id).full_name.to_string(),
                span: decl.span,
            });
        }

        let handlers = decl
            .handlers
            .iter()
            .map(|h| {
                let class = self.class_id(&h.class)?;
                let (start, end, target) = (scope.label(&h.from)?, scope.label(&h.to)?, scope.label(&h.target)?);
                if start >= end || target >= code.len() {
                    return Err(LoadError::InvalidOperand {
                        message: format!("empty or misplaced handler range for {}", h.class),
                        span: h.span,
                    });
                }
                Ok(ExceptionHandler {
                    start,
                    end,
                    target,
                    class,
                })
            })
            .collect::<LoadResult<Vec<_>>>()?;

        let method = &mut self.program.methods[id.index()];
        method.max_locals = scope.max_locals;
        method.local_types.resize(scope.max_locals, None);
        method.code = code;
        method.lines = lines;
        method.handlers = handlers;
        Ok(())
    }

    fn class_ref(&self, operand: &Operand) -> LoadResult<ClassRef> {
        match operand {
            Operand::Name(ident) => {
                let id = self.class_id(ident)?;
                Ok(ClassRef {
                    id,
                    name: self.program.class(id).name.clone(),
                })
            }
            other => Err(LoadError::InvalidOperand {
                message: "expected a class name".into(),
                span: other.span(),
            }),
        }
    }

    fn member<'o>(&self, operand: &'o Operand) -> LoadResult<(ClassId, &'o ast::MemberRef)> {
        match operand {
            Operand::Member(member) => Ok((self.class_id(&member.class)?, member)),
            other => Err(LoadError::InvalidOperand {
                message: "expected Class.member".into(),
                span: other.span(),
            }),
        }
    }

    fn field_ref(&self, operand: &Operand, is_static: bool) -> LoadResult<FieldRef> {
        let (class, member) = self.member(operand)?;
        let name = member.member.name.as_str();
        let field = if is_static {
            self.program.find_static_field(class, name)
        } else {
            self.program.find_field(class, name)
        };
        let field = field.ok_or_else(|| LoadError::UnknownField {
            class: member.class.name.clone(),
            field: member.member.name.clone(),
            span: member.span,
        })?;
        // Static fields live in the declaring class's statics record.
        let class = if is_static { field.declaring } else { class };
        Ok(FieldRef {
            class,
            slot: field.slot,
            name: member.to_string().into(),
        })
    }

    fn method_ref(&self, operand: &Operand) -> LoadResult<MethodRef> {
        let (class, member) = self.member(operand)?;
        let id = self
            .program
            .resolve_method(class, &member.member.name)
            .ok_or_else(|| LoadError::UnknownMethod {
                class: member.class.name.clone(),
                method: member.member.name.clone(),
                span: member.span,
            })?;
        Ok(MethodRef {
            id,
            name: member.to_string().into(),
        })
    }

    fn operand_type(&self, operand: &Operand) -> LoadResult<TypeDesc> {
        match operand {
            Operand::Name(ident) => match ident.name.as_str() {
                "int" => Ok(TypeDesc::Int),
                "real" => Ok(TypeDesc::Real),
                _ => self.type_desc(&TypeExpr::Named(ident.clone())),
            },
            Operand::ArrayType(ty, _) => self.type_desc(ty),
            other => Err(LoadError::InvalidOperand {
                message: "expected a type".into(),
                span: other.span(),
            }),
        }
    }

    fn decode(&self, insn: &InsnStmt, scope: &mut MethodScope) -> LoadResult<Instruction> {
        let name = insn.mnemonic.name.as_str();
        let ops = &insn.operands;

        if let Some(op) = int_op(name) {
            operand_count(insn, 0)?;
            return Ok(Instruction::IntArith(op));
        }
        if let Some(op) = real_op(name) {
            operand_count(insn, 0)?;
            return Ok(Instruction::RealArith(op));
        }
        if let Some(cond) = name.strip_prefix("if_cmp").and_then(comparator) {
            operand_count(insn, 1)?;
            return Ok(Instruction::IfCmp {
                cond,
                target: scope.target(&ops[0])?,
            });
        }
        if let Some(cond) = name.strip_prefix("if").and_then(comparator) {
            operand_count(insn, 1)?;
            return Ok(Instruction::If {
                cond,
                target: scope.target(&ops[0])?,
            });
        }

        let simple = match name {
            "pushnull" => Some(Instruction::Push(Value::Null)),
            "pop" => Some(Instruction::Pop),
            "dup" => Some(Instruction::Dup),
            "swap" => Some(Instruction::Swap),
            "neg" => Some(Instruction::IntNeg),
            "fneg" => Some(Instruction::RealNeg),
            "i2f" => Some(Instruction::IntToReal),
            "f2i" => Some(Instruction::RealToInt),
            "cmp" => Some(Instruction::IntCmp),
            "fcmpl" => Some(Instruction::RealCmp { nan_greater: false }),
            "fcmpg" => Some(Instruction::RealCmp { nan_greater: true }),
            "arrayload" => Some(Instruction::ArrayLoad),
            "arraystore" => Some(Instruction::ArrayStore),
            "arraylength" => Some(Instruction::ArrayLength),
            "throw" => Some(Instruction::Throw),
            "return" => Some(Instruction::Return),
            "monitorenter" => Some(Instruction::MonitorEnter),
            "monitorexit" => Some(Instruction::MonitorExit),
            "yield" => Some(Instruction::Yield),
            _ => None,
        };
        if let Some(instruction) = simple {
            operand_count(insn, 0)?;
            return Ok(instruction);
        }

        let decoded = match name {
            "push" => {
                operand_count(insn, 1)?;
                match &ops[0] {
                    Operand::Int(n, _) => Instruction::Push(Value::Int(*n)),
                    Operand::Real(r, _) => Instruction::Push(Value::Real(*r)),
                    other => {
                        return Err(LoadError::InvalidOperand {
                            message: "push takes an int or real literal".into(),
                            span: other.span(),
                        })
                    }
                }
            }
            "load" => {
                operand_count(insn, 1)?;
                Instruction::Load(scope.local(&ops[0])?)
            }
            "store" => {
                operand_count(insn, 1)?;
                Instruction::Store(scope.local(&ops[0])?)
            }
            "inc" => {
                operand_count(insn, 2)?;
                let local = scope.local(&ops[0])?;
                let Operand::Int(delta, _) = &ops[1] else {
                    return Err(LoadError::InvalidOperand {
                        message: "inc takes an int delta".into(),
                        span: ops[1].span(),
                    });
                };
                Instruction::Inc {
                    local,
                    delta: *delta,
                }
            }
            "sym" => {
                operand_count(insn, 2)?;
                let Operand::Name(sym) = &ops[0] else {
                    return Err(LoadError::InvalidOperand {
                        message: "sym takes a name".into(),
                        span: ops[0].span(),
                    });
                };
                let sort = match &ops[1] {
                    Operand::Name(s) if s.name == "int" => Sort::Int,
                    Operand::Name(s) if s.name == "real" => Sort::Real,
                    other => {
                        return Err(LoadError::InvalidOperand {
                            message: "sym sort must be int or real".into(),
                            span: other.span(),
                        })
                    }
                };
                Instruction::Symbolic {
                    name: sym.name.as_str().into(),
                    sort,
                }
            }
            "ifnull" | "ifnonnull" | "if_acmpeq" | "if_acmpne" | "goto" => {
                operand_count(insn, 1)?;
                let target = scope.target(&ops[0])?;
                match name {
                    "ifnull" => Instruction::IfNull { target },
                    "ifnonnull" => Instruction::IfNonNull { target },
                    "if_acmpeq" => Instruction::IfRefCmp {
                        equal: true,
                        target,
                    },
                    "if_acmpne" => Instruction::IfRefCmp {
                        equal: false,
                        target,
                    },
                    _ => Instruction::Goto(target),
                }
            }
            "switch" => self.decode_switch(insn, scope)?,
            "getfield" | "putfield" | "getstatic" | "putstatic" => {
                operand_count(insn, 1)?;
                let is_static = name.ends_with("static");
                let field = self.field_ref(&ops[0], is_static)?;
                match name {
                    "getfield" => Instruction::GetField(field),
                    "putfield" => Instruction::PutField(field),
                    "getstatic" => Instruction::GetStatic(field),
                    _ => Instruction::PutStatic(field),
                }
            }
            "newarray" => {
                operand_count(insn, 1)?;
                Instruction::NewArray(self.operand_type(&ops[0])?)
            }
            "new" => {
                operand_count(insn, 1)?;
                let class = self.class_ref(&ops[0])?;
                if self.program.class(class.id).is_abstract {
                    return Err(LoadError::AbstractInstantiation {
                        name: class.name.to_string(),
                        span: ops[0].span(),
                    });
                }
                Instruction::New(class)
            }
            "checkcast" => {
                operand_count(insn, 1)?;
                Instruction::CheckCast(self.class_ref(&ops[0])?)
            }
            "instanceof" => {
                operand_count(insn, 1)?;
                Instruction::InstanceOf(self.class_ref(&ops[0])?)
            }
            "invokestatic" | "invokevirtual" | "invokespecial" | "spawn" => {
                operand_count(insn, 1)?;
                let method = self.method_ref(&ops[0])?;
                let info = self.program.method(method.id);
                let wants_static = matches!(name, "invokestatic" | "spawn");
                if info.is_static != wants_static {
                    return Err(LoadError::InvalidOperand {
                        message: format!(
                            "{} needs a{} method, {} is not",
                            name,
                            if wants_static { " static" } else { "n instance" },
                            info.full_name
                        ),
                        span: ops[0].span(),
                    });
                }
                match name {
                    "invokestatic" => Instruction::InvokeStatic(method),
                    "invokevirtual" => Instruction::InvokeVirtual(method),
                    "invokespecial" => Instruction::InvokeSpecial(method),
                    _ => Instruction::Spawn(method),
                }
            }
            _ => {
                return Err(LoadError::UnknownInstruction {
                    name: name.to_string(),
                    span: insn.mnemonic.span,
                })
            }
        };
        Ok(decoded)
    }

    fn decode_switch(&self, insn: &InsnStmt, scope: &MethodScope) -> LoadResult<Instruction> {
        let mut keys = Vec::new();
        let mut targets = Vec::new();
        let mut default = None;
        for operand in &insn.operands {
            let Operand::Case { key, target, span } = operand else {
                return Err(LoadError::InvalidOperand {
                    message: "switch cases are written 'key -> label'".into(),
                    span: operand.span(),
                });
            };
            match key {
                Some(k) if keys.contains(k) => {
                    return Err(LoadError::InvalidOperand {
                        message: format!("duplicate switch key {}", k),
                        span: *span,
                    })
                }
                Some(k) => {
                    keys.push(*k);
                    targets.push(scope.label(target)?);
                }
                None if default.is_some() => {
                    return Err(LoadError::InvalidOperand {
                        message: "duplicate switch default".into(),
                        span: *span,
                    })
                }
                None => default = Some(scope.label(target)?),
            }
        }
        let default = default.ok_or_else(|| LoadError::InvalidOperand {
            message: "switch needs a default case".into(),
            span: insn.span,
        })?;
        Ok(Instruction::Switch {
            keys,
            targets,
            default,
        })
    }

    fn resolve_entry(&mut self, program: &ast::Program) -> LoadResult<()> {
        let Some(entry) = &program.entry else {
            return Ok(());
        };
        let class = self.class_id(&entry.class)?;
        let id = self
            .program
            .class(class)
            .methods
            .iter()
            .copied()
            .find(|m| *self.program.method(*m).name == *entry.member.name)
            .ok_or_else(|| LoadError::UnknownMethod {
                class: entry.class.name.clone(),
                method: entry.member.name.clone(),
                span: entry.member.span,
            })?;
        if !self.program.method(id).is_static {
            return Err(LoadError::InvalidEntry {
                name: entry.to_string(),
                span: entry.span,
            });
        }
        self.program.entry = Some(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_src(src: &str) -> LoadResult<Program> {
        let parsed = cortex_syntax::parse(src).expect("parse");
        load(&parsed)
    }

    #[test]
    fn test_load_resolves_labels_and_locals() {
        let program = load_src(
            r#"
class Main {
    static method test(x: int @symbolic) -> int {
        load x
        iflt neg
        push 1
        return
    neg: push -1
        return
    }
}
entry Main.test
"#,
        )
        .unwrap();
        let entry = program.method(program.entry().unwrap());
        assert_eq!(&*entry.full_name, "Main.test");
        assert_eq!(entry.code[0], Instruction::Load(0));
        assert_eq!(
            entry.code[1],
            Instruction::If {
                cond: Comparator::Lt,
                target: 4
            }
        );
        assert_eq!(entry.max_locals, 1);
        assert_eq!(entry.lines[0], 4);
    }

    #[test]
    fn test_builtins_and_inherited_fields() {
        let program = load_src(
            r#"
class Base {
    field id: int
}
class Node extends Base {
    field next: Node
    static field count: int
}
"#,
        )
        .unwrap();
        let npe = program.class_by_name("NullPointerException").unwrap().id;
        let throwable = program.class_by_name("Throwable").unwrap().id;
        assert!(program.is_subclass(npe, throwable));
        let node = program.class_by_name("Node").unwrap();
        let names: Vec<_> = node.fields.iter().map(|f| f.name.to_string()).collect();
        assert_eq!(names, ["id", "next"]);
        assert_eq!(node.fields[1].slot, 1);
        assert_eq!(node.static_fields.len(), 1);
        assert!(program.is_assignable("Node", "Base"));
    }

    #[test]
    fn test_void_method_gets_implicit_return() {
        let program = load_src(
            r#"
class Main {
    static method run() {
        push 1
        pop
    }
}
"#,
        )
        .unwrap();
        let method = program.method_by_name("Main", "run").unwrap();
        assert_eq!(method.code.last(), Some(&Instruction::Return));
    }

    #[test]
    fn test_value_method_must_not_fall_off() {
        let err = load_src(
            r#"
class Main {
    static method f() -> int {
        push 1
    }
}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::FallsOffEnd { .. }));
    }

    #[test]
    fn test_load_errors_carry_spans() {
        let err = load_src("class A {\n  static method f() {\n    frobnicate\n  }\n}").unwrap_err();
        assert!(matches!(err, LoadError::UnknownInstruction { .. }));
        assert_eq!(err.span().line, 3);

        let err = load_src("class A {\n  static method f() {\n    goto nowhere\n  }\n}").unwrap_err();
        assert!(matches!(err, LoadError::UnknownLabel { .. }));

        let err = load_src("class A extends B {\n}\nclass B extends A {\n}").unwrap_err();
        assert!(matches!(err, LoadError::CyclicInheritance { .. }));

        let err = load_src("abstract class A {\n}\nclass M {\n  static method f() {\n    new A\n  }\n}").unwrap_err();
        assert!(matches!(err, LoadError::AbstractInstantiation { .. }));
    }

    #[test]
    fn test_entry_must_be_static() {
        let err = load_src("class A {\n  method f() {\n    return\n  }\n}\nentry A.f").unwrap_err();
        assert!(matches!(err, LoadError::InvalidEntry { .. }));
    }

    #[test]
    fn test_switch_and_handlers() {
        let program = load_src(
            r#"
class Main {
    static method run(k: int) {
    start:
        load k
        switch 1 -> one, default -> other
    one:
        return
    other:
        return
    end:
        catch ArithmeticException from start to end using other
    }
}
"#,
        )
        .unwrap();
        let method = program.method_by_name("Main", "run").unwrap();
        assert_eq!(
            method.code[1],
            Instruction::Switch {
                keys: vec![1],
                targets: vec![2],
                default: 3
            }
        );
        assert_eq!(method.handlers.len(), 1);
        assert_eq!((method.handlers[0].start, method.handlers[0].end), (0, 4));
    }
}
