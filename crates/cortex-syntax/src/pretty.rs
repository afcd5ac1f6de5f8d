//! Pretty printer for Cortex assembly.

use crate::ast::*;

/// Pretty print a program to a string in canonical layout.
pub fn pretty_print(program: &Program) -> String {
    let mut printer = PrettyPrinter::new();
    printer.print_program(program);
    printer.output
}

/// Pretty print a single instruction line (no indentation or newline).
pub fn pretty_print_insn(insn: &InsnStmt) -> String {
    let mut printer = PrettyPrinter::new();
    printer.print_insn(insn);
    printer.output
}

struct PrettyPrinter {
    output: String,
    indent: usize,
}

impl PrettyPrinter {
    fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
        }
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn writeln(&mut self, s: &str) {
        self.output.push_str(s);
        self.output.push('\n');
    }

    fn newline(&mut self) {
        self.output.push('\n');
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
    }

    fn print_program(&mut self, program: &Program) {
        for (i, class) in program.classes.iter().enumerate() {
            if i > 0 {
                self.newline();
            }
            self.print_class(class);
        }
        if let Some(entry) = &program.entry {
            if !program.classes.is_empty() {
                self.newline();
            }
            self.writeln(&format!("entry {}", entry));
        }
    }

    fn print_class(&mut self, class: &ClassDecl) {
        if class.is_abstract {
            self.write("abstract ");
        }
        if class.is_immutable {
            self.write("immutable ");
        }
        self.write("class ");
        self.write(&class.name.name);
        if let Some(sup) = &class.super_class {
            self.write(" extends ");
            self.write(&sup.name);
        }
        self.writeln(" {");
        self.indent += 1;
        for field in &class.fields {
            self.print_field(field);
        }
        for (i, method) in class.methods.iter().enumerate() {
            if i > 0 || !class.fields.is_empty() {
                self.newline();
            }
            self.print_method(method);
        }
        self.indent -= 1;
        self.writeln("}");
    }

    fn print_field(&mut self, field: &FieldDecl) {
        self.write_indent();
        for ann in &field.annotations {
            self.write(&format!("@{} ", ann.name));
        }
        if field.is_static {
            self.write("static ");
        }
        if field.is_final {
            self.write("final ");
        }
        self.writeln(&format!("field {}: {}", field.name, field.ty));
    }

    fn print_method(&mut self, method: &MethodDecl) {
        self.write_indent();
        if method.is_static {
            self.write("static ");
        }
        if method.is_synchronized {
            self.write("synchronized ");
        }
        self.write(&format!("method {}(", method.name));
        let params: Vec<String> = method
            .params
            .iter()
            .map(|p| {
                if p.symbolic {
                    format!("{}: {} @symbolic", p.name, p.ty)
                } else {
                    format!("{}: {}", p.name, p.ty)
                }
            })
            .collect();
        self.write(&params.join(", "));
        self.write(")");
        if let Some(ret) = &method.returns {
            self.write(&format!(" -> {}", ret));
        }
        self.writeln(" {");

        for stmt in &method.body {
            match stmt {
                Stmt::Label(label) => {
                    // labels sit one level left of the instructions
                    self.write_indent();
                    self.writeln(&format!("{}:", label));
                }
                Stmt::Insn(insn) => {
                    self.indent += 1;
                    self.write_indent();
                    self.print_insn(insn);
                    self.newline();
                    self.indent -= 1;
                }
            }
        }
        self.indent += 1;
        for handler in &method.handlers {
            self.write_indent();
            self.writeln(&format!(
                "catch {} from {} to {} using {}",
                handler.class, handler.from, handler.to, handler.target
            ));
        }
        self.indent -= 1;

        self.write_indent();
        self.writeln("}");
    }

    fn print_insn(&mut self, insn: &InsnStmt) {
        self.write(&insn.mnemonic.name);
        let mut first = true;
        for operand in &insn.operands {
            let is_case = matches!(operand, Operand::Case { .. });
            if is_case && !first {
                self.write(",");
            }
            self.write(" ");
            self.print_operand(operand);
            first = false;
        }
    }

    fn print_operand(&mut self, operand: &Operand) {
        match operand {
            Operand::Int(n, _) => self.write(&n.to_string()),
            Operand::Real(r, _) => self.write(&format_real(*r)),
            Operand::Name(ident) => self.write(&ident.name),
            Operand::Member(member) => self.write(&member.to_string()),
            Operand::ArrayType(ty, _) => self.write(&ty.to_string()),
            Operand::Case { key, target, .. } => match key {
                Some(k) => self.write(&format!("{} -> {}", k, target)),
                None => self.write(&format!("default -> {}", target)),
            },
        }
    }
}

/// Reals always print with a fractional part so they re-lex as reals.
fn format_real(r: f64) -> String {
    let s = format!("{}", r);
    if s.contains('.') || s.contains('e') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        format!("{}.0", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_pretty_print_is_stable() {
        let src = r#"
abstract class Shape {
}
class Circle extends Shape {
  final field r: real
  @shared static field count: int
  synchronized method grow(by: real) -> real {
      load this
      getfield Circle.r
      load by
      fadd
      return
  }
}
class Main {
  static method main(x: int @symbolic) {
  top:
     load x
     switch 0 -> zero, default -> top
  zero:  push 2.0
     pop
     return
     catch ArithmeticException from top to zero using zero
  }
}
entry Main.main
"#;
        let program = parse(src).unwrap();
        let once = pretty_print(&program);
        let reparsed = parse(&once).unwrap();
        assert_eq!(pretty_print(&reparsed), once);
        assert!(once.contains("abstract class Shape {"));
        assert!(once.contains("    synchronized method grow(by: real) -> real {"));
        assert!(once.contains("        switch 0 -> zero, default -> top"));
        assert!(once.contains("push 2.0"));
        assert!(once.ends_with("entry Main.main\n"));
    }

    #[test]
    fn test_format_real() {
        assert_eq!(format_real(2.0), "2.0");
        assert_eq!(format_real(-0.5), "-0.5");
    }
}
