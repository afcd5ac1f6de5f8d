//! Recursive descent parser for Cortex assembly.

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use thiserror::Error;

/// Parser error.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unexpected token at {span}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("unexpected end of file at {span}")]
    UnexpectedEof { span: Span },
    #[error("invalid syntax at {span}: {message}")]
    InvalidSyntax { message: String, span: Span },
}

impl ParseError {
    /// Get the source span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::UnexpectedEof { span } => *span,
            ParseError::InvalidSyntax { span, .. } => *span,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Modifiers collected in front of a `field` or `method` keyword.
#[derive(Default)]
struct Modifiers {
    is_static: bool,
    is_final: bool,
    is_synchronized: bool,
    annotations: Vec<Ident>,
    span: Option<Span>,
}

/// Parser for Cortex assembly.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a new parser from source text.
    pub fn new(source: &str) -> Self {
        let tokens: Vec<_> = Lexer::new(source)
            .tokenize()
            .into_iter()
            .filter(|t| !t.kind.is_trivia())
            .collect();
        Self { tokens, pos: 0 }
    }

    /// Parse a complete program.
    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let start = self.current_span();
        let mut classes = Vec::new();
        let mut entry = None;

        self.skip_newlines();
        while !self.is_at_end() {
            match self.peek_kind() {
                TokenKind::Entry => {
                    let entry_start = self.current_span();
                    self.advance();
                    let member = self.parse_member_ref()?;
                    if entry.is_some() {
                        return Err(ParseError::InvalidSyntax {
                            message: "duplicate entry declaration".to_string(),
                            span: entry_start.merge(self.prev_span()),
                        });
                    }
                    entry = Some(member);
                    self.expect_line_end()?;
                }
                TokenKind::Class | TokenKind::Abstract | TokenKind::Immutable => {
                    classes.push(self.parse_class()?);
                }
                TokenKind::Error(msg) => {
                    return Err(ParseError::InvalidSyntax {
                        message: msg,
                        span: self.current_span(),
                    })
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "class or entry declaration".to_string(),
                        found: other.to_string(),
                        span: self.current_span(),
                    })
                }
            }
            self.skip_newlines();
        }

        let span = start.merge(self.prev_span());
        Ok(Program {
            classes,
            entry,
            span,
        })
    }

    /// Parse `[abstract] [immutable] class Name [extends Super] { ... }`
    fn parse_class(&mut self) -> ParseResult<ClassDecl> {
        let start = self.current_span();
        let mut is_abstract = false;
        let mut is_immutable = false;
        loop {
            if self.match_token(TokenKind::Abstract) {
                is_abstract = true;
            } else if self.match_token(TokenKind::Immutable) {
                is_immutable = true;
            } else {
                break;
            }
        }
        self.expect(TokenKind::Class)?;
        let name = self.parse_ident()?;
        let super_class = if self.match_token(TokenKind::Extends) {
            Some(self.parse_ident()?)
        } else {
            None
        };
        self.skip_newlines();
        self.expect(TokenKind::LBrace)?;
        self.skip_newlines();

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.is_at_end() {
                return Err(ParseError::UnexpectedEof {
                    span: self.current_span(),
                });
            }
            let modifiers = self.parse_modifiers()?;
            match self.peek_kind() {
                TokenKind::Field => fields.push(self.parse_field(modifiers)?),
                TokenKind::Method => methods.push(self.parse_method(modifiers)?),
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "field or method".to_string(),
                        found: other.to_string(),
                        span: self.current_span(),
                    })
                }
            }
            self.skip_newlines();
        }
        self.expect(TokenKind::RBrace)?;

        let span = start.merge(self.prev_span());
        Ok(ClassDecl {
            name,
            super_class,
            is_abstract,
            is_immutable,
            fields,
            methods,
            span,
        })
    }

    fn parse_modifiers(&mut self) -> ParseResult<Modifiers> {
        let mut modifiers = Modifiers::default();
        loop {
            let span = self.current_span();
            match self.peek_kind() {
                TokenKind::Static => modifiers.is_static = true,
                TokenKind::Final => modifiers.is_final = true,
                TokenKind::Synchronized => modifiers.is_synchronized = true,
                TokenKind::At => {
                    self.advance();
                    let ann = self.parse_ident()?;
                    modifiers.span.get_or_insert(span);
                    modifiers.annotations.push(ann);
                    continue;
                }
                _ => break,
            }
            modifiers.span.get_or_insert(span);
            self.advance();
        }
        Ok(modifiers)
    }

    /// Parse `field name: type`
    fn parse_field(&mut self, modifiers: Modifiers) -> ParseResult<FieldDecl> {
        let start = modifiers.span.unwrap_or_else(|| self.current_span());
        self.expect(TokenKind::Field)?;
        if modifiers.is_synchronized {
            return Err(ParseError::InvalidSyntax {
                message: "fields cannot be synchronized".to_string(),
                span: start,
            });
        }
        let name = self.parse_ident()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        let span = start.merge(self.prev_span());
        self.expect_line_end()?;
        Ok(FieldDecl {
            name,
            ty,
            is_static: modifiers.is_static,
            is_final: modifiers.is_final,
            annotations: modifiers.annotations,
            span,
        })
    }

    /// Parse `method name(params) [-> type] { body }`
    fn parse_method(&mut self, modifiers: Modifiers) -> ParseResult<MethodDecl> {
        let start = modifiers.span.unwrap_or_else(|| self.current_span());
        self.expect(TokenKind::Method)?;
        if modifiers.is_final || !modifiers.annotations.is_empty() {
            return Err(ParseError::InvalidSyntax {
                message: "only `static` and `synchronized` apply to methods".to_string(),
                span: start,
            });
        }
        let name = self.parse_ident()?;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen)?;
        let returns = if self.match_token(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.skip_newlines();
        self.expect(TokenKind::LBrace)?;

        let mut body = Vec::new();
        let mut handlers = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::RBrace) {
            if self.is_at_end() {
                return Err(ParseError::UnexpectedEof {
                    span: self.current_span(),
                });
            }
            if self.check(TokenKind::Catch) {
                handlers.push(self.parse_handler()?);
                self.expect_line_end()?;
            } else if self.is_label_start() {
                let label = self.parse_ident()?;
                self.expect(TokenKind::Colon)?;
                body.push(Stmt::Label(label));
                // a label may share its line with an instruction
                if !self.check(TokenKind::Newline) && !self.check(TokenKind::RBrace) {
                    continue;
                }
            } else {
                body.push(Stmt::Insn(self.parse_insn()?));
                if !self.check(TokenKind::RBrace) {
                    self.expect_line_end()?;
                }
            }
            self.skip_newlines();
        }
        self.expect(TokenKind::RBrace)?;

        let span = start.merge(self.prev_span());
        Ok(MethodDecl {
            name,
            is_static: modifiers.is_static,
            is_synchronized: modifiers.is_synchronized,
            params,
            returns,
            body,
            handlers,
            span,
        })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<Param>> {
        let mut params = Vec::new();
        if self.check(TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let start = self.current_span();
            let name = self.parse_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            let mut symbolic = false;
            if self.match_token(TokenKind::At) {
                let ann = self.parse_ident()?;
                if ann.name != "symbolic" {
                    return Err(ParseError::InvalidSyntax {
                        message: format!("unknown parameter annotation '@{}'", ann.name),
                        span: ann.span,
                    });
                }
                symbolic = true;
            }
            let span = start.merge(self.prev_span());
            params.push(Param {
                name,
                ty,
                symbolic,
                span,
            });
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    /// Parse `catch Class from l1 to l2 using l3`
    fn parse_handler(&mut self) -> ParseResult<HandlerDecl> {
        let start = self.current_span();
        self.expect(TokenKind::Catch)?;
        let class = self.parse_ident()?;
        self.expect_word("from")?;
        let from = self.parse_ident()?;
        self.expect_word("to")?;
        let to = self.parse_ident()?;
        self.expect_word("using")?;
        let target = self.parse_ident()?;
        let span = start.merge(self.prev_span());
        Ok(HandlerDecl {
            class,
            from,
            to,
            target,
            span,
        })
    }

    /// Parse `mnemonic operand*`
    fn parse_insn(&mut self) -> ParseResult<InsnStmt> {
        let start = self.current_span();
        let mnemonic = self.parse_ident()?;
        let mut operands = Vec::new();
        while !self.check(TokenKind::Newline)
            && !self.check(TokenKind::RBrace)
            && !self.is_at_end()
        {
            operands.push(self.parse_operand()?);
            self.match_token(TokenKind::Comma);
        }
        let span = start.merge(self.prev_span());
        Ok(InsnStmt {
            mnemonic,
            operands,
            span,
        })
    }

    fn parse_operand(&mut self) -> ParseResult<Operand> {
        let start = self.current_span();
        match self.peek_kind() {
            TokenKind::Integer(n) => {
                self.advance();
                if self.match_token(TokenKind::Arrow) {
                    let target = self.parse_ident()?;
                    return Ok(Operand::Case {
                        key: Some(n),
                        target,
                        span: start.merge(self.prev_span()),
                    });
                }
                Ok(Operand::Int(n, start))
            }
            TokenKind::Real(r) => {
                self.advance();
                Ok(Operand::Real(r, start))
            }
            TokenKind::Ident(_) => {
                let ident = self.parse_ident()?;
                if self.check(TokenKind::Dot) {
                    self.advance();
                    let member = self.parse_ident()?;
                    let span = start.merge(self.prev_span());
                    return Ok(Operand::Member(MemberRef {
                        class: ident,
                        member,
                        span,
                    }));
                }
                if ident.name == "default" && self.match_token(TokenKind::Arrow) {
                    let target = self.parse_ident()?;
                    return Ok(Operand::Case {
                        key: None,
                        target,
                        span: start.merge(self.prev_span()),
                    });
                }
                if self.check(TokenKind::LBracket) {
                    let mut ty = Self::type_from_ident(ident);
                    while self.match_token(TokenKind::LBracket) {
                        self.expect(TokenKind::RBracket)?;
                        ty = TypeExpr::Array(Box::new(ty));
                    }
                    return Ok(Operand::ArrayType(ty, start.merge(self.prev_span())));
                }
                Ok(Operand::Name(ident))
            }
            TokenKind::Error(msg) => Err(ParseError::InvalidSyntax {
                message: msg,
                span: start,
            }),
            other => Err(ParseError::UnexpectedToken {
                expected: "operand".to_string(),
                found: other.to_string(),
                span: start,
            }),
        }
    }

    /// Parse `int`, `real`, `Name` with any number of `[]` suffixes.
    fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        let ident = self.parse_ident()?;
        let mut ty = Self::type_from_ident(ident);
        while self.match_token(TokenKind::LBracket) {
            self.expect(TokenKind::RBracket)?;
            ty = TypeExpr::Array(Box::new(ty));
        }
        Ok(ty)
    }

    fn type_from_ident(ident: Ident) -> TypeExpr {
        match ident.name.as_str() {
            "int" => TypeExpr::Int,
            "real" => TypeExpr::Real,
            _ => TypeExpr::Named(ident),
        }
    }

    fn parse_member_ref(&mut self) -> ParseResult<MemberRef> {
        let start = self.current_span();
        let class = self.parse_ident()?;
        self.expect(TokenKind::Dot)?;
        let member = self.parse_ident()?;
        let span = start.merge(self.prev_span());
        Ok(MemberRef {
            class,
            member,
            span,
        })
    }

    fn parse_ident(&mut self) -> ParseResult<Ident> {
        let span = self.current_span();
        match self.peek_kind() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Ident::new(name, span))
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEof { span }),
            other => Err(ParseError::UnexpectedToken {
                expected: "identifier".to_string(),
                found: other.to_string(),
                span,
            }),
        }
    }

    /// Expect a contextual keyword such as `from` in a handler declaration.
    fn expect_word(&mut self, word: &str) -> ParseResult<()> {
        match self.peek_kind() {
            TokenKind::Ident(name) if name == word => {
                self.advance();
                Ok(())
            }
            other => Err(ParseError::UnexpectedToken {
                expected: format!("'{}'", word),
                found: other.to_string(),
                span: self.current_span(),
            }),
        }
    }

    fn is_label_start(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Ident(_))
            && self.peek_ahead_kind(1) == TokenKind::Colon
    }

    fn expect_line_end(&mut self) -> ParseResult<()> {
        if self.is_at_end() || self.match_token(TokenKind::Newline) {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: "end of line".to_string(),
                found: self.peek_kind().to_string(),
                span: self.current_span(),
            })
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(TokenKind::Newline) {
            self.advance();
        }
    }

    // === Token helpers ===

    fn is_at_end(&self) -> bool {
        self.peek().is_eof()
    }

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with EOF.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind.clone()
    }

    /// Peek ahead by `offset` tokens (0 = current token).
    fn peek_ahead_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    fn current_span(&self) -> Span {
        self.peek().span
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            self.current_span()
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        std::mem::discriminant(&self.peek_kind()) == std::mem::discriminant(&kind)
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.check(kind.clone()) {
            self.advance();
            Ok(())
        } else if self.is_at_end() {
            Err(ParseError::UnexpectedEof {
                span: self.current_span(),
            })
        } else {
            Err(ParseError::UnexpectedToken {
                expected: kind.to_string(),
                found: self.peek_kind().to_string(),
                span: self.current_span(),
            })
        }
    }
}

/// Parse Cortex assembly source into a program.
pub fn parse(source: &str) -> ParseResult<Program> {
    Parser::new(source).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insns(method: &MethodDecl) -> Vec<&InsnStmt> {
        method
            .body
            .iter()
            .filter_map(|s| match s {
                Stmt::Insn(i) => Some(i),
                Stmt::Label(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_class_with_fields() {
        let src = r#"
class Node {
    field next: Node
    final field id: int
    @nonshared static field count: int
    field items: int[]
}
"#;
        let program = parse(src).unwrap();
        assert_eq!(program.classes.len(), 1);
        let class = &program.classes[0];
        assert_eq!(class.name.name, "Node");
        assert_eq!(class.fields.len(), 4);
        assert!(class.fields[1].is_final);
        assert!(class.fields[2].is_static);
        assert!(class.fields[2].has_annotation("nonshared"));
        assert_eq!(
            class.fields[3].ty,
            TypeExpr::Array(Box::new(TypeExpr::Int))
        );
    }

    #[test]
    fn test_parse_method_body() {
        let src = r#"
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
"#;
        let program = parse(src).unwrap();
        let method = &program.classes[0].methods[0];
        assert!(method.is_static);
        assert!(method.params[0].symbolic);
        assert_eq!(method.returns, Some(TypeExpr::Int));
        assert_eq!(method.body.len(), 7);
        assert_eq!(insns(method).len(), 6);
        assert!(matches!(&method.body[4], Stmt::Label(l) if l.name == "neg"));
        let entry = program.entry.unwrap();
        assert_eq!(entry.to_string(), "Main.test");
    }

    #[test]
    fn test_parse_switch_and_handlers() {
        let src = r#"
class Main {
    static method run(k: int) {
    start:
        load k
        switch 1 -> one, 2 -> two, default -> other
    one:
        return
    two:
        return
    other:
        return
    end:
        catch ArithmeticException from start to end using other
    }
}
"#;
        let program = parse(src).unwrap();
        let method = &program.classes[0].methods[0];
        let switch = insns(method)[1];
        assert_eq!(switch.mnemonic.name, "switch");
        assert_eq!(switch.operands.len(), 3);
        assert!(matches!(
            &switch.operands[2],
            Operand::Case { key: None, target, .. } if target.name == "other"
        ));
        assert_eq!(method.handlers.len(), 1);
        assert_eq!(method.handlers[0].class.name, "ArithmeticException");
    }

    #[test]
    fn test_parse_member_and_array_operands() {
        let src = r#"
class Main {
    method run() {
        getfield Node.next
        newarray Node[]
        sym x int
    }
}
"#;
        let program = parse(src).unwrap();
        let method = &program.classes[0].methods[0];
        let body = insns(method);
        assert!(matches!(&body[0].operands[0], Operand::Member(m) if m.to_string() == "Node.next"));
        assert!(matches!(&body[1].operands[0], Operand::ArrayType(TypeExpr::Array(_), _)));
        assert_eq!(body[2].operands.len(), 2);
    }

    #[test]
    fn test_error_reports_span() {
        let err = parse("class A {\n  field x int\n}").unwrap_err();
        assert_eq!(err.span().line, 2);
        assert!(err.to_string().contains("expected :"));
    }

    #[test]
    fn test_unexpected_eof() {
        let err = parse("class A {\n  method run() {\n    push 1\n").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_synchronized_field_rejected() {
        let err = parse("class A {\n  synchronized field x: int\n}").unwrap_err();
        assert!(matches!(err, ParseError::InvalidSyntax { .. }));
    }
}
