//! Token types and source span tracking for the Cortex assembly lexer.

use std::fmt;

/// A span in the source code, tracking byte offsets and line/column.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, in characters not bytes).
    pub column: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Create a dummy span for generated code.
    pub fn dummy() -> Self {
        Self::default()
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            column: if self.line <= other.line {
                self.column
            } else {
                other.column
            },
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The kind of token.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // === Keywords ===
    /// `class`
    Class,
    /// `extends`
    Extends,
    /// `abstract`
    Abstract,
    /// `immutable`
    Immutable,
    /// `field`
    Field,
    /// `static`
    Static,
    /// `final`
    Final,
    /// `method`
    Method,
    /// `synchronized`
    Synchronized,
    /// `entry`
    Entry,
    /// `catch`
    Catch,

    // === Literals ===
    /// Integer literal, sign included.
    Integer(i64),
    /// Real literal, sign included.
    Real(f64),
    /// Identifier, mnemonic, or `<init>`-style special name.
    Ident(String),

    // === Punctuation ===
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// `->`
    Arrow,
    /// `@`
    At,

    // === Layout ===
    /// End of a line. Instructions are line-terminated.
    Newline,
    /// `// ...`
    Comment(String),

    /// Lexing error with message.
    Error(String),
    /// End of input.
    Eof,
}

impl TokenKind {
    /// Look up a keyword by its text.
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        Some(match ident {
            "class" => TokenKind::Class,
            "extends" => TokenKind::Extends,
            "abstract" => TokenKind::Abstract,
            "immutable" => TokenKind::Immutable,
            "field" => TokenKind::Field,
            "static" => TokenKind::Static,
            "final" => TokenKind::Final,
            "method" => TokenKind::Method,
            "synchronized" => TokenKind::Synchronized,
            "entry" => TokenKind::Entry,
            "catch" => TokenKind::Catch,
            _ => return None,
        })
    }

    /// Trivia tokens are dropped before parsing.
    pub fn is_trivia(&self) -> bool {
        matches!(self, TokenKind::Comment(_))
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Class => write!(f, "class"),
            TokenKind::Extends => write!(f, "extends"),
            TokenKind::Abstract => write!(f, "abstract"),
            TokenKind::Immutable => write!(f, "immutable"),
            TokenKind::Field => write!(f, "field"),
            TokenKind::Static => write!(f, "static"),
            TokenKind::Final => write!(f, "final"),
            TokenKind::Method => write!(f, "method"),
            TokenKind::Synchronized => write!(f, "synchronized"),
            TokenKind::Entry => write!(f, "entry"),
            TokenKind::Catch => write!(f, "catch"),
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::Real(r) => write!(f, "{}", r),
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::At => write!(f, "@"),
            TokenKind::Newline => write!(f, "newline"),
            TokenKind::Comment(_) => write!(f, "comment"),
            TokenKind::Error(msg) => write!(f, "error: {}", msg),
            TokenKind::Eof => write!(f, "end of file"),
        }
    }
}

/// A token with its kind and source location.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// The span in the source code.
    pub span: Span,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Check if this is the end of file.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Check if this is an error token.
    pub fn is_error(&self) -> bool {
        matches!(self.kind, TokenKind::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let s1 = Span::new(0, 5, 1, 1);
        let s2 = Span::new(10, 15, 2, 3);
        let merged = s1.merge(s2);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 15);
        assert_eq!(merged.line, 1);
        assert_eq!(merged.column, 1);
    }

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(TokenKind::keyword("class"), Some(TokenKind::Class));
        assert_eq!(TokenKind::keyword("synchronized"), Some(TokenKind::Synchronized));
        assert_eq!(TokenKind::keyword("getfield"), None);
    }
}
