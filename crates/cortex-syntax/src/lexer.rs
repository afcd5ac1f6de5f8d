//! Lexer for Cortex assembly.
//!
//! Converts source text into a stream of tokens. Line breaks are
//! significant (they terminate instructions) and are emitted as
//! `Newline` tokens.

use crate::token::{Span, Token, TokenKind};
use std::str::Chars;

/// Lexer for Cortex assembly source.
pub struct Lexer<'a> {
    /// Source text being lexed.
    source: &'a str,
    /// Character iterator.
    chars: Chars<'a>,
    /// Current byte position.
    pos: usize,
    /// Current line number (1-indexed).
    line: u32,
    /// Current column number (1-indexed).
    column: u32,
    /// Start position of current token.
    token_start: usize,
    /// Start line of current token.
    token_start_line: u32,
    /// Start column of current token.
    token_start_column: u32,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source text.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars(),
            pos: 0,
            line: 1,
            column: 1,
            token_start: 0,
            token_start_line: 1,
            token_start_column: 1,
        }
    }

    /// Tokenize the entire source, returning all tokens including EOF.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.mark_token_start();

        let Some(c) = self.peek() else {
            return self.make_token(TokenKind::Eof);
        };

        if c == '\n' {
            self.advance();
            return self.make_token(TokenKind::Newline);
        }

        if c == '/' && self.peek_next() == Some('/') {
            return self.lex_comment();
        }

        if c.is_ascii_digit() {
            return self.lex_number();
        }

        if c == '-' && self.peek_next().is_some_and(|n| n.is_ascii_digit()) {
            self.advance();
            return self.lex_number();
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            return self.lex_identifier();
        }

        // `<init>` and `<clinit>` style names
        if c == '<' && self.peek_next().is_some_and(|n| n.is_alphabetic()) {
            return self.lex_special_name();
        }

        self.lex_punctuation()
    }

    /// Skip horizontal whitespace. Newlines are tokens.
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() && c != '\n' {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Mark the start of a new token.
    fn mark_token_start(&mut self) {
        self.token_start = self.pos;
        self.token_start_line = self.line;
        self.token_start_column = self.column;
    }

    /// Peek at the current character without consuming it.
    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    /// Peek at the next character (after current) without consuming.
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.chars.clone();
        chars.next();
        chars.next()
    }

    /// Advance to the next character, returning the current one.
    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Create a token with the current span.
    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(
            kind,
            Span::new(
                self.token_start,
                self.pos,
                self.token_start_line,
                self.token_start_column,
            ),
        )
    }

    /// Get the text of the current token.
    fn token_text(&self) -> &'a str {
        &self.source[self.token_start..self.pos]
    }

    /// Lex a single-line comment.
    fn lex_comment(&mut self) -> Token {
        self.advance();
        self.advance();
        if self.peek() == Some(' ') {
            self.advance();
        }
        let content_start = self.pos;
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
        let content = self.source[content_start..self.pos].to_string();
        self.make_token(TokenKind::Comment(content))
    }

    /// Lex an integer or real literal. A leading `-` has already been consumed.
    fn lex_number(&mut self) -> Token {
        self.eat_digits();

        let mut is_real = false;
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_real = true;
            self.advance();
            self.eat_digits();
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut ahead = self.chars.clone();
            ahead.next();
            let mut next = ahead.next();
            if matches!(next, Some('+') | Some('-')) {
                next = ahead.next();
            }
            if next.is_some_and(|c| c.is_ascii_digit()) {
                is_real = true;
                self.advance();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.advance();
                }
                self.eat_digits();
            }
        }

        let text = self.token_text();
        if is_real {
            match text.parse::<f64>() {
                Ok(r) => self.make_token(TokenKind::Real(r)),
                Err(_) => self.make_token(TokenKind::Error(format!("invalid real: {}", text))),
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => self.make_token(TokenKind::Integer(n)),
                Err(_) => self.make_token(TokenKind::Error(format!("invalid integer: {}", text))),
            }
        }
    }

    fn eat_digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Lex an identifier or keyword.
    fn lex_identifier(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.advance();
            } else {
                break;
            }
        }

        let text = self.token_text();
        if let Some(keyword) = TokenKind::keyword(text) {
            self.make_token(keyword)
        } else {
            self.make_token(TokenKind::Ident(text.to_string()))
        }
    }

    /// Lex `<name>`.
    fn lex_special_name(&mut self) -> Token {
        self.advance();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() != Some('>') {
            let text = self.token_text().to_string();
            return self.make_token(TokenKind::Error(format!("unterminated name: {}", text)));
        }
        self.advance();
        self.make_token(TokenKind::Ident(self.token_text().to_string()))
    }

    /// Lex punctuation.
    fn lex_punctuation(&mut self) -> Token {
        let Some(c) = self.advance() else {
            return self.make_token(TokenKind::Eof);
        };
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '@' => TokenKind::At,
            '-' if self.peek() == Some('>') => {
                self.advance();
                TokenKind::Arrow
            }
            _ => TokenKind::Error(format!("unexpected character: {:?}", c)),
        };
        self.make_token(kind)
    }
}
