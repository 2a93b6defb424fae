//! Tokenizer for Knot source text

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::source::{SourceFile, Span};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(String),
    Str(String),
    Ident(String),
    /// `'Foo` or `'"quoted tag"`
    EnumTag(String),

    // Keywords
    Let,
    Rec,
    In,
    Fun,
    If,
    Then,
    Else,
    Null,
    True,
    False,

    // Delimiters
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Dot,

    // Operators
    Assign,
    Pipe,
    FatArrow,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Concat,
    ArrayConcat,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Number(n) => return write!(f, "number `{}`", n),
            TokenKind::Str(_) => "string literal",
            TokenKind::Ident(name) => return write!(f, "identifier `{}`", name),
            TokenKind::EnumTag(tag) => return write!(f, "enum tag `'{}`", tag),
            TokenKind::Let => "`let`",
            TokenKind::Rec => "`rec`",
            TokenKind::In => "`in`",
            TokenKind::Fun => "`fun`",
            TokenKind::If => "`if`",
            TokenKind::Then => "`then`",
            TokenKind::Else => "`else`",
            TokenKind::Null => "`null`",
            TokenKind::True => "`true`",
            TokenKind::False => "`false`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::Comma => "`,`",
            TokenKind::Dot => "`.`",
            TokenKind::Assign => "`=`",
            TokenKind::Pipe => "`|`",
            TokenKind::FatArrow => "`=>`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Concat => "`++`",
            TokenKind::ArrayConcat => "`@`",
            TokenKind::EqEq => "`==`",
            TokenKind::NotEq => "`!=`",
            TokenKind::Lt => "`<`",
            TokenKind::Le => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::Ge => "`>=`",
            TokenKind::AndAnd => "`&&`",
            TokenKind::OrOr => "`||`",
            TokenKind::Bang => "`!`",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "let" => TokenKind::Let,
        "rec" => TokenKind::Rec,
        "in" => TokenKind::In,
        "fun" => TokenKind::Fun,
        "if" => TokenKind::If,
        "then" => TokenKind::Then,
        "else" => TokenKind::Else,
        "null" => TokenKind::Null,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    })
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    source: &'a Arc<SourceFile>,
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.text[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, span: Span, message: impl Into<String>, label: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parse, message).with_primary(self.source, span, label)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self, start: usize) -> Result<String, Diagnostic> {
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error(
                    Span::new(start, self.pos),
                    "unterminated string literal",
                    "string starts here",
                ));
            };
            match c {
                '"' => return Ok(out),
                '\\' => {
                    let escape_start = self.pos - 1;
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('%') => '%',
                        _ => {
                            return Err(self.error(
                                Span::new(escape_start, self.pos),
                                "invalid escape sequence",
                                "unknown escape",
                            ));
                        }
                    };
                    out.push(escaped);
                }
                c => out.push(c),
            }
        }
    }

    fn lex_number(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        // A fraction needs a digit after the dot, otherwise `.` is field access.
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.pos;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.pos = mark;
            }
        }
        self.text[start..self.pos].to_string()
    }

    fn next_token(&mut self) -> Result<Token, Diagnostic> {
        self.skip_trivia();
        let start = self.pos;
        let Some(c) = self.bump() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                span: Span::new(start, start),
            });
        };

        let kind = match c {
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '@' => TokenKind::ArrayConcat,
            '-' => TokenKind::Minus,
            '+' => {
                if self.peek() == Some('+') {
                    self.bump();
                    TokenKind::Concat
                } else {
                    TokenKind::Plus
                }
            }
            '=' => match self.peek() {
                Some('=') => {
                    self.bump();
                    TokenKind::EqEq
                }
                Some('>') => {
                    self.bump();
                    TokenKind::FatArrow
                }
                _ => TokenKind::Assign,
            },
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '&' if self.peek() == Some('&') => {
                self.bump();
                TokenKind::AndAnd
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.bump();
                    TokenKind::OrOr
                } else {
                    TokenKind::Pipe
                }
            }
            '"' => TokenKind::Str(self.lex_string(start)?),
            '\'' => {
                if self.peek() == Some('"') {
                    self.bump();
                    TokenKind::EnumTag(self.lex_string(start)?)
                } else if self.peek().is_some_and(is_ident_start) {
                    let tag_start = self.pos;
                    while self.peek().is_some_and(is_ident_continue) {
                        self.bump();
                    }
                    TokenKind::EnumTag(self.text[tag_start..self.pos].to_string())
                } else {
                    return Err(self.error(
                        Span::new(start, self.pos),
                        "expected an enum tag after `'`",
                        "here",
                    ));
                }
            }
            c if c.is_ascii_digit() => {
                self.pos = start;
                TokenKind::Number(self.lex_number())
            }
            c if is_ident_start(c) => {
                while self.peek().is_some_and(is_ident_continue) {
                    self.bump();
                }
                let word = &self.text[start..self.pos];
                keyword(word).unwrap_or_else(|| TokenKind::Ident(word.to_string()))
            }
            other => {
                return Err(self.error(
                    Span::new(start, self.pos),
                    format!("unexpected character `{}`", other),
                    "not valid here",
                ));
            }
        };

        Ok(Token {
            kind,
            span: Span::new(start, self.pos),
        })
    }
}

/// Split a source file into tokens, ending with `TokenKind::Eof`
pub fn tokenize(source: &Arc<SourceFile>) -> Result<Vec<Token>, Diagnostic> {
    let mut lexer = Lexer {
        source,
        text: source.text(),
        pos: 0,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
