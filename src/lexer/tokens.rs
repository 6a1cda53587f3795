use std::fmt;

use crate::ast::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Hash,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Equals,
    String,
    Int,
    Bool,
    Dot,
    Comma,
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            TokenKind::Identifier => "identifier",
            TokenKind::Hash => "'#'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Equals => "'='",
            TokenKind::String => "string",
            TokenKind::Int => "int",
            TokenKind::Bool => "bool",
            TokenKind::Dot => "'.'",
            TokenKind::Comma => "','",
            TokenKind::End => "end of input",
        };
        write!(f, "{}", s)
    }
}

/// A token with its decoded text (string escapes already applied).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            TokenKind::String => write!(f, "{}:{} {} {:?}", self.span.start.line, self.span.start.column, self.kind, self.text),
            TokenKind::End => write!(f, "{}:{} {}", self.span.start.line, self.span.start.column, self.kind),
            _ => write!(f, "{}:{} {} {}", self.span.start.line, self.span.start.column, self.kind, self.text),
        }
    }
}

pub fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

pub fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '-'
}

/// `-?[0-9]+`
pub fn is_int_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
