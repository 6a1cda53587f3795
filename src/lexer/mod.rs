pub mod tokens;

use tokens::{is_identifier_part, is_identifier_start, is_int_literal, Token, TokenKind};

use crate::ast::{Diagnostic, Position, Span};

/// Tokenizer for the node grammar. Never aborts: bad input is reported as
/// diagnostics and the stream always ends with an `End` token.
pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        loop {
            self.skip_whitespace_and_comments();
            if self.at_end() {
                let here = self.position();
                self.tokens.push(Token::new(TokenKind::End, "", Span::new(here, here)));
                break;
            }

            let ch = self.peek();
            if is_identifier_start(ch) {
                self.scan_identifier();
                continue;
            }
            if ch == '-' || ch.is_ascii_digit() {
                self.scan_number_or_identifier();
                continue;
            }

            match ch {
                '#' => self.single(TokenKind::Hash),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                '=' => self.single(TokenKind::Equals),
                '.' => self.single(TokenKind::Dot),
                ',' => self.single(TokenKind::Comma),
                '"' => self.scan_string(),
                _ => {
                    let start = self.position();
                    self.advance();
                    let end = self.position();
                    self.diagnostics.push(Diagnostic::at_span(
                        "TOK001",
                        format!("Unexpected character '{}'.", ch),
                        Span::new(start, end),
                    ));
                }
            }
        }

        (self.tokens, self.diagnostics)
    }

    // ── Scanners ────────────────────────────────────────────────────────

    fn scan_identifier(&mut self) {
        let start = self.position();
        let mut text = String::new();
        text.push(self.advance());
        while !self.at_end() && is_identifier_part(self.peek()) {
            text.push(self.advance());
        }
        let kind = if text == "true" || text == "false" {
            TokenKind::Bool
        } else {
            TokenKind::Identifier
        };
        let span = Span::new(start, self.position());
        self.tokens.push(Token::new(kind, text, span));
    }

    fn scan_number_or_identifier(&mut self) {
        let start = self.position();
        let mut text = String::new();
        text.push(self.advance());
        while !self.at_end() && is_identifier_part(self.peek()) {
            text.push(self.advance());
        }
        let kind = if is_int_literal(&text) {
            TokenKind::Int
        } else {
            TokenKind::Identifier
        };
        let span = Span::new(start, self.position());
        self.tokens.push(Token::new(kind, text, span));
    }

    fn scan_string(&mut self) {
        let start = self.position();
        self.advance(); // opening quote
        let mut text = String::new();
        while !self.at_end() {
            let ch = self.advance();
            if ch == '"' {
                let span = Span::new(start, self.position());
                self.tokens.push(Token::new(TokenKind::String, text, span));
                return;
            }
            if ch == '\\' {
                if self.at_end() {
                    break;
                }
                let esc = self.advance();
                match esc {
                    '"' => text.push('"'),
                    '\\' => text.push('\\'),
                    'n' => text.push('\n'),
                    'r' => text.push('\r'),
                    't' => text.push('\t'),
                    other => {
                        self.diagnostics.push(Diagnostic::at_span(
                            "TOK003",
                            format!("Invalid escape \\{}.", other),
                            Span::new(start, self.position()),
                        ));
                        text.push(other);
                    }
                }
                continue;
            }
            text.push(ch);
        }

        let span = Span::new(start, self.position());
        self.diagnostics.push(Diagnostic::at_span(
            "TOK004",
            "Unterminated string literal.",
            span,
        ));
        self.tokens.push(Token::new(TokenKind::String, text, span));
    }

    fn skip_whitespace_and_comments(&mut self) {
        while !self.at_end() {
            let ch = self.peek();
            if ch.is_whitespace() {
                self.advance();
                continue;
            }
            if ch == '/' && self.peek_ahead(1) == Some('/') {
                while !self.at_end() && self.peek() != '\n' {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn single(&mut self, kind: TokenKind) {
        let start = self.position();
        let ch = self.advance();
        let span = Span::new(start, self.position());
        self.tokens.push(Token::new(kind, ch.to_string(), span));
    }

    fn position(&self) -> Position {
        Position::new(self.pos, self.line, self.column)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> char {
        self.source[self.pos]
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.source[self.pos];
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }
}

/// Tokenize `source`, returning the token stream and any diagnostics.
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    Lexer::new(source).tokenize()
}
