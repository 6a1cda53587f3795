//! Recursive-descent parser for the single AOS grammar:
//!
//! ```text
//! Node := Kind '#' Id ['(' Attr* ')'] ['{' Node* '}']
//! Attr := Key '=' (String | Int | Bool | Identifier)
//! ```
//!
//! Programs and bytecode containers are both read through here.

use std::path::Path;

use crate::ast::{AttrValue, Diagnostic, Node, Span};
use crate::lexer::tokens::{Token, TokenKind};
use crate::lexer::Lexer;
use crate::stack::ensure_sufficient_stack;

const MAX_PARSER_DEPTH: usize = 1024;

/// Outcome of a parse. A non-empty diagnostic list means the root, if any,
/// should not be trusted.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub root: Option<Node>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        self.root.is_some() && self.diagnostics.is_empty()
    }

    /// The root only when parsing was clean.
    pub fn into_clean_root(self) -> Result<Node, Vec<Diagnostic>> {
        match self.root {
            Some(root) if self.diagnostics.is_empty() => Ok(root),
            _ => Err(self.diagnostics),
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::End) {
            let end = tokens.last().map(|t| t.span.end).unwrap_or_default();
            tokens.push(Token::new(TokenKind::End, "", Span::new(end, end)));
        }
        Self {
            tokens,
            pos: 0,
            depth: 0,
            diagnostics: Vec::new(),
        }
    }

    // ── Public API ──────────────────────────────────────────────────────

    /// Parse exactly one node followed by end of input.
    pub fn parse_single(mut self) -> ParseResult {
        let root = match self.parse_node() {
            Ok(node) => {
                if self.check(TokenKind::End) {
                    Some(node)
                } else {
                    let tok = self.current().clone();
                    self.diagnostics.push(Diagnostic::at_span(
                        "PAR008",
                        format!("Unexpected {} after root node.", tok.kind),
                        tok.span,
                    ));
                    None
                }
            }
            Err(diag) => {
                self.diagnostics.push(diag);
                None
            }
        };
        ParseResult {
            root,
            diagnostics: self.diagnostics,
        }
    }

    // ── Nodes ───────────────────────────────────────────────────────────

    fn parse_node(&mut self) -> Result<Node, Diagnostic> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            return Err(Diagnostic::at_span(
                "PAR009",
                format!("Maximum nesting depth ({}) exceeded.", MAX_PARSER_DEPTH),
                self.current().span,
            ));
        }
        let result = ensure_sufficient_stack(|| self.parse_node_inner());
        self.depth -= 1;
        result
    }

    fn parse_node_inner(&mut self) -> Result<Node, Diagnostic> {
        let start = self.current().span.start;

        let kind = match self.current().kind {
            TokenKind::Identifier | TokenKind::Bool => self.advance().text,
            _ => return Err(self.error_here("PAR001", "Expected node kind.")),
        };

        if !self.check(TokenKind::Hash) {
            return Err(self.error_here("PAR002", "Expected '#' after node kind."));
        }
        self.advance();

        let id = match self.current().kind {
            TokenKind::Identifier | TokenKind::Int | TokenKind::Bool => self.advance().text,
            _ => return Err(self.error_here("PAR003", "Expected node id.")),
        };

        let mut node = Node::new(kind, id);

        if self.check(TokenKind::LParen) {
            self.advance();
            self.parse_attrs(&mut node)?;
        }

        if self.check(TokenKind::LBrace) {
            self.advance();
            loop {
                if self.check(TokenKind::RBrace) {
                    self.advance();
                    break;
                }
                if self.check(TokenKind::End) {
                    return Err(self.error_here("PAR007", "Expected '}' to close child list."));
                }
                let child = self.parse_node()?;
                node.children.push(child);
            }
        }

        let end = self.previous_end();
        node.span = Span::new(start, end);
        Ok(node)
    }

    fn parse_attrs(&mut self, node: &mut Node) -> Result<(), Diagnostic> {
        loop {
            match self.current().kind {
                TokenKind::RParen => {
                    self.advance();
                    return Ok(());
                }
                TokenKind::End => {
                    return Err(self.error_here("PAR007", "Expected ')' to close attribute list."));
                }
                TokenKind::Identifier | TokenKind::Bool => {}
                _ => return Err(self.error_here("PAR004", "Expected attribute name.")),
            }

            let key_tok = self.advance();
            if !self.check(TokenKind::Equals) {
                return Err(self.error_here("PAR005", "Expected '=' after attribute name."));
            }
            self.advance();
            let value = self.parse_attr_value()?;

            if node.attrs.contains_key(&key_tok.text) {
                self.diagnostics.push(Diagnostic::at_span(
                    "PAR010",
                    format!("Duplicate attribute '{}'.", key_tok.text),
                    key_tok.span,
                ));
                continue;
            }
            node.attrs.insert(key_tok.text, value);
        }
    }

    fn parse_attr_value(&mut self) -> Result<AttrValue, Diagnostic> {
        match self.current().kind {
            TokenKind::String => Ok(AttrValue::String(self.advance().text)),
            TokenKind::Bool => Ok(AttrValue::Bool(self.advance().text == "true")),
            TokenKind::Int => {
                let tok = self.advance();
                tok.text.parse::<i32>().map(AttrValue::Int).map_err(|_| {
                    Diagnostic::at_span(
                        "PAR006",
                        format!("Int literal '{}' is out of range.", tok.text),
                        tok.span,
                    )
                })
            }
            TokenKind::Identifier => {
                // Dotted targets and comma-separated parameter lists are
                // one identifier value.
                let mut text = self.advance().text;
                while matches!(self.current().kind, TokenKind::Dot | TokenKind::Comma)
                    && matches!(
                        self.peek_kind(1),
                        TokenKind::Identifier | TokenKind::Int | TokenKind::Bool
                    )
                {
                    text.push_str(&self.advance().text);
                    text.push_str(&self.advance().text);
                }
                Ok(AttrValue::Identifier(text))
            }
            _ => Err(self.error_here("PAR006", "Expected attribute value.")),
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::End)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn previous_end(&self) -> crate::ast::Position {
        if self.pos == 0 {
            return self.current().span.start;
        }
        self.tokens[self.pos - 1].span.end
    }

    fn error_here(&self, code: &str, message: &str) -> Diagnostic {
        let tok = self.current();
        Diagnostic::at_span(code, format!("{} Found {}.", message, tok.kind), tok.span)
    }
}

/// `Parse(text) -> (Root?, Diagnostics)`. Tokenizer diagnostics come first.
pub fn parse(source: &str) -> ParseResult {
    let (tokens, lex_diagnostics) = Lexer::new(source).tokenize();
    let mut result = Parser::new(tokens).parse_single();
    if !lex_diagnostics.is_empty() {
        let mut diagnostics = lex_diagnostics;
        diagnostics.append(&mut result.diagnostics);
        result.diagnostics = diagnostics;
    }
    result
}

pub fn parse_file(path: &Path) -> std::io::Result<ParseResult> {
    let source = std::fs::read_to_string(path)?;
    Ok(parse(&source))
}
