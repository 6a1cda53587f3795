//! Lexer tests: token kinds, identifier/int classification, escapes, errors

use aos_lang::lexer::tokenize;
use aos_lang::lexer::tokens::TokenKind;

fn lex(source: &str) -> Vec<(TokenKind, String)> {
    let (tokens, diagnostics) = tokenize(source);
    assert!(diagnostics.is_empty(), "unexpected diagnostics: {:?}", diagnostics);
    tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::End)
        .map(|t| (t.kind, t.text))
        .collect()
}

fn lex_kinds(source: &str) -> Vec<TokenKind> {
    lex(source).into_iter().map(|(kind, _)| kind).collect()
}

fn lex_codes(source: &str) -> Vec<String> {
    tokenize(source).1.into_iter().map(|d| d.code).collect()
}

// ── Basic tokens ────────────────────────────────────────────

#[test]
fn empty_source_is_just_end() {
    let (tokens, diagnostics) = tokenize("");
    assert!(diagnostics.is_empty());
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::End);
}

#[test]
fn punctuation() {
    assert_eq!(
        lex_kinds("# ( ) { } = . ,"),
        vec![
            TokenKind::Hash,
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::LBrace,
            TokenKind::RBrace,
            TokenKind::Equals,
            TokenKind::Dot,
            TokenKind::Comma,
        ]
    );
}

#[test]
fn node_header() {
    assert_eq!(
        lex("Lit#l1(value=5)"),
        vec![
            (TokenKind::Identifier, "Lit".into()),
            (TokenKind::Hash, "#".into()),
            (TokenKind::Identifier, "l1".into()),
            (TokenKind::LParen, "(".into()),
            (TokenKind::Identifier, "value".into()),
            (TokenKind::Equals, "=".into()),
            (TokenKind::Int, "5".into()),
            (TokenKind::RParen, ")".into()),
        ]
    );
}

#[test]
fn identifiers_allow_underscore_digits_and_dash() {
    assert_eq!(lex("_a-b9"), vec![(TokenKind::Identifier, "_a-b9".into())]);
}

#[test]
fn true_and_false_are_bools() {
    assert_eq!(lex_kinds("true false truth"), vec![TokenKind::Bool, TokenKind::Bool, TokenKind::Identifier]);
}

// ── Numbers ─────────────────────────────────────────────────

#[test]
fn negative_int() {
    assert_eq!(lex("-42"), vec![(TokenKind::Int, "-42".into())]);
}

#[test]
fn digit_led_run_that_is_not_an_int_is_identifier() {
    assert_eq!(lex("9abc"), vec![(TokenKind::Identifier, "9abc".into())]);
    assert_eq!(lex("-x"), vec![(TokenKind::Identifier, "-x".into())]);
}

#[test]
fn dotted_target_splits_into_parts() {
    assert_eq!(
        lex_kinds("sys.fs_stat"),
        vec![TokenKind::Identifier, TokenKind::Dot, TokenKind::Identifier]
    );
}

// ── Strings ─────────────────────────────────────────────────

#[test]
fn string_escapes_are_decoded() {
    assert_eq!(
        lex(r#""a\"b\\c\nd\te\r""#),
        vec![(TokenKind::String, "a\"b\\c\nd\te\r".into())]
    );
}

#[test]
fn invalid_escape_is_reported() {
    assert_eq!(lex_codes(r#""bad\q""#), vec!["TOK003"]);
}

#[test]
fn unterminated_string_is_reported() {
    let (tokens, diagnostics) = tokenize("\"open");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, "TOK004");
    assert_eq!(tokens[0].kind, TokenKind::String);
    assert_eq!(tokens[0].text, "open");
}

// ── Errors and positions ────────────────────────────────────

#[test]
fn unexpected_character_is_reported_and_skipped() {
    let (tokens, diagnostics) = tokenize("a @ b");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, "TOK001");
    let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![TokenKind::Identifier, TokenKind::Identifier, TokenKind::End]);
}

#[test]
fn line_comments_are_skipped() {
    assert_eq!(lex_kinds("a // note\nb"), vec![TokenKind::Identifier, TokenKind::Identifier]);
}

#[test]
fn positions_are_one_based_lines_and_columns() {
    let (tokens, _) = tokenize("a\n  b");
    assert_eq!(tokens[0].span.start.line, 1);
    assert_eq!(tokens[0].span.start.column, 1);
    assert_eq!(tokens[1].span.start.line, 2);
    assert_eq!(tokens[1].span.start.column, 3);
    assert_eq!(tokens[1].span.start.offset, 4);
}
