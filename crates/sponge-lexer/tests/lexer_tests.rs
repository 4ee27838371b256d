//! Integration tests for the sponge lexer.

use sponge_lexer::{Lexer, TokenKind};
use sponge_types::SourceFile;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn lex(source: &str) -> Vec<TokenKind> {
    let sf = SourceFile::new("main.py", source);
    let result = Lexer::new(&sf).lex();
    if result.errors.has_errors() {
        panic!(
            "lex errors:\n{}",
            result
                .errors
                .errors
                .iter()
                .map(|e| format!("  [{}] {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }
    result.tokens.into_iter().map(|t| t.kind).collect()
}

fn lex_errors(source: &str) -> Vec<String> {
    let sf = SourceFile::new("main.py", source);
    Lexer::new(&sf)
        .lex()
        .errors
        .errors
        .into_iter()
        .map(|e| e.message)
        .collect()
}

fn ident(name: &str) -> TokenKind {
    TokenKind::Identifier(name.to_string())
}

// ══════════════════════════════════════════════════════════════════════════════
// Layout
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn simple_statement_gets_trailing_newline() {
    assert_eq!(
        lex("x = 1"),
        vec![
            ident("x"),
            TokenKind::Eq,
            TokenKind::Int(1),
            TokenKind::Newline,
            TokenKind::Eof
        ]
    );
}

#[test]
fn indented_block_emits_indent_and_dedent() {
    let tokens = lex("if x:\n    y\nz\n");
    assert_eq!(
        tokens,
        vec![
            TokenKind::If,
            ident("x"),
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            ident("y"),
            TokenKind::Newline,
            TokenKind::Dedent,
            ident("z"),
            TokenKind::Newline,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn dedents_are_closed_at_end_of_file() {
    let tokens = lex("while a:\n  if b:\n    c");
    let dedents = tokens.iter().filter(|t| **t == TokenKind::Dedent).count();
    assert_eq!(dedents, 2);
    assert_eq!(tokens.last(), Some(&TokenKind::Eof));
}

#[test]
fn blank_and_comment_lines_do_not_affect_layout() {
    let tokens = lex("if x:\n\n    # note\n    y\n\n# done\nz\n");
    assert_eq!(
        tokens
            .iter()
            .filter(|t| matches!(t, TokenKind::Indent | TokenKind::Dedent))
            .count(),
        2
    );
    assert_eq!(
        tokens.iter().filter(|t| **t == TokenKind::Newline).count(),
        3
    );
}

#[test]
fn newlines_inside_brackets_are_ignored() {
    let tokens = lex("print(1,\n      2)\n");
    assert_eq!(
        tokens.iter().filter(|t| **t == TokenKind::Newline).count(),
        1
    );
    assert!(!tokens.contains(&TokenKind::Indent));
}

#[test]
fn backslash_joins_lines() {
    let tokens = lex("x = 1 + \\\n    2\n");
    assert!(!tokens.contains(&TokenKind::Indent));
    assert_eq!(
        tokens.iter().filter(|t| **t == TokenKind::Newline).count(),
        1
    );
}

#[test]
fn inconsistent_dedent_is_reported() {
    let errors = lex_errors("if x:\n    y\n  z\n");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("unindent"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Literals
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn numbers() {
    assert_eq!(lex("42")[0], TokenKind::Int(42));
    assert_eq!(lex("3.5")[0], TokenKind::Float(3.5));
    assert_eq!(lex(".5")[0], TokenKind::Float(0.5));
    assert_eq!(lex("1e3")[0], TokenKind::Float(1000.0));
    assert_eq!(lex("1_000")[0], TokenKind::Int(1000));
}

#[test]
fn oversized_integer_is_an_error() {
    let errors = lex_errors("x = 99999999999999999999999");
    assert_eq!(errors.len(), 1);
}

#[test]
fn strings_with_either_quote_and_escapes() {
    assert_eq!(lex("'hi'")[0], TokenKind::Str("hi".into()));
    assert_eq!(lex("\"it's\"")[0], TokenKind::Str("it's".into()));
    assert_eq!(lex(r#""a\nb""#)[0], TokenKind::Str("a\nb".into()));
    assert_eq!(lex("''")[0], TokenKind::Str(String::new()));
    assert_eq!(lex(r#""\d""#)[0], TokenKind::Str("\\d".into()));
}

#[test]
fn triple_quoted_string_spans_lines() {
    let tokens = lex("s = \"\"\"one\ntwo\"\"\"\nprint(s)");
    assert_eq!(tokens[2], TokenKind::Str("one\ntwo".into()));
    assert_eq!(tokens[3], TokenKind::Newline);
}

#[test]
fn unterminated_string_is_reported() {
    let errors = lex_errors("x = 'oops\n");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("EOL"));
}

#[test]
fn non_ascii_text_survives() {
    assert_eq!(lex("'héllo'")[0], TokenKind::Str("héllo".into()));
    assert_eq!(lex("café = 1")[0], ident("café"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn compound_operators() {
    let tokens = lex("a ** b // c += d != e <= f");
    assert!(tokens.contains(&TokenKind::DoubleStar));
    assert!(tokens.contains(&TokenKind::DoubleSlash));
    assert!(tokens.contains(&TokenKind::PlusEq));
    assert!(tokens.contains(&TokenKind::BangEq));
    assert!(tokens.contains(&TokenKind::LessEq));
}

#[test]
fn semicolons_and_comments() {
    let tokens = lex("a = 1; b = 2  # trailing\n");
    assert_eq!(
        tokens,
        vec![
            ident("a"),
            TokenKind::Eq,
            TokenKind::Int(1),
            TokenKind::Semicolon,
            ident("b"),
            TokenKind::Eq,
            TokenKind::Int(2),
            TokenKind::Newline,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn invalid_character_is_reported_and_skipped() {
    let sf = SourceFile::new("main.py", "x = 1 $ 2");
    let result = Lexer::new(&sf).lex();
    assert_eq!(result.errors.total_errors, 1);
    assert!(result.tokens.iter().any(|t| t.kind == TokenKind::Int(2)));
}

#[test]
fn spans_track_lines() {
    let sf = SourceFile::new("main.py", "a\n\nb");
    let result = Lexer::new(&sf).lex();
    let b = result
        .tokens
        .iter()
        .find(|t| t.kind == ident("b"))
        .unwrap();
    assert_eq!(b.span.start_line, 3);
    assert_eq!(b.span.start_col, 1);
}

#[test]
fn lexing_is_deterministic() {
    let source = "def f(x):\n    return x * 2\nprint(f(3))\n";
    let first = lex(source);
    for i in 0..100 {
        assert_eq!(first, lex(source), "Determinism failure at iteration {i}");
    }
}
