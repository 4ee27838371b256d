//! Core parser infrastructure: token cursor, error reporting, helpers.

use sponge_lexer::token::{Token, TokenKind};
use sponge_lexer::Lexer;
use sponge_types::ast::{Expr, Ident, Program};
use sponge_types::{CompileErrors, ErrorCode, SourceFile, Span, SpongeError};

/// Maximum expression nesting before the parser gives up on a line.
pub(crate) const MAX_EXPR_DEPTH: u32 = 100;

/// The sponge parser.
///
/// Consumes the lexer's token stream and builds a [`Program`]. Errors are
/// collected and parsing resumes at the next line.
pub struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    source_file: &'src SourceFile,
    errors: CompileErrors,
    /// Enclosing loop count; `break` / `continue` need one.
    pub(crate) loop_depth: u32,
    /// Enclosing `def` count; `return` needs one.
    pub(crate) function_depth: u32,
    pub(crate) expr_depth: u32,
}

/// Result of parsing.
pub struct ParseResult {
    /// `None` when any error was reported.
    pub program: Option<Program>,
    pub errors: CompileErrors,
}

impl<'src> Parser<'src> {
    pub fn new(tokens: Vec<Token>, source_file: &'src SourceFile) -> Self {
        Self {
            tokens,
            pos: 0,
            source_file,
            errors: CompileErrors::empty(),
            loop_depth: 0,
            function_depth: 0,
            expr_depth: 0,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    pub(crate) fn peek(&self) -> &Token {
        static EOF: Token = Token {
            kind: TokenKind::Eof,
            span: Span {
                start_line: 1,
                start_col: 1,
                end_line: 1,
                end_col: 1,
            },
        };
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .unwrap_or(&EOF)
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn previous_span(&self) -> Span {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some(token) => token.span,
            None => Span::point(1, 1),
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn check_exact(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check_exact(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Token> {
        if self.check_exact(expected) {
            Some(self.advance())
        } else {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("expected '{}', got '{}'", expected, self.peek_kind()),
            );
            None
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Option<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            other => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected a name, got '{other}'"),
                );
                None
            }
        }
    }

    /// End of a simple-statement line.
    pub(crate) fn expect_newline(&mut self) -> Option<()> {
        if self.eat(&TokenKind::Newline) || self.at_end() {
            return Some(());
        }
        self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "invalid syntax");
        None
    }

    pub(crate) fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    pub(crate) fn error_at_current(&mut self, code: ErrorCode, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(code, message, span);
    }

    pub(crate) fn error_at(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source_file.line(span.start_line).unwrap_or("");
        let error = SpongeError::new(&self.source_file.name, code, message, span, source_line);
        self.errors.push_error(error);
    }

    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.is_full()
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip to the start of the next logical line. An indented block that
    /// follows a broken header is skipped with it.
    pub(crate) fn synchronize(&mut self) {
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Newline => {
                    self.advance();
                    if self.check_exact(&TokenKind::Indent) {
                        self.skip_indented_block();
                    }
                    return;
                }
                TokenKind::Dedent => return,
                TokenKind::Indent => {
                    self.skip_indented_block();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Consume an `Indent ... Dedent` run, nested blocks included.
    pub(crate) fn skip_indented_block(&mut self) {
        let mut depth = 0u32;
        while !self.at_end() {
            match self.advance().kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream into a [`Program`].
    pub fn parse(mut self) -> ParseResult {
        let program = self.parse_program();
        let program = if self.errors.has_errors() {
            None
        } else {
            Some(program)
        };
        ParseResult {
            program,
            errors: self.errors,
        }
    }

    /// Parse a single expression followed only by layout tokens.
    pub fn parse_single_expression(mut self) -> Result<Expr, CompileErrors> {
        self.skip_newlines();
        let expr = self.parse_expression();
        self.skip_newlines();
        if expr.is_some() && !self.at_end() {
            self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "invalid syntax");
        }
        match expr {
            Some(expr) if !self.errors.has_errors() => Ok(expr),
            _ => Err(self.errors),
        }
    }
}

/// Lex and parse a whole script.
pub fn parse_source(source_file: &SourceFile) -> Result<Program, CompileErrors> {
    let lexed = Lexer::new(source_file).lex();
    if lexed.errors.has_errors() {
        return Err(lexed.errors);
    }
    let result = Parser::new(lexed.tokens, source_file).parse();
    match result.program {
        Some(program) => Ok(program),
        None => Err(result.errors),
    }
}

/// Lex and parse one expression, e.g. a grading statement.
pub fn parse_expression_source(source_file: &SourceFile) -> Result<Expr, CompileErrors> {
    let lexed = Lexer::new(source_file).lex();
    if lexed.errors.has_errors() {
        return Err(lexed.errors);
    }
    Parser::new(lexed.tokens, source_file).parse_single_expression()
}
