//! Core sponge lexer.
//!
//! Features:
//! - Offside rule: leading whitespace becomes `Indent` / `Dedent` tokens
//! - Newlines inside `()` / `[]` are ignored, as are blank and comment-only lines
//! - `\` at end of line joins it with the next
//! - Single, double and triple quoted strings with backslash escapes
//! - Error recovery: collects up to [`sponge_types::MAX_ERRORS`] errors

use sponge_types::{CompileErrors, ErrorCode, SourceFile, Span, SpongeError};

use crate::token::{Token, TokenKind};

/// Tab stops are every eight columns.
const TAB_WIDTH: u32 = 8;

/// Where a token started: byte offset plus 1-based line/column.
#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    line: u32,
    col: u32,
}

pub struct Lexer<'src> {
    source: &'src [u8],
    source_file: &'src SourceFile,
    pos: usize,
    line: u32,
    col: u32,
    errors: CompileErrors,
    /// Indentation widths of the enclosing blocks; never empty.
    indents: Vec<u32>,
    /// Spans of unclosed `(` / `[`. Layout tokens are suppressed while any are open.
    open_brackets: Vec<Span>,
    at_line_start: bool,
    tokens: Vec<Token>,
}

/// Result of lexing: tokens + any errors collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: CompileErrors,
}

impl<'src> Lexer<'src> {
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            source: source_file.source.as_bytes(),
            source_file,
            pos: 0,
            line: 1,
            col: 1,
            errors: CompileErrors::empty(),
            indents: vec![0],
            open_brackets: Vec::new(),
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    /// Lex the whole file.
    pub fn lex(mut self) -> LexResult {
        while !self.errors.is_full() {
            if self.at_line_start && self.open_brackets.is_empty() {
                if !self.scan_indentation() {
                    break;
                }
                continue;
            }
            self.skip_inline_whitespace();
            match self.peek() {
                None => break,
                Some(b'#') => self.skip_comment(),
                Some(b'\\') if self.continues_line() => self.join_lines(),
                Some(b'\n') => {
                    let start = self.mark();
                    self.advance();
                    if self.open_brackets.is_empty() {
                        self.push(TokenKind::Newline, start);
                        self.at_line_start = true;
                    }
                }
                Some(_) => self.scan_token(),
            }
        }
        self.finish()
    }

    fn finish(mut self) -> LexResult {
        let end = self.mark();
        if let Some(&open) = self.open_brackets.first() {
            self.emit_error(
                ErrorCode::UNEXPECTED_TOKEN,
                "unexpected EOF while parsing: unclosed bracket",
                open,
            );
        }
        if self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Dedent))
        {
            self.push(TokenKind::Newline, end);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, end);
        }
        self.push(TokenKind::Eof, end);
        LexResult {
            tokens: self.tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if ch & 0xC0 != 0x80 {
            // UTF-8 continuation bytes do not start a new column
            self.col += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    fn span_at(&self, start: Mark) -> Span {
        Span::point(start.line, start.col)
    }

    fn span_from(&self, start: Mark) -> Span {
        Span::new(
            start.line,
            start.col,
            self.line,
            self.col.saturating_sub(1).max(1),
        )
    }

    fn text_from(&self, start: Mark) -> &'src str {
        std::str::from_utf8(&self.source[start.pos..self.pos]).unwrap_or("")
    }

    fn push(&mut self, kind: TokenKind, start: Mark) {
        let span = self.span_from(start);
        self.tokens.push(Token::new(kind, span));
    }

    fn emit_error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source_file.line(span.start_line).unwrap_or("");
        let err = SpongeError::new(&self.source_file.name, code, message, span, source_line);
        self.errors.push_error(err);
    }

    // ─────────────────────────────────────────────────────────────
    // Layout
    // ─────────────────────────────────────────────────────────────

    /// Measure the indentation of a new logical line and emit layout tokens.
    ///
    /// Blank and comment-only lines are consumed without affecting the
    /// indentation stack. Returns `false` at end of input.
    fn scan_indentation(&mut self) -> bool {
        let mut width = 0u32;
        loop {
            match self.peek() {
                Some(b' ') => width += 1,
                Some(b'\t') => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                Some(b'\r') | Some(b'\x0c') => {}
                _ => break,
            }
            self.advance();
        }

        match self.peek() {
            None => return false,
            Some(b'\n') => {
                self.advance();
                return true;
            }
            Some(b'#') => {
                self.skip_comment();
                return true;
            }
            _ => {}
        }

        self.at_line_start = false;
        let start = self.mark();
        let current = self.current_indent();
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, start);
        } else if width < current {
            while width < self.current_indent() {
                self.indents.pop();
                self.push(TokenKind::Dedent, start);
            }
            if width != self.current_indent() {
                self.emit_error(
                    ErrorCode::INCONSISTENT_DEDENT,
                    "unindent does not match any outer indentation level",
                    self.span_at(start),
                );
            }
        }
        true
    }

    fn current_indent(&self) -> u32 {
        self.indents.last().copied().unwrap_or(0)
    }

    fn skip_inline_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\x0c')) {
            self.advance();
        }
    }

    /// Consume a `#` comment up to, not including, the newline.
    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                break;
            }
            self.advance();
        }
    }

    fn continues_line(&self) -> bool {
        match self.peek_at(1) {
            Some(b'\n') => true,
            Some(b'\r') => self.peek_at(2) == Some(b'\n'),
            _ => false,
        }
    }

    fn join_lines(&mut self) {
        self.advance(); // `\`
        self.eat(b'\r');
        self.advance(); // `\n`
    }

    // ─────────────────────────────────────────────────────────────
    // Tokens
    // ─────────────────────────────────────────────────────────────

    fn scan_token(&mut self) {
        let start = self.mark();
        let Some(ch) = self.advance() else {
            return;
        };

        let kind = match ch {
            b'"' | b'\'' => {
                let value = self.scan_string(ch, start);
                TokenKind::Str(value)
            }
            b'0'..=b'9' => self.scan_number(start, false),
            b'.' if matches!(self.peek(), Some(b'0'..=b'9')) => self.scan_number(start, true),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | 0x80..=0xFF => self.scan_identifier(start),

            b'+' if self.eat(b'=') => TokenKind::PlusEq,
            b'+' => TokenKind::Plus,
            b'-' if self.eat(b'=') => TokenKind::MinusEq,
            b'-' => TokenKind::Minus,
            b'*' if self.eat(b'*') => TokenKind::DoubleStar,
            b'*' if self.eat(b'=') => TokenKind::StarEq,
            b'*' => TokenKind::Star,
            b'/' if self.eat(b'/') => TokenKind::DoubleSlash,
            b'/' if self.eat(b'=') => TokenKind::SlashEq,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'=' if self.eat(b'=') => TokenKind::EqEq,
            b'=' => TokenKind::Eq,
            b'!' if self.eat(b'=') => TokenKind::BangEq,
            b'<' if self.eat(b'=') => TokenKind::LessEq,
            b'<' => TokenKind::Less,
            b'>' if self.eat(b'=') => TokenKind::GreaterEq,
            b'>' => TokenKind::Greater,

            b'(' | b'[' => {
                let open = self.span_from(start);
                self.open_brackets.push(open);
                if ch == b'(' {
                    TokenKind::LParen
                } else {
                    TokenKind::LBracket
                }
            }
            b')' | b']' => {
                self.open_brackets.pop();
                if ch == b')' {
                    TokenKind::RParen
                } else {
                    TokenKind::RBracket
                }
            }
            b',' => TokenKind::Comma,
            b':' => TokenKind::Colon,
            b';' => TokenKind::Semicolon,
            b'.' => TokenKind::Dot,

            _ => {
                let span = self.span_from(start);
                self.emit_error(
                    ErrorCode::INVALID_CHARACTER,
                    format!("invalid character '{}'", ch as char),
                    span,
                );
                return;
            }
        };
        self.push(kind, start);
    }

    fn scan_identifier(&mut self, start: Mark) -> TokenKind {
        while matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | 0x80..=0xFF)
        ) {
            self.advance();
        }
        let text = self.text_from(start);
        TokenKind::from_keyword(text).unwrap_or_else(|| TokenKind::Identifier(text.to_string()))
    }

    fn scan_number(&mut self, start: Mark, leading_dot: bool) -> TokenKind {
        let mut is_float = leading_dot;
        self.skip_digits();

        if !leading_dot
            && self.peek() == Some(b'.')
            && !matches!(self.peek_at(1), Some(b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'.'))
        {
            is_float = true;
            self.advance();
            self.skip_digits();
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            let signed = matches!(self.peek_at(1), Some(b'+' | b'-'));
            let digit_at = if signed { 2 } else { 1 };
            if matches!(self.peek_at(digit_at), Some(b'0'..=b'9')) {
                is_float = true;
                for _ in 0..digit_at {
                    self.advance();
                }
                self.skip_digits();
            }
        }

        let text = self.text_from(start).replace('_', "");
        if is_float {
            return TokenKind::Float(text.parse().unwrap_or(0.0));
        }
        match text.parse::<i64>() {
            Ok(n) => TokenKind::Int(n),
            Err(_) => {
                let span = self.span_from(start);
                self.emit_error(
                    ErrorCode::INVALID_NUMBER,
                    format!("integer literal '{text}' is too large"),
                    span,
                );
                TokenKind::Int(0)
            }
        }
    }

    fn skip_digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9' | b'_')) {
            self.advance();
        }
    }

    /// Scan a string body after its opening quote. Triple-quoted strings may
    /// span lines.
    fn scan_string(&mut self, quote: u8, start: Mark) -> String {
        let triple = if self.peek() == Some(quote) {
            if self.peek_at(1) == Some(quote) {
                self.advance();
                self.advance();
                true
            } else {
                self.advance();
                return String::new();
            }
        } else {
            false
        };

        let mut buf: Vec<u8> = Vec::new();
        loop {
            match self.peek() {
                None => {
                    let span = self.span_from(start);
                    self.emit_error(
                        ErrorCode::UNTERMINATED_STRING,
                        "EOF while scanning string literal",
                        span,
                    );
                    break;
                }
                Some(b'\n') if !triple => {
                    let span = self.span_from(start);
                    self.emit_error(
                        ErrorCode::UNTERMINATED_STRING,
                        "EOL while scanning string literal",
                        span,
                    );
                    break;
                }
                Some(ch) if ch == quote => {
                    self.advance();
                    if !triple {
                        break;
                    }
                    if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                        self.advance();
                        self.advance();
                        break;
                    }
                    buf.push(ch);
                }
                Some(b'\\') => {
                    self.advance();
                    self.scan_escape(&mut buf);
                }
                Some(ch) => {
                    self.advance();
                    buf.push(ch);
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Unknown escapes are kept verbatim, backslash included.
    fn scan_escape(&mut self, buf: &mut Vec<u8>) {
        match self.advance() {
            Some(b'n') => buf.push(b'\n'),
            Some(b't') => buf.push(b'\t'),
            Some(b'r') => buf.push(b'\r'),
            Some(b'0') => buf.push(0),
            Some(b'\\') => buf.push(b'\\'),
            Some(b'\'') => buf.push(b'\''),
            Some(b'"') => buf.push(b'"'),
            Some(b'\n') => {}
            Some(other) => {
                buf.push(b'\\');
                buf.push(other);
            }
            None => {}
        }
    }
}
