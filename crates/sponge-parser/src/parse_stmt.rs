//! Statement parsing.

use crate::parser::Parser;
use sponge_lexer::token::TokenKind;
use sponge_types::ast::*;
use sponge_types::{ErrorCode, Span};

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Program & Blocks
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_program(&mut self) -> Program {
        let start = self.current_span();
        let mut body = Vec::new();
        self.skip_newlines();
        while !self.at_end() && !self.too_many_errors() {
            match self.peek_kind() {
                TokenKind::Indent => {
                    self.error_at_current(ErrorCode::UNEXPECTED_INDENT, "unexpected indent");
                    self.skip_indented_block();
                }
                // Left over from recovery inside a block.
                TokenKind::Dedent => {
                    self.advance();
                }
                _ => self.parse_statement_into(&mut body),
            }
            self.skip_newlines();
        }
        let span = start.merge(self.previous_span());
        Program { body, span }
    }

    /// Parse one logical line (or one compound statement) into `out`.
    pub(crate) fn parse_statement_into(&mut self, out: &mut Vec<Stmt>) {
        let parsed = match self.peek_kind() {
            TokenKind::If => self.parse_if().map(|s| out.push(s)),
            TokenKind::While => self.parse_while().map(|s| out.push(s)),
            TokenKind::For => self.parse_for().map(|s| out.push(s)),
            TokenKind::Def => self.parse_def().map(|s| out.push(s)),
            TokenKind::Try => self.parse_try().map(|s| out.push(s)),
            _ => self.parse_simple_line(out),
        };
        if parsed.is_none() {
            self.synchronize();
        }
    }

    /// `simple (';' simple)* [';'] NEWLINE`
    fn parse_simple_line(&mut self, out: &mut Vec<Stmt>) -> Option<()> {
        loop {
            let stmt = self.parse_simple_stmt()?;
            out.push(stmt);
            if !self.eat(&TokenKind::Semicolon) {
                break;
            }
            if self.check_exact(&TokenKind::Newline) || self.at_end() {
                break;
            }
        }
        self.expect_newline()
    }

    /// `':' (simple_line | NEWLINE INDENT stmt+ DEDENT)`
    pub(crate) fn parse_suite(&mut self) -> Option<Vec<Stmt>> {
        self.expect(&TokenKind::Colon)?;
        let mut body = Vec::new();
        if !self.eat(&TokenKind::Newline) {
            self.parse_simple_line(&mut body)?;
            return Some(body);
        }
        self.skip_newlines();
        if !self.eat(&TokenKind::Indent) {
            self.error_at_current(ErrorCode::EXPECTED_INDENT, "expected an indented block");
            return None;
        }
        while !self.check_exact(&TokenKind::Dedent) && !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            if self.check_exact(&TokenKind::Indent) {
                self.error_at_current(ErrorCode::UNEXPECTED_INDENT, "unexpected indent");
                self.skip_indented_block();
                continue;
            }
            self.parse_statement_into(&mut body);
            self.skip_newlines();
        }
        self.eat(&TokenKind::Dedent);
        Some(body)
    }

    fn finish(&self, kind: StmtKind, start: Span) -> Stmt {
        Stmt::new(kind, start.merge(self.previous_span()))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Compound Statements
    // ══════════════════════════════════════════════════════════════════════════

    /// `if` / `elif` chain. Each `elif` becomes a nested `If` in `orelse`.
    fn parse_if(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // `if` or `elif`
        let test = self.parse_expression()?;
        let body = self.parse_suite()?;
        let orelse = match self.peek_kind() {
            TokenKind::Elif => vec![self.parse_if()?],
            TokenKind::Else => {
                self.advance();
                self.parse_suite()?
            }
            _ => Vec::new(),
        };
        Some(self.finish(StmtKind::If { test, body, orelse }, start))
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let test = self.parse_expression()?;
        let body = self.parse_loop_body()?;
        Some(self.finish(StmtKind::While { test, body }, start))
    }

    /// `for name in iter: body`
    fn parse_for(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let target = self.expect_identifier()?;
        if self.check_exact(&TokenKind::Comma) {
            self.error_at_current(
                ErrorCode::INVALID_ASSIGN_TARGET,
                "only a single name can be used as a loop variable",
            );
            return None;
        }
        self.expect(&TokenKind::In)?;
        let iter = self.parse_expression()?;
        let body = self.parse_loop_body()?;
        Some(self.finish(
            StmtKind::For {
                target,
                iter,
                body,
                hook: None,
            },
            start,
        ))
    }

    fn parse_loop_body(&mut self) -> Option<Vec<Stmt>> {
        self.loop_depth += 1;
        let body = self.parse_suite();
        self.loop_depth -= 1;
        body
    }

    /// `def name(a, b=1): body`
    fn parse_def(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LParen)?;
        let mut params: Vec<Param> = Vec::new();
        while !self.check_exact(&TokenKind::RParen) {
            let param_name = self.expect_identifier()?;
            let default = if self.eat(&TokenKind::Eq) {
                Some(self.parse_expression()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    self.error_at(
                        ErrorCode::UNEXPECTED_TOKEN,
                        "non-default argument follows default argument",
                        param_name.span,
                    );
                    return None;
                }
                None
            };
            params.push(Param {
                name: param_name,
                default,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_suite();
        self.function_depth -= 1;
        self.loop_depth = saved_loops;

        let def = FunctionDef {
            name,
            params,
            body: body?,
        };
        Some(self.finish(StmtKind::FunctionDef(def), start))
    }

    /// `try: ... except [Kind [as name]]: ... [else: ...] [finally: ...]`
    fn parse_try(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let body = self.parse_suite()?;

        let mut handlers = Vec::new();
        while self.check_exact(&TokenKind::Except) {
            let handler_start = self.advance().span;
            let (kind, name) = if self.check_exact(&TokenKind::Colon) {
                (None, None)
            } else {
                let kind = self.expect_identifier()?;
                let name = if self.eat(&TokenKind::As) {
                    Some(self.expect_identifier()?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            let handler_body = self.parse_suite()?;
            handlers.push(ExceptHandler {
                kind,
                name,
                body: handler_body,
                span: handler_start,
            });
        }

        let orelse = if !handlers.is_empty() && self.eat(&TokenKind::Else) {
            self.parse_suite()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat(&TokenKind::Finally) {
            self.parse_suite()?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && finalbody.is_empty() {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                "expected 'except' or 'finally' block",
            );
            return None;
        }

        Some(self.finish(
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            start,
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Simple Statements
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_simple_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        let kind = match self.peek_kind() {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break | TokenKind::Continue => {
                let token = self.advance();
                if self.loop_depth == 0 {
                    self.error_at(
                        ErrorCode::OUTSIDE_LOOP,
                        format!("'{}' outside loop", token.kind),
                        token.span,
                    );
                    return None;
                }
                if token.kind == TokenKind::Break {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                }
            }
            TokenKind::Return => {
                self.advance();
                if self.function_depth == 0 {
                    self.error_at(ErrorCode::OUTSIDE_FUNCTION, "'return' outside function", start);
                    return None;
                }
                let value = if self.ends_statement() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                StmtKind::Return(value)
            }
            TokenKind::Raise => {
                self.advance();
                let value = if self.ends_statement() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                StmtKind::Raise(value)
            }
            TokenKind::Global => {
                self.advance();
                StmtKind::Global(self.parse_name_list()?)
            }
            TokenKind::Import => {
                self.advance();
                StmtKind::Import(self.parse_name_list()?)
            }
            _ => return self.parse_expression_statement(),
        };
        Some(self.finish(kind, start))
    }

    fn ends_statement(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
        )
    }

    fn parse_name_list(&mut self) -> Option<Vec<Ident>> {
        let mut names = vec![self.expect_identifier()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_identifier()?);
        }
        Some(names)
    }

    /// Expression statement, assignment or augmented assignment.
    fn parse_expression_statement(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        let expr = self.parse_expression()?;

        let op = match self.peek_kind() {
            TokenKind::Eq => None,
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            _ => return Some(self.finish(StmtKind::Expr(expr), start)),
        };

        if !matches!(expr.kind, ExprKind::Name(_) | ExprKind::Index { .. }) {
            self.error_at(
                ErrorCode::INVALID_ASSIGN_TARGET,
                "cannot assign to expression",
                expr.span,
            );
            return None;
        }
        self.advance(); // assignment operator
        let value = self.parse_expression()?;
        if self.peek_kind().is_assignment() {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                "chained assignment is not supported",
            );
            return None;
        }

        let kind = match op {
            None => StmtKind::Assign {
                target: expr,
                value,
            },
            Some(op) => StmtKind::AugAssign {
                target: expr,
                op,
                value,
            },
        };
        Some(self.finish(kind, start))
    }
}
