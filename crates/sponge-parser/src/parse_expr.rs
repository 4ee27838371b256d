//! Expression parsing with operator precedence.
//!
//! Precedence (lowest → highest):
//! 1. `x if c else y`
//! 2. `or`
//! 3. `and`
//! 4. `not`
//! 5. comparisons, `in`, `not in` (chainable)
//! 6. `+`, `-`
//! 7. `*`, `/`, `//`, `%`
//! 8. unary `-`, `+`
//! 9. `**` (right-associative, binds tighter than a unary on its left)
//! 10. call, subscript, slice, attribute

use sponge_lexer::token::TokenKind;
use sponge_types::ast::*;
use sponge_types::ErrorCode;

use crate::parser::{Parser, MAX_EXPR_DEPTH};

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Point
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_expression(&mut self) -> Option<Expr> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPR_DEPTH {
            self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "expression is nested too deeply");
            self.expr_depth -= 1;
            return None;
        }
        let result = self.parse_ternary();
        self.expr_depth -= 1;
        result
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_ternary(&mut self) -> Option<Expr> {
        let body = self.parse_or()?;
        if !self.eat(&TokenKind::If) {
            return Some(body);
        }
        let test = self.parse_or()?;
        self.expect(&TokenKind::Else)?;
        let orelse = self.parse_expression()?;
        let span = body.span.merge(orelse.span);
        Some(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            span,
        ))
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = bool_op(BoolOp::Or, left, right);
        }
        Some(left)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_not()?;
            left = bool_op(BoolOp::And, left, right);
        }
        Some(left)
    }

    fn parse_not(&mut self) -> Option<Expr> {
        if !self.check_exact(&TokenKind::Not) {
            return self.parse_comparison();
        }
        let start = self.advance().span;
        let operand = self.parse_not()?;
        let span = start.merge(operand.span);
        Some(Expr::new(
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// `a < b <= c` keeps every operator; evaluation short-circuits.
    fn parse_comparison(&mut self) -> Option<Expr> {
        let left = self.parse_additive()?;
        let mut rest = Vec::new();
        while let Some(op) = self.match_comparison_op() {
            let right = self.parse_additive()?;
            rest.push((op, right));
        }
        if rest.is_empty() {
            return Some(left);
        }
        let span = match rest.last() {
            Some((_, last)) => left.span.merge(last.span),
            None => left.span,
        };
        Some(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                rest,
            },
            span,
        ))
    }

    /// Consume a comparison operator if one is next.
    fn match_comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek_kind() {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::BangEq => CmpOp::NotEq,
            TokenKind::Less => CmpOp::Less,
            TokenKind::Greater => CmpOp::Greater,
            TokenKind::LessEq => CmpOp::LessEq,
            TokenKind::GreaterEq => CmpOp::GreaterEq,
            TokenKind::In => CmpOp::In,
            TokenKind::Not if *self.look_ahead(1) == TokenKind::In => {
                self.advance();
                CmpOp::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Some(left)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Some(left)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        let start = self.advance().span;
        let operand = self.parse_unary()?;
        let span = start.merge(operand.span);
        Some(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// `postfix ['**' unary]`
    fn parse_power(&mut self) -> Option<Expr> {
        let base = self.parse_postfix()?;
        if !self.eat(&TokenKind::DoubleStar) {
            return Some(base);
        }
        let exponent = self.parse_unary()?;
        Some(binary(BinOp::Pow, base, exponent))
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_args()?;
                    self.expect(&TokenKind::RParen)?;
                    let span = expr.span.merge(self.previous_span());
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    expr = self.parse_subscript(expr)?;
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_identifier()?;
                    let span = expr.span.merge(attr.span);
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Some(expr)
    }

    /// Positional arguments first, then `name=value` keywords.
    fn parse_call_args(&mut self) -> Option<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        while !self.check_exact(&TokenKind::RParen) {
            let is_keyword = matches!(self.peek_kind(), TokenKind::Identifier(_))
                && *self.look_ahead(1) == TokenKind::Eq;
            if is_keyword {
                let name = self.expect_identifier()?;
                self.advance(); // `=`
                let value = self.parse_expression()?;
                keywords.push(Keyword { name, value });
            } else {
                let arg = self.parse_expression()?;
                if !keywords.is_empty() {
                    self.error_at(
                        ErrorCode::UNEXPECTED_TOKEN,
                        "positional argument follows keyword argument",
                        arg.span,
                    );
                    return None;
                }
                args.push(arg);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Some((args, keywords))
    }

    /// After `[`: either `index]` or `[lower]:[upper]]`.
    fn parse_subscript(&mut self, value: Expr) -> Option<Expr> {
        let lower = if self.check_exact(&TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };

        if !self.eat(&TokenKind::Colon) {
            self.expect(&TokenKind::RBracket)?;
            let span = value.span.merge(self.previous_span());
            let index = match lower {
                Some(index) => index,
                None => {
                    self.error_at(ErrorCode::UNEXPECTED_TOKEN, "invalid syntax", span);
                    return None;
                }
            };
            return Some(Expr::new(
                ExprKind::Index {
                    value: Box::new(value),
                    index,
                },
                span,
            ));
        }

        let upper = if self.check_exact(&TokenKind::RBracket) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.expect(&TokenKind::RBracket)?;
        let span = value.span.merge(self.previous_span());
        Some(Expr::new(
            ExprKind::Slice {
                value: Box::new(value),
                lower,
                upper,
            },
            span,
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_primary(&mut self) -> Option<Expr> {
        let token = self.peek().clone();
        let kind = match token.kind {
            TokenKind::Int(n) => ExprKind::Int(n),
            TokenKind::Float(n) => ExprKind::Float(n),
            TokenKind::Str(s) => {
                self.advance();
                // Adjacent literals concatenate: 'a' 'b' == 'ab'.
                let mut text = s;
                while let TokenKind::Str(next) = self.peek_kind() {
                    text.push_str(next);
                    self.advance();
                }
                let span = token.span.merge(self.previous_span());
                return Some(Expr::new(ExprKind::Str(text), span));
            }
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::None => ExprKind::None,
            TokenKind::Identifier(name) => ExprKind::Name(name),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                let span = token.span.merge(self.previous_span());
                return Some(Expr::new(inner.kind, span));
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check_exact(&TokenKind::RBracket) {
                    items.push(self.parse_expression()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                let span = token.span.merge(self.previous_span());
                return Some(Expr::new(ExprKind::List(items), span));
            }
            other => {
                let message = match other {
                    TokenKind::Newline | TokenKind::Eof => "invalid syntax".to_string(),
                    other => format!("invalid syntax near '{other}'"),
                };
                self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, message);
                return None;
            }
        };
        self.advance();
        Some(Expr::new(kind, token.span))
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn bool_op(op: BoolOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::BoolOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}
