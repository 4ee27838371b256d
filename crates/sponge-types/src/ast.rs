//! AST node types for sponge scripts.
//!
//! Every statement and expression carries a [`Span`]. Compound statements
//! expose their nested statement lists through [`Stmt::blocks`] and
//! [`Stmt::blocks_mut`] so tree rewrites can reach every nesting level
//! without matching on each construct themselves.
//!
//! Hook nodes ([`StmtKind::Hook`], [`ExprKind::Hook`]) never come out of the
//! parser; the instrumentation pass inserts them.

use crate::Span;

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A parsed script: the module-level statement list.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// An instrumentation callback site.
///
/// `secondary` marks the copy woven into a loop or conditional test, which
/// the session collapses with the primary hook on the same line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookPoint {
    pub line: u32,
    pub secondary: bool,
}

impl HookPoint {
    pub fn primary(line: u32) -> Self {
        Self {
            line,
            secondary: false,
        }
    }

    pub fn secondary(line: u32) -> Self {
        Self {
            line,
            secondary: true,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// A bare expression; its value is discarded.
    Expr(Expr),
    /// `target = value`, target is a name or a subscript.
    Assign { target: Expr, value: Expr },
    /// `target += value` and friends.
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    /// `if test: body [elif ...] [else: orelse]`. An `elif` is a nested
    /// `If` as the only statement of `orelse`.
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While { test: Expr, body: Vec<Stmt> },
    /// `for target in iter: body`. `hook` fires before every fetch of the
    /// next element once the statement is instrumented.
    For {
        target: Ident,
        iter: Expr,
        body: Vec<Stmt>,
        hook: Option<HookPoint>,
    },
    FunctionDef(FunctionDef),
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,
    Global(Vec<Ident>),
    Import(Vec<Ident>),
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    /// `raise [expr]`; bare `raise` re-raises the exception being handled.
    Raise(Option<Expr>),
    Hook(HookPoint),
}

/// `def name(params): body`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

/// A parameter with an optional default value.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub default: Option<Expr>,
}

/// `except [Kind [as name]]: body`
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub kind: Option<Ident>,
    pub name: Option<Ident>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// A primary hook statement for `line`.
    pub fn hook(line: u32, span: Span) -> Self {
        Self::new(StmtKind::Hook(HookPoint::primary(line)), span)
    }

    pub fn line(&self) -> u32 {
        self.span.start_line
    }

    pub fn is_hook(&self) -> bool {
        matches!(self.kind, StmtKind::Hook(_))
    }

    /// Nested statement lists, in source order.
    pub fn blocks(&self) -> Vec<&Vec<Stmt>> {
        match &self.kind {
            StmtKind::If { body, orelse, .. } => vec![body, orelse],
            StmtKind::While { body, .. } | StmtKind::For { body, .. } => vec![body],
            StmtKind::FunctionDef(def) => vec![&def.body],
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                let mut blocks = vec![body];
                blocks.extend(handlers.iter().map(|h| &h.body));
                blocks.push(orelse);
                blocks.push(finalbody);
                blocks
            }
            _ => Vec::new(),
        }
    }

    /// Mutable counterpart of [`Stmt::blocks`].
    pub fn blocks_mut(&mut self) -> Vec<&mut Vec<Stmt>> {
        match &mut self.kind {
            StmtKind::If { body, orelse, .. } => vec![body, orelse],
            StmtKind::While { body, .. } | StmtKind::For { body, .. } => vec![body],
            StmtKind::FunctionDef(def) => vec![&mut def.body],
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                let mut blocks = vec![body];
                blocks.extend(handlers.iter_mut().map(|h| &mut h.body));
                blocks.push(orelse);
                blocks.push(finalbody);
                blocks
            }
            _ => Vec::new(),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // ── Literals ──
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    /// `[a, b, c]`
    List(Vec<Expr>),

    // ── Names & Access ──
    Name(String),
    /// `value.attr`
    Attribute { value: Box<Expr>, attr: Ident },
    /// `func(args, key=value)`
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    /// `value[index]`
    Index { value: Box<Expr>, index: Box<Expr> },
    /// `value[lower:upper]`
    Slice {
        value: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
    },

    // ── Operators ──
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Short-circuit `and` / `or`, yielding an operand value.
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a < b <= c`: chained comparisons.
    Compare {
        left: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    /// `body if test else orelse`
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },

    /// Instrumentation callback; evaluates to `True`.
    Hook(HookPoint),
}

/// `name=value` in a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: Ident,
    pub value: Expr,
}

// ── Operators ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    In,
    NotIn,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Less => "<",
            CmpOp::Greater => ">",
            CmpOp::LessEq => "<=",
            CmpOp::GreaterEq => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }
}
