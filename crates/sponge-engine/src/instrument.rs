//! Breakpoint instrumentation.
//!
//! Two passes over the AST. The first inserts a primary hook before every
//! statement at every nesting level (at most one per source line) and weaves
//! secondary hooks into `if`/`elif`/`while` tests and `for` fetches. The
//! second collects the hooked lines and builds the [`BreakpointMap`] in a
//! single backward sweep.

use sponge_types::ast::*;
use sponge_types::Span;
use std::collections::BTreeSet;

/// An instrumented program with its line map.
#[derive(Debug, Clone)]
pub struct Instrumented {
    pub program: Program,
    pub line_map: BreakpointMap,
}

pub fn instrument(mut program: Program) -> Instrumented {
    let mut hooked = BTreeSet::new();
    instrument_block(&mut program.body, &mut hooked);

    let mut lines = BTreeSet::new();
    collect_hooks(&program.body, &mut lines);
    let line_map = BreakpointMap::from_hooked_lines(&lines);
    Instrumented { program, line_map }
}

fn instrument_block(block: &mut Vec<Stmt>, hooked: &mut BTreeSet<u32>) {
    let original = std::mem::take(block);
    block.reserve(original.len() * 2);
    for mut stmt in original {
        let line = stmt.line();
        if hooked.insert(line) {
            block.push(Stmt::hook(line, Span::point(line, stmt.span.start_col)));
        }
        weave_secondary(&mut stmt);
        for nested in stmt.blocks_mut() {
            instrument_block(nested, hooked);
        }
        block.push(stmt);
    }
}

fn weave_secondary(stmt: &mut Stmt) {
    let point = HookPoint::secondary(stmt.line());
    match &mut stmt.kind {
        StmtKind::If { test, .. } | StmtKind::While { test, .. } => {
            let span = test.span;
            let original = std::mem::replace(test, Expr::new(ExprKind::None, span));
            *test = Expr::new(
                ExprKind::BoolOp {
                    op: BoolOp::And,
                    left: Box::new(Expr::new(ExprKind::Hook(point), span)),
                    right: Box::new(original),
                },
                span,
            );
        }
        StmtKind::For { hook, .. } => *hook = Some(point),
        _ => {}
    }
}

fn collect_hooks(block: &[Stmt], lines: &mut BTreeSet<u32>) {
    for stmt in block {
        if let StmtKind::Hook(point) = &stmt.kind {
            lines.insert(point.line);
        }
        for nested in stmt.blocks() {
            collect_hooks(nested, lines);
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Breakpoint Map
// ══════════════════════════════════════════════════════════════════════════════

/// Resolves any line to the nearest hooked line at or after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointMap {
    /// `nearest[l]` is the first hooked line `>= l`, for `l` in
    /// `0..=last_line`.
    nearest: Vec<u32>,
    hooked: BTreeSet<u32>,
}

impl BreakpointMap {
    pub fn from_hooked_lines(hooked: &BTreeSet<u32>) -> Self {
        let Some(&last) = hooked.last() else {
            return Self::default();
        };
        let mut nearest = vec![last; last as usize + 1];
        let mut next = last;
        for line in (0..=last).rev() {
            if hooked.contains(&line) {
                next = line;
            }
            nearest[line as usize] = next;
        }
        Self {
            nearest,
            hooked: hooked.clone(),
        }
    }

    /// The hooked line a breakpoint on `line` takes effect at. Lines past
    /// the end resolve to the last hooked line; an empty map resolves
    /// nothing.
    pub fn resolve(&self, line: u32) -> Option<u32> {
        let last = *self.nearest.last()?;
        Some(
            self.nearest
                .get(line as usize)
                .copied()
                .unwrap_or(last),
        )
    }

    pub fn normalize<I>(&self, lines: I) -> BTreeSet<u32>
    where
        I: IntoIterator<Item = u32>,
    {
        lines.into_iter().filter_map(|l| self.resolve(l)).collect()
    }

    pub fn hooked_lines(&self) -> &BTreeSet<u32> {
        &self.hooked
    }

    pub fn last_line(&self) -> Option<u32> {
        self.hooked.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.hooked.is_empty()
    }
}
