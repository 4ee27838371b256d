//! Integration tests for the sponge parser.

use sponge_lexer::Lexer;
use sponge_parser::{parse_expression_source, parse_source, ParseResult, Parser};
use sponge_types::ast::*;
use sponge_types::{ErrorCode, SourceFile};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn parse(source: &str) -> ParseResult {
    let sf = SourceFile::new("main.py", source);
    let lex = Lexer::new(&sf).lex();
    Parser::new(lex.tokens, &sf).parse()
}

/// Parse source and return the program, panicking if there are errors.
fn parse_ok(source: &str) -> Program {
    let result = parse(source);
    if result.errors.has_errors() {
        for e in &result.errors.errors {
            eprintln!("  ERROR: {} ({})", e.message, e.code);
        }
        panic!("unexpected parse errors (see above)");
    }
    result.program.expect("no program returned")
}

fn error_codes(source: &str) -> Vec<ErrorCode> {
    parse(source).errors.errors.iter().map(|e| e.code).collect()
}

fn expr(source: &str) -> Expr {
    let sf = SourceFile::new("<expr>", source);
    match parse_expression_source(&sf) {
        Ok(expr) => expr,
        Err(errors) => panic!("expression failed to parse: {:?}", errors.first()),
    }
}

fn lines(body: &[Stmt]) -> Vec<u32> {
    body.iter().map(Stmt::line).collect()
}

// ─────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────

#[test]
fn assignment_and_print() {
    let program = parse_ok("name = input('Name? ')\nprint('Hello', name)\n");
    assert_eq!(program.body.len(), 2);
    assert!(matches!(program.body[0].kind, StmtKind::Assign { .. }));
    match &program.body[1].kind {
        StmtKind::Expr(Expr {
            kind: ExprKind::Call { args, .. },
            ..
        }) => assert_eq!(args.len(), 2),
        other => panic!("expected call, got {other:?}"),
    }
}

#[test]
fn statement_lines_follow_source() {
    let program = parse_ok("a = 1\n\n# comment\nb = 2\nif a:\n    c = 3\n");
    assert_eq!(lines(&program.body), vec![1, 4, 5]);
    assert_eq!(lines(&program.body[2].blocks()[0]), vec![6]);
}

#[test]
fn elif_nests_in_orelse() {
    let program = parse_ok("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
    let StmtKind::If { orelse, .. } = &program.body[0].kind else {
        panic!("expected if");
    };
    assert_eq!(orelse.len(), 1);
    assert_eq!(orelse[0].line(), 3);
    let StmtKind::If { orelse: inner, .. } = &orelse[0].kind else {
        panic!("expected nested if");
    };
    assert_eq!(lines(inner), vec![6]);
}

#[test]
fn for_loop_has_no_hook_until_instrumented() {
    let program = parse_ok("for i in range(3):\n    print(i)\n");
    match &program.body[0].kind {
        StmtKind::For { target, hook, body, .. } => {
            assert_eq!(target.name, "i");
            assert!(hook.is_none());
            assert_eq!(lines(body), vec![2]);
        }
        other => panic!("expected for, got {other:?}"),
    }
}

#[test]
fn one_line_suite() {
    let program = parse_ok("while x: x -= 1\nprint(x)\n");
    assert_eq!(program.body.len(), 2);
    assert_eq!(lines(&program.body[0].blocks()[0]), vec![1]);
}

#[test]
fn semicolons_split_statements() {
    let program = parse_ok("a = 1; b = 2; print(a + b)\n");
    assert_eq!(lines(&program.body), vec![1, 1, 1]);
}

#[test]
fn function_with_defaults_and_return() {
    let program = parse_ok("def greet(name, punct='!'):\n    return 'hi ' + name + punct\n");
    let StmtKind::FunctionDef(def) = &program.body[0].kind else {
        panic!("expected def");
    };
    assert_eq!(def.name.name, "greet");
    assert_eq!(def.params.len(), 2);
    assert!(def.params[0].default.is_none());
    assert!(def.params[1].default.is_some());
    assert!(matches!(def.body[0].kind, StmtKind::Return(Some(_))));
}

#[test]
fn try_except_else_finally() {
    let source = "\
try:
    x = int(s)
except ValueError as e:
    print(e)
except:
    pass
else:
    print(x)
finally:
    print('done')
";
    let program = parse_ok(source);
    let StmtKind::Try {
        handlers,
        orelse,
        finalbody,
        ..
    } = &program.body[0].kind
    else {
        panic!("expected try");
    };
    assert_eq!(handlers.len(), 2);
    assert_eq!(handlers[0].kind.as_ref().map(|k| k.name.as_str()), Some("ValueError"));
    assert_eq!(handlers[0].name.as_ref().map(|n| n.name.as_str()), Some("e"));
    assert!(handlers[1].kind.is_none());
    assert_eq!(lines(orelse), vec![8]);
    assert_eq!(lines(finalbody), vec![10]);
}

#[test]
fn global_and_import() {
    let program = parse_ok("import time, turtle\ndef f():\n    global count\n    count += 1\n");
    match &program.body[0].kind {
        StmtKind::Import(names) => assert_eq!(names.len(), 2),
        other => panic!("expected import, got {other:?}"),
    }
}

#[test]
fn subscript_assignment_and_augmented() {
    let program = parse_ok("xs[0] = 5\nxs[1] += 2\n");
    assert!(matches!(
        &program.body[0].kind,
        StmtKind::Assign {
            target: Expr {
                kind: ExprKind::Index { .. },
                ..
            },
            ..
        }
    ));
    assert!(matches!(
        program.body[1].kind,
        StmtKind::AugAssign { op: BinOp::Add, .. }
    ));
}

// ─────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn multiplication_binds_tighter_than_addition() {
    match expr("1 + 2 * 3").kind {
        ExprKind::Binary { op, right, .. } => {
            assert_eq!(op, BinOp::Add);
            assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn power_is_right_associative_and_beats_unary_minus() {
    match expr("-2 ** 2").kind {
        ExprKind::Unary { op, operand } => {
            assert_eq!(op, UnaryOp::Neg);
            assert!(matches!(operand.kind, ExprKind::Binary { op: BinOp::Pow, .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
    match expr("2 ** 3 ** 2").kind {
        ExprKind::Binary { left, right, .. } => {
            assert_eq!(left.kind, ExprKind::Int(2));
            assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Pow, .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn chained_comparison_and_not_in() {
    match expr("0 <= i < n").kind {
        ExprKind::Compare { rest, .. } => {
            let ops: Vec<CmpOp> = rest.iter().map(|(op, _)| *op).collect();
            assert_eq!(ops, vec![CmpOp::LessEq, CmpOp::Less]);
        }
        other => panic!("unexpected {other:?}"),
    }
    match expr("x not in xs").kind {
        ExprKind::Compare { rest, .. } => assert_eq!(rest[0].0, CmpOp::NotIn),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn not_binds_looser_than_comparison() {
    match expr("not a == b").kind {
        ExprKind::Unary { op, operand } => {
            assert_eq!(op, UnaryOp::Not);
            assert!(matches!(operand.kind, ExprKind::Compare { .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn boolean_operators_and_ternary() {
    match expr("a if x or y and z else b").kind {
        ExprKind::IfExp { test, .. } => match test.kind {
            ExprKind::BoolOp { op, right, .. } => {
                assert_eq!(op, BoolOp::Or);
                assert!(matches!(right.kind, ExprKind::BoolOp { op: BoolOp::And, .. }));
            }
            other => panic!("unexpected test {other:?}"),
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn calls_with_keywords_and_attributes() {
    match expr("print('a', 'b', sep='-', end='')").kind {
        ExprKind::Call { args, keywords, .. } => {
            assert_eq!(args.len(), 2);
            let names: Vec<&str> = keywords.iter().map(|k| k.name.name.as_str()).collect();
            assert_eq!(names, vec!["sep", "end"]);
        }
        other => panic!("unexpected {other:?}"),
    }
    match expr("turtle.forward(10)").kind {
        ExprKind::Call { func, .. } => match func.kind {
            ExprKind::Attribute { value, attr } => {
                assert_eq!(value.kind, ExprKind::Name("turtle".into()));
                assert_eq!(attr.name, "forward");
            }
            other => panic!("unexpected callee {other:?}"),
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn slices_and_indexes() {
    assert!(matches!(expr("s[1]").kind, ExprKind::Index { .. }));
    match expr("s[:3]").kind {
        ExprKind::Slice { lower, upper, .. } => {
            assert!(lower.is_none());
            assert!(upper.is_some());
        }
        other => panic!("unexpected {other:?}"),
    }
    match expr("s[2:]").kind {
        ExprKind::Slice { lower, upper, .. } => {
            assert!(lower.is_some());
            assert!(upper.is_none());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn list_literals_and_adjacent_strings() {
    match expr("[1, 2.5, 'x',]").kind {
        ExprKind::List(items) => assert_eq!(items.len(), 3),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(expr("'ab' 'cd'").kind, ExprKind::Str("abcd".into()));
}

#[test]
fn expression_source_rejects_trailing_tokens() {
    let sf = SourceFile::new("<expr>", "1 + 2 3");
    assert!(parse_expression_source(&sf).is_err());
}

// ─────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn missing_indent_is_an_indentation_error() {
    assert_eq!(error_codes("if x:\nprint(x)\n"), vec![ErrorCode::EXPECTED_INDENT]);
}

#[test]
fn unexpected_indent_at_top_level() {
    let codes = error_codes("x = 1\n    y = 2\n");
    assert_eq!(codes, vec![ErrorCode::UNEXPECTED_INDENT]);
}

#[test]
fn break_outside_loop() {
    assert_eq!(error_codes("break\n"), vec![ErrorCode::OUTSIDE_LOOP]);
    assert!(error_codes("while True:\n    break\n").is_empty());
    assert_eq!(
        error_codes("while True:\n    def f():\n        break\n"),
        vec![ErrorCode::OUTSIDE_LOOP]
    );
}

#[test]
fn return_outside_function() {
    assert_eq!(error_codes("return 1\n"), vec![ErrorCode::OUTSIDE_FUNCTION]);
}

#[test]
fn cannot_assign_to_call() {
    assert_eq!(error_codes("f() = 1\n"), vec![ErrorCode::INVALID_ASSIGN_TARGET]);
}

#[test]
fn tuple_loop_target_is_rejected() {
    assert_eq!(
        error_codes("for a, b in pairs:\n    pass\n"),
        vec![ErrorCode::INVALID_ASSIGN_TARGET]
    );
}

#[test]
fn parser_recovers_and_reports_several_lines() {
    let result = parse("x = = 1\ny = 2\nz = (\n");
    assert!(result.program.is_none());
    assert!(result.errors.total_errors >= 1);
    let first = result.errors.first().map(|e| e.span.start_line);
    assert_eq!(first, Some(1));
}

#[test]
fn errors_carry_source_line_for_traceback() {
    let sf = SourceFile::new("main.py", "print('a'\n");
    let errors = parse_source(&sf).unwrap_err();
    let text = errors.first().map(|e| e.to_traceback()).unwrap_or_default();
    assert!(text.contains("line 1"));
    assert!(text.contains("SyntaxError"));
}

#[test]
fn deeply_nested_expression_is_rejected() {
    let source = format!("x = {}1{}\n", "(".repeat(150), ")".repeat(150));
    let result = parse(&source);
    assert!(result.errors.has_errors());
}

#[test]
fn parsing_is_deterministic() {
    let source = "def f(n):\n    if n < 2:\n        return n\n    return f(n - 1) + f(n - 2)\nprint(f(10))\n";
    let first = parse_ok(source);
    for i in 0..100 {
        assert_eq!(first, parse_ok(source), "Determinism failure at iteration {i}");
    }
}
