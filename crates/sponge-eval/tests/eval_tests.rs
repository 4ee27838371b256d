//! Evaluator tests: console I/O, arithmetic, functions, scoping, exceptions,
//! session files, drawing modules, host signals, and determinism.

use sponge_eval::{
    on_script_stack, Environment, EvalError, EvalResult, Evaluator, Host, Value, MAX_CALL_DEPTH,
};
use sponge_parser::parse_source;
use sponge_types::ast::{HookPoint, Program};
use sponge_types::draw::{Color, DrawCommand};
use sponge_types::SourceFile;
use std::collections::{BTreeMap, VecDeque};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct RecordingHost {
    output: String,
    inputs: VecDeque<String>,
    prompts: Vec<String>,
    draws: Vec<DrawCommand>,
    presents: usize,
    sleeps: Vec<f64>,
    shell: Vec<String>,
    hooks: Vec<HookPoint>,
    /// Report an interrupt once this many hooks have fired.
    interrupt_after: Option<usize>,
    held_keys: Vec<u8>,
}

impl Host for RecordingHost {
    fn write(&mut self, text: &str) -> EvalResult<()> {
        self.output.push_str(text);
        Ok(())
    }

    fn read_line(&mut self, prompt: &str) -> EvalResult<String> {
        self.prompts.push(prompt.to_string());
        self.inputs.pop_front().ok_or(EvalError::InsufficientInput)
    }

    fn sleep(&mut self, seconds: f64) -> EvalResult<()> {
        self.sleeps.push(seconds);
        Ok(())
    }

    fn shell(&mut self, command: &str) -> EvalResult<i64> {
        self.shell.push(command.to_string());
        Ok(0)
    }

    fn draw(&mut self, command: DrawCommand) -> EvalResult<()> {
        self.draws.push(command);
        Ok(())
    }

    fn present(&mut self) -> EvalResult<()> {
        self.presents += 1;
        Ok(())
    }

    fn hook(&mut self, point: HookPoint, _env: &Environment) -> EvalResult<()> {
        self.hooks.push(point);
        Ok(())
    }

    fn interrupted(&self) -> bool {
        self.interrupt_after
            .is_some_and(|limit| self.hooks.len() >= limit)
    }

    fn key_down(&self, code: u8) -> bool {
        self.held_keys.contains(&code)
    }
}

fn parse(source: &str) -> Program {
    let sf = SourceFile::new("main.py", source);
    match parse_source(&sf) {
        Ok(program) => program,
        Err(errors) => panic!(
            "parse errors:\n{}",
            errors
                .errors
                .iter()
                .map(|e| format!("  [{}] {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("\n")
        ),
    }
}

fn run_with(source: &str, inputs: &[&str]) -> (Evaluator<RecordingHost>, EvalResult<()>) {
    let program = parse(source);
    let host = RecordingHost {
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    };
    let mut eval = Evaluator::new(host);
    let result = eval.run(&program);
    (eval, result)
}

/// Run and return console output, panicking on any error.
fn output(source: &str) -> String {
    let (eval, result) = run_with(source, &[]);
    if let Err(e) = result {
        panic!("unexpected error: {e}\noutput so far:\n{}", eval.host().output);
    }
    eval.into_host().output
}

/// Run and return the error, panicking on success.
fn error(source: &str) -> EvalError {
    match run_with(source, &[]) {
        (_, Err(e)) => e,
        (eval, Ok(())) => panic!("expected error, got output:\n{}", eval.host().output),
    }
}

fn global(eval: &Evaluator<RecordingHost>, name: &str) -> Value {
    eval.env()
        .lookup(name)
        .cloned()
        .unwrap_or_else(|| panic!("no variable '{name}'"))
}

// ══════════════════════════════════════════════════════════════════════════════
// Console I/O
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_hello_with_input() {
    let (eval, result) = run_with(
        "name = input('Name? ')\nprint('Hello, ' + name + '!')\n",
        &["Bob"],
    );
    result.unwrap();
    let host = eval.into_host();
    assert_eq!(host.prompts, vec!["Name? "]);
    assert_eq!(host.output, "Hello, Bob!\n");
}

#[test]
fn test_input_exhausted_is_terminal() {
    let source = "try:\n    x = input()\nexcept Exception:\n    print('caught')\nfinally:\n    print('finally')\n";
    let (eval, result) = run_with(source, &[]);
    assert!(matches!(result, Err(EvalError::InsufficientInput)));
    assert_eq!(eval.host().output, "");
}

#[test]
fn test_print_sep_and_end() {
    assert_eq!(output("print(1, 2, 3, sep='-', end='!')\n"), "1-2-3!");
    assert_eq!(output("print()\n"), "\n");
    assert_eq!(output("print('a', None, True)\n"), "a None True\n");
}

#[test]
fn test_print_formats_like_python() {
    let out = output("print(7 / 2)\nprint(4 / 2)\nprint([1, 'a', 2.5])\nprint(str(10) + '%')\n");
    assert_eq!(out, "3.5\n2.0\n[1, 'a', 2.5]\n10%\n");
}

// ══════════════════════════════════════════════════════════════════════════════
// Arithmetic & Operators
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_integer_arithmetic() {
    let out = output("print(7 // 2, -7 // 2, 7 % 3, -7 % 3, 2 ** 10)\n");
    assert_eq!(out, "3 -4 1 2 1024\n");
}

#[test]
fn test_zero_division_reports_line() {
    let err = error("x = 1\ny = x / 0\n");
    assert_eq!(err.kind(), Some("ZeroDivisionError"));
    assert_eq!(err.line(), Some(2));
    assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
}

#[test]
fn test_huge_repetition_is_a_memory_error() {
    let err = error("s = 'abc' * 9000000000000000000\n");
    assert_eq!(err.kind(), Some("MemoryError"));
    let err = error("xs = [1, 2, 3] * 9000000000000000000\n");
    assert_eq!(err.kind(), Some("MemoryError"));
    let source = "try:\n    s = 'abc' * 9000000000000000000\nexcept MemoryError:\n    print('too big')\n";
    assert_eq!(output(source), "too big\n");
}

#[test]
fn test_string_concat_type_error() {
    let err = error("print('n=' + 3)\n");
    assert_eq!(err.kind(), Some("TypeError"));
    assert!(err.to_string().contains("can only concatenate str"));
}

#[test]
fn test_chained_comparison_and_membership() {
    let out = output("x = 5\nprint(1 < x <= 5, 3 in [1, 2, 3], 'z' not in 'abc')\n");
    assert_eq!(out, "True True True\n");
}

#[test]
fn test_boolean_operators_yield_operands() {
    assert_eq!(output("print(0 or 'x', 1 and 2, None or 0)\n"), "x 2 0\n");
}

#[test]
fn test_conditional_expression() {
    assert_eq!(output("n = 3\nprint('odd' if n % 2 else 'even')\n"), "odd\n");
}

// ══════════════════════════════════════════════════════════════════════════════
// Control Flow
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_for_over_range_and_break() {
    let out = output("for i in range(10):\n    if i == 3:\n        break\n    print(i)\n");
    assert_eq!(out, "0\n1\n2\n");
}

#[test]
fn test_for_over_huge_range_is_lazy() {
    let source = "for i in range(10000000000):\n    if i == 3:\n        break\nprint(i)\n";
    assert_eq!(output(source), "3\n");
    let source = "total = 0\nfor i in range(10, 0, -3):\n    total += i\nprint(total)\n";
    assert_eq!(output(source), "22\n");
}

#[test]
fn test_huge_range_as_value_is_a_memory_error() {
    let err = error("xs = range(10000000000)\n");
    assert_eq!(err.kind(), Some("MemoryError"));
}

#[test]
fn test_rebound_range_is_called_normally() {
    let source = "def range(n):\n    return [7]\nfor i in range(10000000000):\n    print(i)\n";
    assert_eq!(output(source), "7\n");
}

#[test]
fn test_range_argument_errors_in_for() {
    let err = error("for i in range(1, 2, 0):\n    pass\n");
    assert_eq!(err.to_string(), "ValueError: range() arg 3 must not be zero");
    let err = error("for i in range():\n    pass\n");
    assert_eq!(err.kind(), Some("TypeError"));
}

#[test]
fn test_while_with_continue() {
    let source = "i = 0\ntotal = 0\nwhile i < 5:\n    i += 1\n    if i == 2:\n        continue\n    total += i\nprint(total)\n";
    assert_eq!(output(source), "13\n");
}

#[test]
fn test_for_sees_appends_during_iteration() {
    let source = "xs = [1]\nfor x in xs:\n    if x < 3:\n        xs.append(x + 1)\nprint(xs)\n";
    assert_eq!(output(source), "[1, 2, 3]\n");
}

#[test]
fn test_for_over_string() {
    assert_eq!(output("for c in 'ab':\n    print(c)\n"), "a\nb\n");
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions & Scope
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_function_defaults_and_keywords() {
    let source = "def greet(name, greeting='Hi'):\n    return greeting + ' ' + name\nprint(greet('Ann'))\nprint(greet('Bo', greeting='Yo'))\n";
    assert_eq!(output(source), "Hi Ann\nYo Bo\n");
}

#[test]
fn test_recursion() {
    let source = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\nprint(fact(10))\n";
    assert_eq!(output(source), "3628800\n");
}

#[test]
fn test_recursion_limit_is_a_script_error() {
    let source = "def f(n):\n    return 1 + f(n + 1)\nf(0)\n";
    let (message, catchable) = on_script_stack(|| {
        let err = error(source);
        (err.to_string(), err.is_catchable())
    })
    .unwrap();
    assert_eq!(message, "RecursionError: maximum recursion depth exceeded");
    assert!(catchable);
}

#[test]
fn test_recursion_just_under_limit() {
    let depth = MAX_CALL_DEPTH - 1;
    let source = format!(
        "def f(n):\n    if n == 0:\n        return 0\n    return 1 + f(n - 1)\nprint(f({depth}))\n"
    );
    let printed = on_script_stack(|| output(&source)).unwrap();
    assert_eq!(printed, format!("{depth}\n"));
}

#[test]
fn test_missing_argument_message() {
    let err = error("def f(a, b):\n    pass\nf(1)\n");
    assert_eq!(
        err.to_string(),
        "TypeError: f() missing 1 required positional argument: 'b'"
    );
}

#[test]
fn test_global_declaration() {
    let source = "count = 0\ndef bump():\n    global count\n    count += 1\nbump()\nbump()\nprint(count)\n";
    assert_eq!(output(source), "2\n");
}

#[test]
fn test_locals_do_not_leak() {
    let (eval, result) = run_with("def f():\n    y = 1\n    return y\nx = f()\n", &[]);
    result.unwrap();
    assert_eq!(global(&eval, "x"), Value::Int(1));
    assert!(eval.env().lookup("y").is_none());
}

#[test]
fn test_undefined_name() {
    let err = error("print(missing)\n");
    assert_eq!(err.to_string(), "NameError: name 'missing' is not defined");
}

// ══════════════════════════════════════════════════════════════════════════════
// Exceptions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_try_except_else_finally() {
    let source = "try:\n    x = int('12')\nexcept ValueError:\n    print('bad')\nelse:\n    print('ok', x)\nfinally:\n    print('done')\n";
    assert_eq!(output(source), "ok 12\ndone\n");
}

#[test]
fn test_except_binds_exception() {
    let source = "try:\n    int('abc')\nexcept ValueError as e:\n    print('error:', e)\n";
    assert_eq!(
        output(source),
        "error: invalid literal for int() with base 10: 'abc'\n"
    );
}

#[test]
fn test_handler_family_matching() {
    let source = "try:\n    [1][5]\nexcept LookupError:\n    print('lookup')\n";
    assert_eq!(output(source), "lookup\n");
}

#[test]
fn test_raise_and_reraise() {
    let source = "try:\n    try:\n        raise ValueError('inner')\n    except ValueError:\n        raise\nexcept Exception as e:\n    print(e)\n";
    assert_eq!(output(source), "inner\n");
    let err = error("raise 5\n");
    assert_eq!(err.kind(), Some("TypeError"));
}

#[test]
fn test_unhandled_traceback() {
    let err = error("x = 1\nraise RuntimeError('boom')\n");
    assert_eq!(
        err.to_traceback("main.py"),
        "Traceback (most recent call last):\n  File \"main.py\", line 2, in <module>\nRuntimeError: boom\n"
    );
}

#[test]
fn test_import_unknown_module() {
    let err = error("import numpy\n");
    assert_eq!(err.to_string(), "ModuleNotFoundError: No module named 'numpy'");
}

// ══════════════════════════════════════════════════════════════════════════════
// Session Files
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_read_seeded_file() {
    let program = parse("f = open('data.txt')\nfor line in f:\n    print(line.strip())\nf.close()\n");
    let mut files = BTreeMap::new();
    files.insert("data.txt".to_string(), "a\nb\n".to_string());
    let mut eval = Evaluator::new(RecordingHost::default()).with_files(files);
    eval.run(&program).unwrap();
    assert_eq!(eval.host().output, "a\nb\n");
    assert!(eval.changed_files().is_empty());
}

#[test]
fn test_write_marks_file_changed() {
    let (eval, result) = run_with(
        "f = open('out.txt', 'w')\nf.write('x=')\nf.write(str(3))\nf.close()\n",
        &[],
    );
    result.unwrap();
    let changed = eval.changed_files();
    assert_eq!(changed.get("out.txt").map(String::as_str), Some("x=3"));
}

#[test]
fn test_missing_file() {
    let err = error("open('nope.txt')\n");
    assert_eq!(err.kind(), Some("FileNotFoundError"));
}

#[test]
fn test_closed_file_rejects_reads() {
    let program = parse("f = open('a.txt')\nf.close()\nf.read()\n");
    let mut files = BTreeMap::new();
    files.insert("a.txt".to_string(), "hi".to_string());
    let mut eval = Evaluator::new(RecordingHost::default()).with_files(files);
    let err = eval.run(&program).unwrap_err();
    assert_eq!(err.to_string(), "ValueError: I/O operation on closed file.");
}

// ══════════════════════════════════════════════════════════════════════════════
// Modules
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_turtle_commands_reach_host() {
    let (eval, result) = run_with(
        "import turtle\nturtle.forward(50)\nturtle.left(90)\nturtle.pencolor('red')\n",
        &[],
    );
    result.unwrap();
    assert_eq!(
        eval.host().draws,
        vec![
            DrawCommand::Forward { value: 50.0 },
            DrawCommand::Left { value: 90.0 },
            DrawCommand::PenColor {
                value: Color::Named("red".into())
            },
        ]
    );
}

#[test]
fn test_canvas_present() {
    let (eval, result) = run_with(
        "import canvas\ncanvas.fill_rect(0, 0, 10, 20)\ncanvas.present()\n",
        &[],
    );
    result.unwrap();
    let host = eval.into_host();
    assert_eq!(host.presents, 1);
    assert_eq!(
        host.draws,
        vec![DrawCommand::FillRect {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 20.0
        }]
    );
}

#[test]
fn test_canvas_check_key_reads_host() {
    let program = parse(
        "import canvas\nprint(canvas.check_key(39), canvas.check_key(37), canvas.check_key(300))\n",
    );
    let host = RecordingHost {
        held_keys: vec![39],
        ..Default::default()
    };
    let mut eval = Evaluator::new(host);
    eval.run(&program).unwrap();
    assert_eq!(eval.host().output, "True False False\n");
    assert!(eval.host().draws.is_empty());
}

#[test]
fn test_time_and_os_go_through_host() {
    let (eval, result) = run_with(
        "import time\nimport os\ntime.sleep(0.5)\nstatus = os.system('ls')\n",
        &[],
    );
    result.unwrap();
    assert_eq!(global(&eval, "status"), Value::Int(0));
    let host = eval.into_host();
    assert_eq!(host.sleeps, vec![0.5]);
    assert_eq!(host.shell, vec!["ls"]);
}

#[test]
fn test_module_attribute_error() {
    let err = error("import math\nmath.tau\n");
    assert_eq!(err.kind(), Some("AttributeError"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Host Signals
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_hooks_fire_through_host() {
    use sponge_types::ast::{Stmt, StmtKind};
    use sponge_types::Span;

    let mut program = parse("x = 1\n");
    program
        .body
        .insert(0, Stmt::new(StmtKind::Hook(HookPoint::primary(1)), Span::point(1, 1)));
    let mut eval = Evaluator::new(RecordingHost::default());
    eval.run(&program).unwrap();
    assert_eq!(eval.host().hooks, vec![HookPoint::primary(1)]);
}

#[test]
fn test_interrupt_stops_infinite_loop() {
    use sponge_types::ast::{Stmt, StmtKind};
    use sponge_types::Span;

    let mut program = parse("while True:\n    pass\n");
    if let StmtKind::While { body, .. } = &mut program.body[0].kind {
        body.insert(0, Stmt::new(StmtKind::Hook(HookPoint::primary(2)), Span::point(2, 5)));
    }
    let host = RecordingHost {
        interrupt_after: Some(5),
        ..Default::default()
    };
    let mut eval = Evaluator::new(host);
    let err = eval.run(&program).unwrap_err();
    assert!(matches!(err, EvalError::Interrupted));
    assert_eq!(eval.host().hooks.len(), 5);
}

#[test]
fn test_source_expression_in_scope() {
    let (mut eval, result) = run_with("x = 4\n", &[]);
    result.unwrap();
    assert_eq!(eval.eval_source_expression("x * 2").unwrap(), Value::Int(8));
    let err = eval.eval_source_expression("x +").unwrap_err();
    assert_eq!(err.kind(), Some("SyntaxError"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_determinism_100_iterations() {
    let source = "xs = []\nfor i in range(20):\n    xs.append(i * i % 7)\nxs.sort()\nprint(xs, sum(xs), max(xs))\n";
    let first = output(source);
    for _ in 0..100 {
        assert_eq!(output(source), first);
    }
}
