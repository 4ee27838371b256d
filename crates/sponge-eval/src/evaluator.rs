//! Core statement and expression evaluator.

use crate::args::CallArgs;
use crate::builtins::{self, Range};
use crate::env::Environment;
use crate::error::{exception_matches, EvalError, EvalResult};
use crate::host::Host;
use crate::methods;
use crate::modules;
use crate::ops;
use crate::value::{FileHandle, Function, ModuleKind, Value};
use sponge_parser::parse_expression_source;
use sponge_types::ast::*;
use sponge_types::SourceFile;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{debug, trace};

/// Nested user function calls allowed before `RecursionError`. Runs need
/// [`SCRIPT_STACK_SIZE`](crate::SCRIPT_STACK_SIZE) of native stack to reach it.
pub const MAX_CALL_DEPTH: usize = 1000;

/// The tree-walking evaluator. Owns the variable environment, the session
/// files and the [`Host`] that receives every external effect.
pub struct Evaluator<H: Host> {
    env: Environment,
    pub(crate) host: H,
    files: BTreeMap<String, String>,
    changed_files: BTreeSet<String>,
    /// Exceptions currently being handled, innermost last. Bare `raise`
    /// re-raises the last one.
    handling: Vec<EvalError>,
    call_depth: usize,
    steps: u64,
}

/// Walks a `for` iterable. Lists are read live so appends made by the loop
/// body are visited, as in Python. `range(...)` is never built as a list.
enum Cursor {
    Shared(Rc<RefCell<Vec<Value>>>, usize),
    Owned(std::vec::IntoIter<Value>),
    Range(Range),
}

impl Cursor {
    fn next(&mut self) -> Option<Value> {
        match self {
            Cursor::Shared(items, index) => {
                let item = items.borrow().get(*index).cloned();
                *index += 1;
                item
            }
            Cursor::Owned(iter) => iter.next(),
            Cursor::Range(range) => range.next().map(Value::Int),
        }
    }
}

impl<H: Host> Evaluator<H> {
    pub fn new(host: H) -> Self {
        Self {
            env: Environment::new(),
            host,
            files: BTreeMap::new(),
            changed_files: BTreeSet::new(),
            handling: Vec::new(),
            call_depth: 0,
            steps: 0,
        }
    }

    /// Seed the session files `open()` can read.
    pub fn with_files(mut self, files: BTreeMap<String, String>) -> Self {
        self.files = files;
        self
    }

    /// Start from `env` instead of an empty module scope.
    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    /// Files the script opened for writing or appending, with their contents.
    pub fn changed_files(&self) -> BTreeMap<String, String> {
        self.changed_files
            .iter()
            .filter_map(|name| Some((name.clone(), self.files.get(name)?.clone())))
            .collect()
    }

    /// Statements executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Execute a whole program in the current environment.
    pub fn run(&mut self, program: &Program) -> EvalResult<()> {
        debug!(statements = program.body.len(), "evaluating program");
        let result = self.exec_block(&program.body);
        match &result {
            Ok(()) => debug!(steps = self.steps, "program finished"),
            Err(err) => debug!(steps = self.steps, error = %err, "program stopped"),
        }
        result
    }

    /// Parse `source` as one expression and evaluate it in the current
    /// environment. Syntax errors surface as a `SyntaxError` script error.
    pub fn eval_source_expression(&mut self, source: &str) -> EvalResult<Value> {
        let file = SourceFile::new("<expression>", source);
        let expr = parse_expression_source(&file).map_err(|errors| {
            let message = errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "invalid syntax".to_string());
            EvalError::script("SyntaxError", message)
        })?;
        self.eval_expr(&expr)
    }

    fn tick(&mut self) -> EvalResult<()> {
        if self.host.interrupted() {
            return Err(EvalError::Interrupted);
        }
        self.steps += 1;
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    pub fn exec_block(&mut self, body: &[Stmt]) -> EvalResult<()> {
        for stmt in body {
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> EvalResult<()> {
        self.tick()?;
        self.exec_stmt_kind(stmt).map_err(|e| e.at_line(stmt.line()))
    }

    fn exec_stmt_kind(&mut self, stmt: &Stmt) -> EvalResult<()> {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.eval_expr(expr).map(|_| ()),
            StmtKind::Assign { target, value } => {
                let value = self.eval_expr(value)?;
                self.assign_target(target, value)
            }
            StmtKind::AugAssign { target, op, value } => self.exec_aug_assign(target, *op, value),
            StmtKind::If { test, body, orelse } => {
                if self.eval_expr(test)?.truthy() {
                    self.exec_block(body)
                } else {
                    self.exec_block(orelse)
                }
            }
            StmtKind::While { test, body } => {
                while self.eval_expr(test)?.truthy() {
                    match self.exec_block(body) {
                        Ok(()) | Err(EvalError::Continue) => {}
                        Err(EvalError::Break) => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
            StmtKind::For {
                target,
                iter,
                body,
                hook,
            } => self.exec_for(target, iter, body, *hook),
            StmtKind::FunctionDef(def) => {
                let mut defaults = Vec::with_capacity(def.params.len());
                for param in &def.params {
                    defaults.push(match &param.default {
                        Some(expr) => Some(self.eval_expr(expr)?),
                        None => None,
                    });
                }
                let function = Function {
                    def: def.clone(),
                    defaults,
                };
                self.env
                    .assign(&def.name.name, Value::Function(Rc::new(function)));
                Ok(())
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::None,
                };
                Err(EvalError::Return(value))
            }
            StmtKind::Break => Err(EvalError::Break),
            StmtKind::Continue => Err(EvalError::Continue),
            StmtKind::Pass => Ok(()),
            StmtKind::Global(names) => {
                for name in names {
                    self.env.declare_global(&name.name);
                }
                Ok(())
            }
            StmtKind::Import(names) => {
                for name in names {
                    let module = ModuleKind::from_name(&name.name).ok_or_else(|| {
                        EvalError::script(
                            "ModuleNotFoundError",
                            format!("No module named '{}'", name.name),
                        )
                    })?;
                    trace!(module = module.name(), "import");
                    self.env.assign(&name.name, Value::Module(module));
                }
                Ok(())
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => self.exec_try(body, handlers, orelse, finalbody),
            StmtKind::Raise(None) => Err(self.handling.last().cloned().unwrap_or_else(|| {
                EvalError::script("RuntimeError", "No active exception to reraise")
            })),
            StmtKind::Raise(Some(expr)) => {
                let value = self.eval_expr(expr)?;
                Err(raised(value))
            }
            StmtKind::Hook(point) => self.host.hook(*point, &self.env),
        }
    }

    fn exec_aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr) -> EvalResult<()> {
        let current = self.eval_expr(target)?;
        let operand = self.eval_expr(value)?;
        // `xs += ys` extends the list in place.
        if let (BinOp::Add, Value::List(items)) = (op, &current) {
            let extra = self.iterate(&operand)?;
            items.borrow_mut().extend(extra);
            return self.assign_target(target, current);
        }
        let result = ops::binary(op, &current, &operand)?;
        self.assign_target(target, result)
    }

    fn assign_target(&mut self, target: &Expr, value: Value) -> EvalResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                self.env.assign(name, value);
                Ok(())
            }
            ExprKind::Index {
                value: container,
                index,
            } => {
                let container = self.eval_expr(container)?;
                let index = self.eval_expr(index)?;
                ops::set_index(&container, &index, value)
            }
            _ => Err(EvalError::script(
                "SyntaxError",
                "cannot assign to expression",
            )),
        }
    }

    fn exec_for(
        &mut self,
        target: &Ident,
        iter: &Expr,
        body: &[Stmt],
        hook: Option<HookPoint>,
    ) -> EvalResult<()> {
        let mut cursor = match self.direct_range(iter)? {
            Some(range) => Cursor::Range(range),
            None => match self.eval_expr(iter)? {
                Value::List(items) => Cursor::Shared(items, 0),
                other => Cursor::Owned(self.iterate(&other)?.into_iter()),
            },
        };
        loop {
            // Fires before every fetch, including the one that ends the loop.
            if let Some(point) = hook {
                self.host.hook(point, &self.env)?;
            }
            let Some(item) = cursor.next() else {
                break;
            };
            self.tick()?;
            self.env.assign(&target.name, item);
            match self.exec_block(body) {
                Ok(()) | Err(EvalError::Continue) => {}
                Err(EvalError::Break) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// `iter` as an unbuilt [`Range`] when it is a call to the builtin
    /// `range`. `None` for anything else, including a rebound `range`.
    fn direct_range(&mut self, iter: &Expr) -> EvalResult<Option<Range>> {
        let ExprKind::Call {
            func,
            args,
            keywords,
        } = &iter.kind
        else {
            return Ok(None);
        };
        if !matches!(&func.kind, ExprKind::Name(name) if name == "range")
            || self.env.lookup("range").is_some()
        {
            return Ok(None);
        }
        let call = self.eval_arguments("range", args, keywords)?;
        Range::from_call(&call).map(Some)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
    ) -> EvalResult<()> {
        let result = match self.exec_block(body) {
            Ok(()) => self.exec_block(orelse),
            Err(err) if err.is_catchable() => {
                let raised_kind = err.kind().unwrap_or_default().to_string();
                let handler = handlers.iter().find(|h| match &h.kind {
                    None => true,
                    Some(kind) => exception_matches(&kind.name, &raised_kind),
                });
                match handler {
                    Some(handler) => {
                        if let Some(name) = &handler.name {
                            self.env.assign(&name.name, err.to_value());
                        }
                        self.handling.push(err);
                        let outcome = self.exec_block(&handler.body);
                        self.handling.pop();
                        outcome
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        };

        if finalbody.is_empty() || result.as_ref().is_err_and(EvalError::is_terminal) {
            return result;
        }
        self.exec_block(finalbody)?;
        result
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    pub fn eval_expr(&mut self, expr: &Expr) -> EvalResult<Value> {
        match &expr.kind {
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::None => Ok(Value::None),
            ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item)?);
                }
                Ok(Value::list(values))
            }
            ExprKind::Name(name) => self.lookup(name),
            ExprKind::Attribute { value, attr } => match self.eval_expr(value)? {
                Value::Module(module) => modules::attribute(module, &attr.name),
                other => Err(EvalError::attribute_error(other.type_name(), &attr.name)),
            },
            ExprKind::Call {
                func,
                args,
                keywords,
            } => self.eval_call(func, args, keywords),
            ExprKind::Index { value, index } => {
                let container = self.eval_expr(value)?;
                let index = self.eval_expr(index)?;
                ops::get_index(&container, &index)
            }
            ExprKind::Slice {
                value,
                lower,
                upper,
            } => {
                let container = self.eval_expr(value)?;
                let lower = match lower {
                    Some(e) => Some(self.eval_expr(e)?),
                    None => None,
                };
                let upper = match upper {
                    Some(e) => Some(self.eval_expr(e)?),
                    None => None,
                };
                ops::get_slice(&container, lower.as_ref(), upper.as_ref())
            }
            ExprKind::Binary { left, op, right } => {
                let l = self.eval_expr(left)?;
                let r = self.eval_expr(right)?;
                ops::binary(*op, &l, &r)
            }
            ExprKind::Unary { op, operand } => {
                let v = self.eval_expr(operand)?;
                ops::unary(*op, &v)
            }
            ExprKind::BoolOp { op, left, right } => {
                let l = self.eval_expr(left)?;
                match (op, l.truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(l),
                    _ => self.eval_expr(right),
                }
            }
            ExprKind::Compare { left, rest } => {
                let mut l = self.eval_expr(left)?;
                for (op, right) in rest {
                    let r = self.eval_expr(right)?;
                    if !ops::compare(*op, &l, &r)? {
                        return Ok(Value::Bool(false));
                    }
                    l = r;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval_expr(test)?.truthy() {
                    self.eval_expr(body)
                } else {
                    self.eval_expr(orelse)
                }
            }
            ExprKind::Hook(point) => {
                self.host.hook(*point, &self.env)?;
                Ok(Value::Bool(true))
            }
        }
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        if let Some(value) = self.env.lookup(name) {
            return Ok(value.clone());
        }
        if builtins::is_builtin(name) {
            return Ok(Value::builtin(name));
        }
        Err(EvalError::script(
            "NameError",
            format!("name '{name}' is not defined"),
        ))
    }

    // ── Calls ────────────────────────────────────────────────────────────

    fn eval_call(&mut self, func: &Expr, args: &[Expr], keywords: &[Keyword]) -> EvalResult<Value> {
        if let ExprKind::Attribute { value, attr } = &func.kind {
            let receiver = self.eval_expr(value)?;
            if let Value::Module(module) = receiver {
                let callee = modules::attribute(module, &attr.name)?;
                let call = self.eval_arguments(&attr.name, args, keywords)?;
                return self.call_value(callee, call);
            }
            let call = self.eval_arguments(&attr.name, args, keywords)?;
            return methods::call(self, receiver, &attr.name, call);
        }

        let callee = self.eval_expr(func)?;
        let name = match &callee {
            Value::Function(f) => f.name().to_string(),
            Value::Builtin { name, .. } => name.clone(),
            other => other.type_name().to_string(),
        };
        let call = self.eval_arguments(&name, args, keywords)?;
        self.call_value(callee, call)
    }

    fn eval_arguments(
        &mut self,
        name: &str,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> EvalResult<CallArgs> {
        let mut positional = Vec::with_capacity(args.len());
        for arg in args {
            positional.push(self.eval_expr(arg)?);
        }
        let mut named = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            if named.iter().any(|(k, _): &(String, Value)| *k == keyword.name.name) {
                return Err(EvalError::script(
                    "SyntaxError",
                    format!("keyword argument repeated: {}", keyword.name.name),
                ));
            }
            named.push((keyword.name.name.clone(), self.eval_expr(&keyword.value)?));
        }
        Ok(CallArgs::new(name, positional, named))
    }

    fn call_value(&mut self, callee: Value, call: CallArgs) -> EvalResult<Value> {
        match callee {
            Value::Function(function) => self.call_function(&function, call),
            Value::Builtin { module: None, name } => builtins::call(self, &name, call),
            Value::Builtin {
                module: Some(module),
                name,
            } => modules::call(self, module, &name, call),
            other => Err(EvalError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(&mut self, function: &Function, call: CallArgs) -> EvalResult<Value> {
        let name = function.name();
        let params = &function.def.params;
        if call.positional.len() > params.len() {
            return Err(EvalError::type_error(format!(
                "{name}() takes {} positional argument{} but {} {} given",
                params.len(),
                if params.len() == 1 { "" } else { "s" },
                call.positional.len(),
                if call.positional.len() == 1 { "was" } else { "were" },
            )));
        }

        let mut bound: Vec<Option<Value>> = vec![None; params.len()];
        for (slot, value) in bound.iter_mut().zip(call.positional) {
            *slot = Some(value);
        }
        for (key, value) in call.keywords {
            match params.iter().position(|p| p.name.name == key) {
                Some(i) if bound[i].is_some() => {
                    return Err(EvalError::type_error(format!(
                        "{name}() got multiple values for argument '{key}'"
                    )))
                }
                Some(i) => bound[i] = Some(value),
                None => {
                    return Err(EvalError::type_error(format!(
                        "{name}() got an unexpected keyword argument '{key}'"
                    )))
                }
            }
        }

        let mut values = Vec::with_capacity(params.len());
        for ((param, slot), default) in params.iter().zip(bound).zip(&function.defaults) {
            match slot.or_else(|| default.clone()) {
                Some(value) => values.push(value),
                None => {
                    return Err(EvalError::type_error(format!(
                        "{name}() missing 1 required positional argument: '{}'",
                        param.name.name
                    )))
                }
            }
        }

        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(EvalError::script(
                "RecursionError",
                "maximum recursion depth exceeded",
            ));
        }
        self.call_depth += 1;
        self.env.push_frame();
        for (param, value) in params.iter().zip(values) {
            self.env.define_local(&param.name.name, value);
        }
        let result = self.exec_block(&function.def.body);
        self.env.pop_frame();
        self.call_depth -= 1;

        match result {
            Ok(()) => Ok(Value::None),
            Err(EvalError::Return(value)) => Ok(value),
            Err(e) => Err(e),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Iteration & files
    // ══════════════════════════════════════════════════════════════════════

    /// Materialize an iterable: list items, string characters, file lines.
    pub(crate) fn iterate(&self, value: &Value) -> EvalResult<Vec<Value>> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::File(handle) => {
                let text = self.read_remaining(handle)?;
                Ok(text.split_inclusive('\n').map(Value::str).collect())
            }
            other => Err(EvalError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn open_file(&mut self, name: &str, mode: &str) -> EvalResult<FileHandle> {
        match mode {
            "r" => {
                if !self.files.contains_key(name) {
                    return Err(EvalError::script(
                        "FileNotFoundError",
                        format!("[Errno 2] No such file or directory: '{name}'"),
                    ));
                }
            }
            "w" => {
                self.files.insert(name.to_string(), String::new());
                self.changed_files.insert(name.to_string());
            }
            "a" => {
                self.files.entry(name.to_string()).or_default();
                self.changed_files.insert(name.to_string());
            }
            other => {
                return Err(EvalError::value_error(format!("invalid mode: '{other}'")));
            }
        }
        debug!(file = name, mode, "open");
        Ok(FileHandle::new(name, mode))
    }

    fn readable_text(&self, handle: &FileHandle) -> EvalResult<&str> {
        if handle.state.borrow().closed {
            return Err(EvalError::value_error("I/O operation on closed file."));
        }
        if !handle.readable() {
            return Err(EvalError::script("UnsupportedOperation", "not readable"));
        }
        Ok(self.files.get(&handle.name).map(String::as_str).unwrap_or(""))
    }

    /// Everything from the handle's position to the end.
    pub(crate) fn read_remaining(&self, handle: &FileHandle) -> EvalResult<String> {
        let text = self.readable_text(handle)?;
        let mut state = handle.state.borrow_mut();
        let rest = text.get(state.position..).unwrap_or("").to_string();
        state.position = text.len();
        Ok(rest)
    }

    /// One line including its terminator, or `""` at end of file.
    pub(crate) fn read_line_from(&self, handle: &FileHandle) -> EvalResult<String> {
        let text = self.readable_text(handle)?;
        let mut state = handle.state.borrow_mut();
        let rest = text.get(state.position..).unwrap_or("");
        let line = match rest.find('\n') {
            Some(end) => &rest[..=end],
            None => rest,
        };
        state.position += line.len();
        Ok(line.to_string())
    }

    pub(crate) fn write_file(&mut self, handle: &FileHandle, text: &str) -> EvalResult<()> {
        if handle.readable() {
            return Err(EvalError::script("UnsupportedOperation", "not writable"));
        }
        self.files
            .entry(handle.name.clone())
            .or_default()
            .push_str(text);
        self.changed_files.insert(handle.name.clone());
        Ok(())
    }
}

/// The error a `raise <value>` statement produces.
fn raised(value: Value) -> EvalError {
    match value {
        Value::Exception(e) => EvalError::script(e.kind.clone(), e.message.clone()),
        Value::Builtin { module: None, name } if builtins::is_exception(&name) => {
            EvalError::script(name, "")
        }
        _ => EvalError::type_error("exceptions must derive from BaseException"),
    }
}
