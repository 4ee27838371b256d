//! Grading engine.
//!
//! A [`TestCase`] runs headless under a [`TestHost`] with its inputs
//! pre-queued. The captured effects are then checked against the case's
//! [`Expectation`]: either a literal transcript with wildcards, or a list of
//! [`Criterion`] rules evaluated against the output, the source, a session
//! file, an expression in the final environment, or the turtle stream of a
//! reference solution.
//!
//! Check order: compile, run, leftover input, expectation. The first
//! failure decides the [`VerdictKind`].

use crate::config::EngineConfig;
use crate::engine::compile;
use crate::error::{CriterionError, EngineError};
use crate::io::TestHost;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sponge_eval::{on_script_stack, EvalError, Evaluator, Value};
use std::collections::{BTreeMap, HashMap};
use std::iter::Peekable;
use std::str::Chars;
use tracing::{debug, warn};

// ══════════════════════════════════════════════════════════════════════════════
// Inputs
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputItem {
    Text(String),
    Number(serde_json::Number),
}

impl InputItem {
    fn to_line(&self) -> String {
        match self {
            InputItem::Text(s) => s.clone(),
            InputItem::Number(n) => n.to_string(),
        }
    }
}

/// Canned input lines: a list, or one string split on the newline marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Inputs {
    Lines(Vec<InputItem>),
    Text(String),
}

impl Default for Inputs {
    fn default() -> Self {
        Inputs::Lines(Vec::new())
    }
}

impl Inputs {
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Inputs::Lines(lines.into_iter().map(|s| InputItem::Text(s.into())).collect())
    }

    /// The queue a run consumes, in order.
    pub fn to_queue(&self, config: &EngineConfig) -> Vec<String> {
        match self {
            Inputs::Lines(items) => items.iter().map(InputItem::to_line).collect(),
            Inputs::Text(text) if text.is_empty() => Vec::new(),
            Inputs::Text(text) => text
                .split(config.newline_marker.as_str())
                .map(str::to_string)
                .collect(),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expectations
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expectation {
    Literal(String),
    Criteria(Vec<Criterion>),
}

/// One rule of a criteria expectation, in its compact wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub pattern: String,
    /// `+ -` output, `c+ c-` source, `f+ f-` file, `s+ s-` statement,
    /// `t` turtle. Defaults to `+`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Any combination of `w` (whitespace), `c` (case), `p` (punctuation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<String>,
    /// Exact number of matches; negative means don't care.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    /// Whether `pattern` is a regular expression rather than plain text.
    #[serde(default = "default_regex")]
    pub regex: bool,
}

fn default_regex() -> bool {
    true
}

impl Criterion {
    pub fn new(pattern: impl Into<String>, typ: &str) -> Self {
        Self {
            pattern: pattern.into(),
            typ: Some(typ.to_string()),
            ignore: None,
            count: None,
            filename: None,
            statement: None,
            regex: true,
        }
    }

    pub fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_ignore(mut self, flags: &str) -> Self {
        self.ignore = Some(flags.to_string());
        self
    }

    pub fn with_filename(mut self, name: &str) -> Self {
        self.filename = Some(name.to_string());
        self
    }

    pub fn with_statement(mut self, statement: &str) -> Self {
        self.statement = Some(statement.to_string());
        self
    }

    pub fn plain_text(mut self) -> Self {
        self.regex = false;
        self
    }

    pub fn rule(&self) -> Result<Rule, CriterionError> {
        let (target, polarity) = match self.typ.as_deref().unwrap_or("+") {
            "+" => (Target::Output, Polarity::Present),
            "-" => (Target::Output, Polarity::Absent),
            "c+" => (Target::Source, Polarity::Present),
            "c-" => (Target::Source, Polarity::Absent),
            "f+" => (Target::File, Polarity::Present),
            "f-" => (Target::File, Polarity::Absent),
            "s+" => (Target::Statement, Polarity::Present),
            "s-" => (Target::Statement, Polarity::Absent),
            "t" => (Target::Turtle, Polarity::Present),
            other => return Err(CriterionError::UnknownType(other.to_string())),
        };
        let mut normalization = Normalization::default();
        for flag in self.ignore.as_deref().unwrap_or("").chars() {
            match flag {
                'w' => normalization.whitespace = true,
                'c' => normalization.case = true,
                'p' => normalization.punctuation = true,
                other => return Err(CriterionError::UnknownFlag(other)),
            }
        }
        let count = self
            .count
            .filter(|c| *c >= 0)
            .map(|c| c as usize);
        Ok(Rule {
            target,
            polarity,
            count,
            normalization,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Output,
    Source,
    File,
    Statement,
    Turtle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Present,
    Absent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalization {
    pub whitespace: bool,
    pub case: bool,
    pub punctuation: bool,
}

impl Normalization {
    /// Strip ignored characters. Case is handled by the matcher.
    pub fn apply(&self, text: &str) -> String {
        text.chars()
            .filter(|c| !(self.whitespace && c.is_whitespace()))
            .filter(|c| !(self.punctuation && c.is_ascii_punctuation()))
            .collect()
    }

    /// Strip ignored characters from a regex pattern. Only literal text is
    /// touched: escapes such as `\d`, metacharacters, character classes,
    /// repetition counts and group prefixes survive. Escaped literals such
    /// as `\.` or `\ ` are stripped like their plain forms.
    pub fn apply_to_regex(&self, pattern: &str) -> String {
        let mut out = String::with_capacity(pattern.len());
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) if self.strips(escaped) => {}
                    Some(escaped) => {
                        out.push('\\');
                        out.push(escaped);
                    }
                    None => out.push('\\'),
                },
                '[' => {
                    out.push(c);
                    copy_class(&mut chars, &mut out);
                }
                '{' => {
                    out.push(c);
                    copy_through(&mut chars, &mut out, &['}']);
                }
                '(' if chars.peek() == Some(&'?') => {
                    out.push(c);
                    copy_through(&mut chars, &mut out, &[':', ')', '>']);
                }
                c if REGEX_META.contains(c) => out.push(c),
                c if self.strips(c) => {}
                c => out.push(c),
            }
        }
        out
    }

    fn strips(&self, c: char) -> bool {
        (self.whitespace && c.is_whitespace()) || (self.punctuation && c.is_ascii_punctuation())
    }
}

const REGEX_META: &str = r"\.+*?()|[]{}^$";

fn copy_through(chars: &mut Peekable<Chars<'_>>, out: &mut String, ends: &[char]) {
    for c in chars.by_ref() {
        out.push(c);
        if ends.contains(&c) {
            break;
        }
    }
}

/// Copy a character class verbatim, after its opening `[`. A `]` right
/// after the opening (or after `^`) is literal; nested classes are followed.
fn copy_class(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    if let Some(c) = chars.next_if_eq(&'^') {
        out.push(c);
    }
    if let Some(c) = chars.next_if_eq(&']') {
        out.push(c);
    }
    let mut depth = 1usize;
    while let Some(c) = chars.next() {
        out.push(c);
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
            _ => {}
        }
    }
}

/// A validated criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub target: Target,
    pub polarity: Polarity,
    pub count: Option<usize>,
    pub normalization: Normalization,
}

impl Rule {
    /// Whether `matches` occurrences satisfy the rule.
    ///
    /// | polarity | count   | passes when       |
    /// |----------|---------|-------------------|
    /// | present  | none    | `matches >= 1`    |
    /// | present  | `n`     | `matches == n`    |
    /// | absent   | none    | `matches == 0`    |
    /// | absent   | `n`     | `matches != n`    |
    pub fn accepts(&self, matches: usize) -> bool {
        match (self.polarity, self.count) {
            (Polarity::Present, None) => matches >= 1,
            (Polarity::Present, Some(n)) => matches == n,
            (Polarity::Absent, None) => matches == 0,
            (Polarity::Absent, Some(n)) => matches != n,
        }
    }

    /// Compile `pattern`, normalized like the corpus. Plain-text patterns
    /// are escaped afterwards.
    pub fn matcher(&self, pattern: &str, regex: bool) -> Result<Regex, CriterionError> {
        let source = if regex {
            self.normalization.apply_to_regex(pattern)
        } else {
            regex::escape(&self.normalization.apply(pattern))
        };
        RegexBuilder::new(&source)
            .case_insensitive(self.normalization.case)
            .build()
            .map_err(|e| CriterionError::Pattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
    }
}

// ── Literal Matcher ──────────────────────────────────────────────────────────

/// Matches captured output against a literal expectation.
///
/// The expectation is anchored at the start of the output. Its trailing
/// whitespace is dropped, and only whitespace may follow it in the output.
/// The newline marker stands for a line break and the wildcard marker
/// matches any text, line breaks included.
#[derive(Debug, Clone)]
pub struct LiteralMatcher {
    regex: Regex,
}

impl LiteralMatcher {
    pub fn new(expected: &str, config: &EngineConfig) -> Result<Self, regex::Error> {
        let body = expected
            .trim_end()
            .split(config.wildcard_marker.as_str())
            .map(|piece| {
                piece
                    .split(config.newline_marker.as_str())
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!(r"(?s)\A{body}\s*\z"))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, actual: &str) -> bool {
        self.regex.is_match(actual)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Test Cases & Verdicts
// ══════════════════════════════════════════════════════════════════════════════

/// One graded run. Accepts the short `in`/`out` field names too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub source: String,
    #[serde(default, alias = "in")]
    pub inputs: Inputs,
    #[serde(alias = "out")]
    pub expectation: Expectation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prelude: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
}

impl TestCase {
    pub fn new(source: impl Into<String>, inputs: Inputs, expectation: Expectation) -> Self {
        Self {
            source: source.into(),
            inputs,
            expectation,
            reference: None,
            prelude: None,
            files: BTreeMap::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_prelude(mut self, prelude: impl Into<String>) -> Self {
        self.prelude = Some(prelude.into());
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.files.insert(name.into(), text.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictKind {
    Success,
    IncorrectOutput,
    UnconsumedInput,
    InsufficientInput,
    RuntimeError,
    MalformedTestCase,
}

impl VerdictKind {
    /// The learner-facing `err` string; `None` for success.
    pub fn message(self) -> Option<&'static str> {
        match self {
            VerdictKind::Success => None,
            VerdictKind::IncorrectOutput => Some("Incorrect output"),
            VerdictKind::UnconsumedInput => Some("Unconsumed input"),
            VerdictKind::InsufficientInput => Some("Insufficient input"),
            VerdictKind::RuntimeError => Some("Runtime error"),
            VerdictKind::MalformedTestCase => Some("Malformed test case"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub outcome: bool,
    pub kind: VerdictKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Expectation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria_outcomes: Option<Vec<bool>>,
    /// Runtime error message or the reason a test case is malformed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub ins: Inputs,
}

impl Verdict {
    pub fn new(kind: VerdictKind, ins: Inputs) -> Self {
        Self {
            outcome: kind == VerdictKind::Success,
            kind,
            err: kind.message().map(str::to_string),
            expected: None,
            actual: None,
            criteria_outcomes: None,
            detail: None,
            ins,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn malformed(ins: Inputs, reason: impl Into<String>) -> Self {
        Self::new(VerdictKind::MalformedTestCase, ins).with_detail(reason)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Grader
// ══════════════════════════════════════════════════════════════════════════════

/// Why a headless run stopped early.
#[derive(Debug, Clone, PartialEq)]
enum RunFailure {
    Compile(String),
    Runtime(String),
    InsufficientInput,
}

impl RunFailure {
    fn message(&self) -> &str {
        match self {
            RunFailure::Compile(m) | RunFailure::Runtime(m) => m,
            RunFailure::InsufficientInput => "insufficient input",
        }
    }
}

struct HeadlessRun {
    evaluator: Evaluator<TestHost>,
    result: Result<(), RunFailure>,
}

pub struct Grader {
    config: EngineConfig,
    /// Canonical turtle dumps of reference runs, keyed by a SHA-256 of the
    /// run's inputs. `Err` holds the reference's failure message.
    references: HashMap<String, Result<String, String>>,
}

impl Grader {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            references: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cached_references(&self) -> usize {
        self.references.len()
    }

    pub fn grade_all(&mut self, cases: &[TestCase]) -> Vec<Verdict> {
        cases.iter().map(|case| self.grade(case)).collect()
    }

    /// Grade one case on a thread with [`SCRIPT_STACK_SIZE`](sponge_eval::SCRIPT_STACK_SIZE) of stack.
    pub fn grade(&mut self, case: &TestCase) -> Verdict {
        match on_script_stack(|| self.grade_here(case)) {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(error = %err, "script thread unavailable; grading on the caller's stack");
                self.grade_here(case)
            }
        }
    }

    fn grade_here(&mut self, case: &TestCase) -> Verdict {
        let ins = case.inputs.clone();
        let queue = case.inputs.to_queue(&self.config);
        let mut run = self.run_headless(&case.source, &queue, case.prelude.as_deref(), &case.files);

        match &run.result {
            Ok(()) => {}
            Err(RunFailure::Compile(message)) => {
                return Verdict::new(VerdictKind::RuntimeError, ins)
                    .with_detail(format!("Failed to compile\n{message}"));
            }
            Err(RunFailure::Runtime(message)) => {
                return Verdict::new(VerdictKind::RuntimeError, ins).with_detail(message.clone());
            }
            Err(RunFailure::InsufficientInput) => {
                return Verdict::new(VerdictKind::InsufficientInput, ins);
            }
        }

        let leftover = run.evaluator.host().remaining_inputs();
        let only_blank = leftover.len() == 1 && leftover[0].is_empty();
        if !leftover.is_empty() && !only_blank {
            debug!(leftover = leftover.len(), "inputs unconsumed");
            return Verdict::new(VerdictKind::UnconsumedInput, ins);
        }

        let output = run.evaluator.host().output().to_string();
        match &case.expectation {
            Expectation::Literal(expected) => {
                let matcher = match LiteralMatcher::new(expected, &self.config) {
                    Ok(m) => m,
                    Err(e) => return Verdict::malformed(ins, e.to_string()),
                };
                if matcher.is_match(&output) {
                    Verdict::new(VerdictKind::Success, ins)
                } else {
                    let mut verdict = Verdict::new(VerdictKind::IncorrectOutput, ins);
                    verdict.expected = Some(case.expectation.clone());
                    verdict.actual = Some(output);
                    verdict
                }
            }
            Expectation::Criteria(criteria) => {
                let results: Vec<Result<bool, CriterionError>> = criteria
                    .iter()
                    .map(|c| self.check(c, case, &queue, &output, &mut run))
                    .collect();
                if let Some(Err(reason)) = results.iter().find(|r| r.is_err()) {
                    return Verdict::malformed(ins, reason.to_string());
                }
                let outcomes: Vec<bool> = results.into_iter().map(|r| r.unwrap_or(false)).collect();
                let kind = if outcomes.iter().all(|ok| *ok) {
                    VerdictKind::Success
                } else {
                    VerdictKind::IncorrectOutput
                };
                let mut verdict = Verdict::new(kind, ins);
                verdict.criteria_outcomes = Some(outcomes);
                if kind == VerdictKind::IncorrectOutput {
                    verdict.expected = Some(case.expectation.clone());
                    verdict.actual = Some(output);
                }
                verdict
            }
        }
    }

    fn check(
        &mut self,
        criterion: &Criterion,
        case: &TestCase,
        queue: &[String],
        output: &str,
        run: &mut HeadlessRun,
    ) -> Result<bool, CriterionError> {
        let rule = criterion.rule()?;
        let corpus = match rule.target {
            Target::Output => output.to_string(),
            Target::Source => case.source.clone(),
            Target::File => {
                let name = criterion
                    .filename
                    .as_deref()
                    .ok_or(CriterionError::MissingFilename)?;
                run.evaluator
                    .files()
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CriterionError::UnreadableFile(name.to_string()))?
            }
            Target::Statement => {
                let statement = criterion
                    .statement
                    .as_deref()
                    .ok_or(CriterionError::MissingStatement)?;
                statement_output(&mut run.evaluator, statement)?
            }
            Target::Turtle => {
                let reference = case
                    .reference
                    .as_deref()
                    .ok_or(CriterionError::MissingReference)?;
                let expected = self.reference_dump(reference, queue, case)?;
                let actual = run.evaluator.host().dump().to_canonical_string();
                return Ok(expected == actual);
            }
        };

        let matcher = rule.matcher(&criterion.pattern, criterion.regex)?;
        let matches = matcher
            .find_iter(&rule.normalization.apply(&corpus))
            .count();
        debug!(pattern = %criterion.pattern, matches, "criterion checked");
        Ok(rule.accepts(matches))
    }

    fn reference_dump(
        &mut self,
        reference: &str,
        queue: &[String],
        case: &TestCase,
    ) -> Result<String, CriterionError> {
        let key = reference_key(reference, queue, case);
        if !self.references.contains_key(&key) {
            let run = self.run_headless(reference, queue, case.prelude.as_deref(), &case.files);
            let dump = match run.result {
                Ok(()) => Ok(run.evaluator.host().dump().to_canonical_string()),
                Err(failure) => Err(failure.message().to_string()),
            };
            self.references.insert(key.clone(), dump);
        }
        match self.references.get(&key) {
            Some(Ok(dump)) => Ok(dump.clone()),
            Some(Err(message)) => Err(CriterionError::Reference(message.clone())),
            None => Err(CriterionError::MissingReference),
        }
    }

    fn run_headless(
        &self,
        source: &str,
        queue: &[String],
        prelude: Option<&str>,
        files: &BTreeMap<String, String>,
    ) -> HeadlessRun {
        let host = TestHost::new(queue.iter().cloned());
        let mut evaluator = Evaluator::new(host).with_files(files.clone());
        let result = self.execute_headless(&mut evaluator, source, prelude);
        HeadlessRun { evaluator, result }
    }

    fn execute_headless(
        &self,
        evaluator: &mut Evaluator<TestHost>,
        source: &str,
        prelude: Option<&str>,
    ) -> Result<(), RunFailure> {
        let compile_failure = |err: EngineError| match err {
            EngineError::Syntax(errors) => RunFailure::Compile(
                errors
                    .first()
                    .map(|e| e.to_traceback())
                    .unwrap_or_default(),
            ),
            other => RunFailure::Compile(other.to_string()),
        };
        if let Some(prelude) = prelude {
            let program = compile("<prelude>", prelude).map_err(compile_failure)?;
            evaluator.run(&program).map_err(|e| self.run_failure(e))?;
        }
        let program = compile(&self.config.script_name, source).map_err(compile_failure)?;
        evaluator.run(&program).map_err(|e| self.run_failure(e))
    }

    fn run_failure(&self, err: EvalError) -> RunFailure {
        match err {
            EvalError::InsufficientInput => RunFailure::InsufficientInput,
            other => RunFailure::Runtime(other.to_traceback(&self.config.script_name)),
        }
    }
}

/// Run `statement` in the final environment and return what it printed
/// followed by its value, unless that is `None`.
fn statement_output(
    evaluator: &mut Evaluator<TestHost>,
    statement: &str,
) -> Result<String, CriterionError> {
    let mark = evaluator.host().output().len();
    let value = evaluator
        .eval_source_expression(statement)
        .map_err(|e| CriterionError::Statement {
            statement: statement.to_string(),
            message: e.to_string(),
        })?;
    let mut text = evaluator.host().output()[mark..].to_string();
    if value != Value::None {
        text.push_str(&value.to_str());
    }
    Ok(text)
}

fn reference_key(reference: &str, queue: &[String], case: &TestCase) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reference.as_bytes());
    hasher.update([0u8]);
    hasher.update(case.prelude.as_deref().unwrap_or("").as_bytes());
    for line in queue {
        hasher.update([0u8]);
        hasher.update(line.as_bytes());
    }
    for (name, text) in &case.files {
        hasher.update([1u8]);
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
