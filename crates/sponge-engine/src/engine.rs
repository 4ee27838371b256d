//! Run orchestration: one entry point for debug, silent and test runs.

use crate::channel::Channel;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::grading::{Expectation, Grader, Inputs, TestCase, Verdict, VerdictKind};
use crate::instrument::instrument;
use crate::io::ChannelHost;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use sponge_eval::{on_script_stack, EvalError, Evaluator};
use sponge_parser::parse_source;
use sponge_types::ast::Program;
use sponge_types::SourceFile;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Debug,
    Test,
    Silent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub mode: Mode,
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breakpoints: Vec<u32>,
    /// Expressions reported at every debug pause.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watches: Vec<String>,
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expectation: Option<Expectation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prelude: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
}

impl RunRequest {
    pub fn new(mode: Mode, source: impl Into<String>) -> Self {
        Self {
            mode,
            source: source.into(),
            breakpoints: Vec::new(),
            watches: Vec::new(),
            inputs: Inputs::default(),
            expectation: None,
            reference: None,
            prelude: None,
            files: BTreeMap::new(),
        }
    }

    pub fn with_breakpoints(mut self, lines: Vec<u32>) -> Self {
        self.breakpoints = lines;
        self
    }

    pub fn with_watches(mut self, watches: Vec<String>) -> Self {
        self.watches = watches;
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
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Ok,
    Interrupt,
    Error,
}

/// How a debug or silent run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Session files the script wrote, with their final contents.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl RunOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            reason: StopReason::Error,
            error: Some(error.into()),
            files: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Run(RunOutcome),
    Graded(Verdict),
}

/// Parse `source` as a script named `name`.
pub(crate) fn compile(name: &str, source: &str) -> EngineResult<Program> {
    let file = SourceFile::new(name, source);
    parse_source(&file).map_err(EngineError::Syntax)
}

fn syntax_message(err: EngineError) -> String {
    match err {
        EngineError::Syntax(errors) => errors
            .first()
            .map(|e| e.to_traceback())
            .unwrap_or_else(|| "invalid syntax".to_string()),
        other => other.to_string(),
    }
}

pub struct Engine {
    config: EngineConfig,
    grader: Grader,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            grader: Grader::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `request` in its mode. Test runs never touch `channel`.
    pub fn execute(
        &mut self,
        request: RunRequest,
        channel: &mut dyn Channel,
    ) -> EngineResult<Outcome> {
        match request.mode {
            Mode::Debug | Mode::Silent => self.run(&request, channel).map(Outcome::Run),
            Mode::Test => {
                let Some(expectation) = request.expectation else {
                    warn!("test run without expectation");
                    return Ok(Outcome::Graded(Verdict::new(
                        VerdictKind::MalformedTestCase,
                        request.inputs,
                    )));
                };
                let mut case = TestCase::new(request.source, request.inputs, expectation);
                case.reference = request.reference;
                case.prelude = request.prelude;
                case.files = request.files;
                Ok(Outcome::Graded(self.grade(&case)))
            }
        }
    }

    pub fn grade(&mut self, case: &TestCase) -> Verdict {
        info!(mode = "test", "run started");
        let verdict = self.grader.grade(case);
        info!(mode = "test", kind = ?verdict.kind, "run finished");
        verdict
    }

    pub fn grade_all(&mut self, cases: &[TestCase]) -> Vec<Verdict> {
        self.grader.grade_all(cases)
    }

    /// A debug or silent run. Only a controller that is gone before the
    /// script starts is an `Err`; everything after that is a [`RunOutcome`].
    ///
    /// The script runs on a thread with [`SCRIPT_STACK_SIZE`](sponge_eval::SCRIPT_STACK_SIZE) of stack while
    /// the caller blocks.
    pub fn run(&self, request: &RunRequest, channel: &mut dyn Channel) -> EngineResult<RunOutcome> {
        match on_script_stack(|| self.run_here(request, &mut *channel)) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "script thread unavailable; running on the caller's stack");
                self.run_here(request, channel)
            }
        }
    }

    fn run_here(&self, request: &RunRequest, channel: &mut dyn Channel) -> EngineResult<RunOutcome> {
        let debugging = request.mode == Mode::Debug;
        info!(mode = ?request.mode, breakpoints = request.breakpoints.len(), "run started");

        let program = match compile(&self.config.script_name, &request.source) {
            Ok(program) => program,
            Err(err) => return Ok(RunOutcome::failed(syntax_message(err))),
        };
        let prelude = match request.prelude.as_deref().map(|p| compile("<prelude>", p)) {
            None => None,
            Some(Ok(program)) => Some(program),
            Some(Err(err)) => return Ok(RunOutcome::failed(syntax_message(err))),
        };

        let (program, session) = if debugging {
            let instrumented = instrument(program);
            let session = Session::new(instrumented.line_map, request.breakpoints.iter().copied())
                .with_config(&self.config)
                .with_watches(request.watches.iter().cloned());
            (instrumented.program, Some(session))
        } else {
            (program, None)
        };

        let mut host = ChannelHost::new(channel, session, &self.config);
        host.reset_surface()?;
        let mut evaluator = Evaluator::new(host).with_files(request.files.clone());
        let result = match &prelude {
            Some(prelude) => evaluator.run(prelude),
            None => Ok(()),
        }
        .and_then(|()| evaluator.run(&program));

        let files = evaluator.changed_files();
        let (reason, error) = match result {
            Ok(()) => (StopReason::Ok, None),
            Err(EvalError::Interrupted) => {
                warn!(steps = evaluator.steps(), "run interrupted");
                (StopReason::Interrupt, None)
            }
            Err(err @ EvalError::Script { .. }) => (
                StopReason::Error,
                Some(err.to_traceback(&self.config.script_name)),
            ),
            Err(err) => (StopReason::Error, Some(err.to_string())),
        };
        info!(reason = ?reason, steps = evaluator.steps(), "run finished");
        Ok(RunOutcome {
            reason,
            error,
            files,
        })
    }
}
