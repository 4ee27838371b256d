//! Execution session: the per-run debugger state behind every hook.

use crate::channel::{Channel, Reply, Request};
use crate::config::EngineConfig;
use crate::error::ChannelError;
use crate::instrument::BreakpointMap;
use sponge_eval::{Environment, EvalError, EvalResult, Evaluator, Host, Value};
use sponge_types::ast::HookPoint;
use sponge_types::draw::DrawCommand;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Session {
    line_map: BreakpointMap,
    active: BTreeSet<u32>,
    watches: Vec<String>,
    step_into: bool,
    last_seen_line: Option<u32>,
    config: EngineConfig,
}

impl Session {
    /// `breakpoints` are normalized through `line_map`.
    pub fn new(line_map: BreakpointMap, breakpoints: impl IntoIterator<Item = u32>) -> Self {
        let active = line_map.normalize(breakpoints);
        Self {
            line_map,
            active,
            watches: Vec::new(),
            step_into: false,
            last_seen_line: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Expressions evaluated and reported at every pause.
    pub fn with_watches(mut self, watches: impl IntoIterator<Item = String>) -> Self {
        self.watches = watches.into_iter().collect();
        self
    }

    pub fn watches(&self) -> &[String] {
        &self.watches
    }

    pub fn active_breakpoints(&self) -> &BTreeSet<u32> {
        &self.active
    }

    pub fn replace_breakpoints(&mut self, lines: impl IntoIterator<Item = u32>) {
        self.active = self.line_map.normalize(lines);
        debug!(breakpoints = ?self.active, "breakpoints replaced");
    }

    /// Pause at the next hook regardless of breakpoints.
    pub fn request_step(&mut self) {
        self.step_into = true;
    }

    pub fn line_map(&self) -> &BreakpointMap {
        &self.line_map
    }

    /// Apply the optional fields of a controller reply.
    pub fn apply_reply(&mut self, reply: &Reply) {
        if let Some(lines) = &reply.breakpoints {
            self.replace_breakpoints(lines.iter().copied());
        }
        if let Some(watches) = &reply.watches {
            self.watches = watches.clone();
            debug!(watches = self.watches.len(), "watches replaced");
        }
        if reply.step {
            self.request_step();
        }
    }

    /// Called at every instrumented point. Blocks on `channel` when the
    /// point is a pause.
    pub fn hit(
        &mut self,
        point: HookPoint,
        env: &Environment,
        channel: &mut dyn Channel,
    ) -> Result<(), ChannelError> {
        if point.secondary && self.last_seen_line == Some(point.line) {
            return Ok(());
        }
        self.last_seen_line = Some(point.line);

        if !self.step_into && !self.active.contains(&point.line) {
            return Ok(());
        }
        self.step_into = false;

        let request = Request::Breakpt {
            line: point.line,
            locals: self.snapshot(env.locals()),
            globals: self.snapshot(env.globals()),
            watches: self
                .watches
                .iter()
                .map(|source| (source.clone(), evaluate_watch(source, env)))
                .collect(),
        };
        debug!(line = point.line, secondary = point.secondary, "pause");
        let reply = channel.request(request)?;
        if reply.data.is_some() {
            warn!(line = point.line, "breakpoint reply carried input data; ignored");
        }
        self.apply_reply(&reply);
        Ok(())
    }

    fn snapshot(&self, scope: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
        scope
            .iter()
            .filter(|(name, value)| {
                !self.config.is_reserved(name) && !value.is_callable() && !value.is_module()
            })
            .map(|(name, value)| (name.clone(), value.to_str()))
            .collect()
    }
}

/// Host for watch expressions: output and drawing go nowhere and
/// `input()` fails.
struct WatchHost;

impl Host for WatchHost {
    fn write(&mut self, _text: &str) -> EvalResult<()> {
        Ok(())
    }

    fn read_line(&mut self, _prompt: &str) -> EvalResult<String> {
        Err(EvalError::script(
            "RuntimeError",
            "input() is not available in a watch expression",
        ))
    }

    fn sleep(&mut self, _seconds: f64) -> EvalResult<()> {
        Ok(())
    }

    fn shell(&mut self, _command: &str) -> EvalResult<i64> {
        Ok(0)
    }

    fn draw(&mut self, _command: DrawCommand) -> EvalResult<()> {
        Ok(())
    }

    fn present(&mut self) -> EvalResult<()> {
        Ok(())
    }
}

/// The display form of `source` evaluated in a copy of `env`, or the error
/// it raised. Assignments made by a watch do not reach the script.
fn evaluate_watch(source: &str, env: &Environment) -> String {
    let mut evaluator = Evaluator::new(WatchHost).with_env(env.clone());
    match evaluator.eval_source_expression(source) {
        Ok(value) => value.to_str(),
        Err(err) => err.to_string(),
    }
}
