//! I/O profiles: where a script's console, input, sleep, shell and drawing
//! effects land for each run mode.
//!
//! - [`ChannelHost`] serves debug and silent runs. Effects travel over a
//!   [`Channel`]; with a [`Session`] attached it also services breakpoint
//!   hooks.
//! - [`TestHost`] serves grading. Everything is captured in memory and no
//!   effect leaves the process.
//!
//! Both are built fresh for every run.

use crate::canvas::{split_turtle_runs, Batch, CommandStream, Dump};
use crate::channel::{Channel, Event, Request};
use crate::config::EngineConfig;
use crate::error::ChannelError;
use crate::session::Session;
use sponge_eval::{Environment, EvalError, EvalResult, Host};
use sponge_types::ast::HookPoint;
use sponge_types::draw::DrawCommand;
use std::collections::VecDeque;
use tracing::{debug, warn};

fn channel_error(err: ChannelError) -> EvalError {
    match err {
        ChannelError::Interrupted => {
            warn!("run interrupted while waiting on the controller");
            EvalError::Interrupted
        }
        other => EvalError::Host(other.to_string()),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Debug / Silent
// ══════════════════════════════════════════════════════════════════════════════

pub struct ChannelHost<'c> {
    channel: &'c mut dyn Channel,
    session: Option<Session>,
    stream: CommandStream,
    config: EngineConfig,
}

impl<'c> ChannelHost<'c> {
    /// A debug host when `session` is present, a silent one otherwise.
    pub fn new(channel: &'c mut dyn Channel, session: Option<Session>, config: &EngineConfig) -> Self {
        Self {
            channel,
            session,
            stream: CommandStream::new(),
            config: config.clone(),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn stream(&self) -> &CommandStream {
        &self.stream
    }

    /// Clear the surface at the start of a run.
    pub fn reset_surface(&mut self) -> Result<(), ChannelError> {
        let batch = self.stream.reset();
        self.deliver(batch)
    }

    /// Canvas runs go out as `draw` events; turtle runs block until the
    /// controller has replayed them.
    fn deliver(&mut self, batch: Batch) -> Result<(), ChannelError> {
        for (turtle, commands) in split_turtle_runs(batch) {
            if turtle {
                debug!(commands = commands.len(), "turtle request");
                self.channel.request(Request::Turtle { commands })?;
            } else {
                self.channel.notify(Event::Draw { commands })?;
            }
        }
        Ok(())
    }
}

impl Host for ChannelHost<'_> {
    fn write(&mut self, text: &str) -> EvalResult<()> {
        self.channel
            .notify(Event::Print {
                msg: text.to_string(),
            })
            .map_err(channel_error)
    }

    fn read_line(&mut self, prompt: &str) -> EvalResult<String> {
        if !prompt.is_empty() {
            self.write(prompt)?;
        }
        debug!("input request");
        let reply = self
            .channel
            .request(Request::Input {
                prompt: prompt.to_string(),
            })
            .map_err(channel_error)?;
        if let (Some(session), Some(lines)) = (self.session.as_mut(), &reply.breakpoints) {
            session.replace_breakpoints(lines.iter().copied());
        }
        match reply.data {
            Some(data) => Ok(data),
            None => {
                warn!("input reply carried no data; treating as empty line");
                Ok(String::new())
            }
        }
    }

    fn sleep(&mut self, seconds: f64) -> EvalResult<()> {
        debug!(seconds, "sleep request");
        self.channel
            .request(Request::Sleep { duration: seconds })
            .map(|_| ())
            .map_err(channel_error)
    }

    fn shell(&mut self, command: &str) -> EvalResult<i64> {
        if self.config.is_clear_command(command) {
            self.channel.notify(Event::Cls).map_err(channel_error)?;
        }
        Ok(0)
    }

    fn draw(&mut self, command: DrawCommand) -> EvalResult<()> {
        let batch = self.stream.push(command);
        self.deliver(batch).map_err(channel_error)
    }

    fn present(&mut self) -> EvalResult<()> {
        let batch = self.stream.present();
        self.deliver(batch).map_err(channel_error)
    }

    fn hook(&mut self, point: HookPoint, env: &Environment) -> EvalResult<()> {
        match self.session.as_mut() {
            Some(session) => session
                .hit(point, env, &mut *self.channel)
                .map_err(channel_error),
            None => Ok(()),
        }
    }

    fn interrupted(&self) -> bool {
        self.channel.interrupted()
    }

    fn key_down(&self, code: u8) -> bool {
        self.channel.key_down(code)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Test
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct TestHost {
    output: String,
    inputs: VecDeque<String>,
    stream: CommandStream,
    dump: Dump,
}

impl TestHost {
    pub fn new(inputs: impl IntoIterator<Item = String>) -> Self {
        let mut host = Self {
            inputs: inputs.into_iter().collect(),
            ..Self::default()
        };
        host.reset_surface();
        host
    }

    pub fn reset_surface(&mut self) {
        let batch = self.stream.reset();
        self.dump.record(batch);
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn remaining_inputs(&self) -> &VecDeque<String> {
        &self.inputs
    }

    pub fn dump(&self) -> &Dump {
        &self.dump
    }
}

impl Host for TestHost {
    fn write(&mut self, text: &str) -> EvalResult<()> {
        self.output.push_str(text);
        Ok(())
    }

    fn read_line(&mut self, prompt: &str) -> EvalResult<String> {
        self.output.push_str(prompt);
        self.inputs.pop_front().ok_or(EvalError::InsufficientInput)
    }

    fn sleep(&mut self, _seconds: f64) -> EvalResult<()> {
        Ok(())
    }

    fn shell(&mut self, _command: &str) -> EvalResult<i64> {
        Ok(0)
    }

    fn draw(&mut self, command: DrawCommand) -> EvalResult<()> {
        let batch = self.stream.push(command);
        self.dump.record(batch);
        Ok(())
    }

    fn present(&mut self) -> EvalResult<()> {
        let batch = self.stream.present();
        self.dump.record(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Message, Reply, ScriptedChannel};

    #[test]
    fn test_host_pops_inputs_and_echoes_prompt() {
        let mut host = TestHost::new(vec!["Bob".to_string()]);
        assert_eq!(host.read_line("Name? ").unwrap(), "Bob");
        assert!(matches!(host.read_line(""), Err(EvalError::InsufficientInput)));
        assert_eq!(host.output(), "Name? ");
    }

    #[test]
    fn test_host_starts_with_single_clear() {
        let host = TestHost::new(Vec::new());
        assert_eq!(host.dump().commands(), &[DrawCommand::Reset]);
    }

    #[test]
    fn channel_host_routes_turtle_and_canvas() {
        let mut channel = ScriptedChannel::new(|_| Ok(Reply::resume()));
        {
            let mut host = ChannelHost::new(&mut channel, None, &EngineConfig::default());
            host.draw(DrawCommand::Forward { value: 5.0 }).unwrap();
            host.draw(DrawCommand::Stroke).unwrap();
        }
        assert_eq!(
            channel.transcript(),
            &[
                Message::Request(Request::Turtle {
                    commands: vec![DrawCommand::Forward { value: 5.0 }]
                }),
                Message::Event(Event::Draw {
                    commands: vec![DrawCommand::Stroke]
                }),
            ]
        );
    }

    #[test]
    fn channel_host_input_echoes_prompt_and_updates_session() {
        use crate::instrument::BreakpointMap;

        let map = BreakpointMap::from_hooked_lines(&[1, 3].into_iter().collect());
        let session = Session::new(map, Vec::new());
        let mut channel = ScriptedChannel::new(|request| match request {
            Request::Input { .. } => Ok(Reply::data("42").with_breakpoints(vec![2])),
            _ => Ok(Reply::resume()),
        });
        let mut host = ChannelHost::new(&mut channel, Some(session), &EngineConfig::default());
        assert_eq!(host.read_line("n: ").unwrap(), "42");
        let active: Vec<u32> = host
            .session()
            .map(|s| s.active_breakpoints().iter().copied().collect())
            .unwrap_or_default();
        assert_eq!(active, vec![3]);
        drop(host);
        assert_eq!(channel.printed(), "n: ");
    }

    #[test]
    fn shell_clear_only_for_clear_commands() {
        let mut channel = ScriptedChannel::new(|_| Ok(Reply::resume()));
        {
            let mut host = ChannelHost::new(&mut channel, None, &EngineConfig::default());
            host.shell("ls").unwrap();
            host.shell("cls").unwrap();
        }
        assert_eq!(channel.events().collect::<Vec<_>>(), vec![&Event::Cls]);
    }

    #[test]
    fn channel_host_reads_key_state() {
        let mut channel = ScriptedChannel::new(|_| Ok(Reply::resume())).with_keys_down([39]);
        let host = ChannelHost::new(&mut channel, None, &EngineConfig::default());
        assert!(host.key_down(39));
        assert!(!host.key_down(37));
        assert!(!TestHost::new(Vec::new()).key_down(39));
    }

    #[test]
    fn interrupt_during_sleep_is_terminal() {
        let mut channel = ScriptedChannel::new(|_| Err(ChannelError::Interrupted));
        let mut host = ChannelHost::new(&mut channel, None, &EngineConfig::default());
        assert!(matches!(host.sleep(1.0), Err(EvalError::Interrupted)));
    }
}
