//! Sponge execution engine.
//!
//! Runs student scripts in three modes:
//!
//! - **debug**: the program is instrumented with breakpoint hooks and every
//!   pause, input, sleep and turtle replay is a blocking round trip with a
//!   controller over a [`Channel`].
//! - **silent**: the same effects without instrumentation.
//! - **test**: a headless run against canned inputs, graded into a
//!   [`Verdict`].
//!
//! # Example
//!
//! ```
//! use sponge_engine::{Engine, Expectation, Inputs, TestCase, VerdictKind};
//!
//! let mut engine = Engine::default();
//! let case = TestCase::new(
//!     "print('Hello')\nname = input()\nprint(name)\n",
//!     Inputs::lines(["Bob"]),
//!     Expectation::Literal("Hello\\nBob".into()),
//! );
//! assert_eq!(engine.grade(&case).kind, VerdictKind::Success);
//! ```

pub mod canvas;
pub mod channel;
pub mod config;
mod engine;
pub mod error;
pub mod grading;
pub mod instrument;
pub mod io;
pub mod session;

pub use canvas::{CommandStream, Dump};
pub use channel::{
    pair, Channel, Controller, Event, InterruptHandle, KeyState, Message, Reply, Request,
    ScriptedChannel,
};
pub use config::EngineConfig;
pub use engine::{Engine, Mode, Outcome, RunOutcome, RunRequest, StopReason};
pub use error::{ChannelError, CriterionError, EngineError, EngineResult};
pub use grading::{Criterion, Expectation, Grader, InputItem, Inputs, LiteralMatcher, TestCase, Verdict, VerdictKind};
pub use instrument::{instrument, BreakpointMap, Instrumented};
pub use session::Session;
