//! Synchronous channel between a running script and its controller.
//!
//! Requests block until the controller answers; events are fire-and-forget.
//! The engine never has more than one request in flight because
//! [`Channel::request`] takes `&mut self` and does not return until the
//! reply arrives.

use crate::error::ChannelError;
use serde::{Deserialize, Serialize};
use sponge_types::draw::DrawCommand;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

// ══════════════════════════════════════════════════════════════════════════════
// Wire Types
// ══════════════════════════════════════════════════════════════════════════════

/// Non-blocking notification to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Event {
    Print { msg: String },
    Cls,
    Draw { commands: Vec<DrawCommand> },
}

/// Blocking request; the run is suspended until the controller replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Request {
    /// A breakpoint pause with the visible variables in display form.
    /// `watches` maps each watch expression to its value or error text.
    Breakpt {
        line: u32,
        locals: BTreeMap<String, String>,
        globals: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        watches: BTreeMap<String, String>,
    },
    Input { prompt: String },
    /// Sleep for `duration` seconds; the reply content is ignored.
    Sleep { duration: f64 },
    /// Replay turtle commands; the controller replies once they are drawn.
    Turtle { commands: Vec<DrawCommand> },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Breakpt { .. } => "breakpt",
            Request::Input { .. } => "input",
            Request::Sleep { .. } => "sleep",
            Request::Turtle { .. } => "turtle",
        }
    }
}

/// The controller's answer to a [`Request`]. Every field is optional on
/// the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Reply {
    /// Pause again at the very next hook.
    pub step: bool,
    /// Replacement breakpoint set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<Vec<u32>>,
    /// Replacement watch expressions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watches: Option<Vec<String>>,
    /// Text typed in answer to an input request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Reply {
    pub fn resume() -> Self {
        Self::default()
    }

    pub fn step() -> Self {
        Self {
            step: true,
            ..Self::default()
        }
    }

    pub fn data(text: impl Into<String>) -> Self {
        Self {
            data: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_breakpoints(mut self, lines: Vec<u32>) -> Self {
        self.breakpoints = Some(lines);
        self
    }

    pub fn with_watches(mut self, watches: Vec<String>) -> Self {
        self.watches = Some(watches);
        self
    }
}

/// Everything the engine sends, in program order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Event(Event),
}

// ══════════════════════════════════════════════════════════════════════════════
// Channel Trait
// ══════════════════════════════════════════════════════════════════════════════

pub trait Channel: Send {
    /// Send `request` and block until the controller replies.
    fn request(&mut self, request: Request) -> Result<Reply, ChannelError>;

    /// Send `event` without waiting.
    fn notify(&mut self, event: Event) -> Result<(), ChannelError>;

    /// Whether the controller has asked the run to stop. Polled between
    /// statements.
    fn interrupted(&self) -> bool {
        false
    }

    /// Whether the key with virtual key code `code` is held down.
    fn key_down(&self, code: u8) -> bool {
        let _ = code;
        false
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Key State
// ══════════════════════════════════════════════════════════════════════════════

/// Held-down flags for the 256 virtual key codes, shared between the
/// controller that sees key events and the running script.
#[derive(Clone)]
pub struct KeyState {
    keys: Arc<[AtomicBool; 256]>,
}

impl Default for KeyState {
    fn default() -> Self {
        Self {
            keys: Arc::new(std::array::from_fn(|_| AtomicBool::new(false))),
        }
    }
}

impl KeyState {
    /// Code 0 is never reported as held.
    pub fn press(&self, code: u8) {
        if code > 0 {
            self.keys[usize::from(code)].store(true, Ordering::SeqCst);
        }
    }

    pub fn release(&self, code: u8) {
        self.keys[usize::from(code)].store(false, Ordering::SeqCst);
    }

    pub fn is_down(&self, code: u8) -> bool {
        self.keys[usize::from(code)].load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let held: Vec<u8> = (0..=u8::MAX).filter(|code| self.is_down(*code)).collect();
        f.debug_struct("KeyState").field("held", &held).finish()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Thread Transport
// ══════════════════════════════════════════════════════════════════════════════

enum Answer {
    Reply(Reply),
    Interrupt,
}

/// Create a connected engine endpoint and controller endpoint.
pub fn pair() -> (ThreadChannel, Controller) {
    let (message_tx, message_rx) = mpsc::channel();
    let (answer_tx, answer_rx) = mpsc::channel();
    let flag = Arc::new(AtomicBool::new(false));
    let keys = KeyState::default();
    let engine = ThreadChannel {
        messages: message_tx,
        answers: answer_rx,
        interrupt: Arc::clone(&flag),
        keys: keys.clone(),
    };
    let controller = Controller {
        messages: message_rx,
        answers: answer_tx.clone(),
        keys,
        interrupt: InterruptHandle {
            flag,
            wake: answer_tx,
        },
    };
    (engine, controller)
}

/// Engine side of [`pair`].
pub struct ThreadChannel {
    messages: Sender<Message>,
    answers: Receiver<Answer>,
    interrupt: Arc<AtomicBool>,
    keys: KeyState,
}

impl Channel for ThreadChannel {
    fn request(&mut self, request: Request) -> Result<Reply, ChannelError> {
        if self.interrupted() {
            return Err(ChannelError::Interrupted);
        }
        self.messages
            .send(Message::Request(request))
            .map_err(|_| ChannelError::Disconnected)?;
        match self.answers.recv() {
            Ok(Answer::Reply(reply)) => Ok(reply),
            Ok(Answer::Interrupt) => Err(ChannelError::Interrupted),
            Err(_) => Err(ChannelError::Disconnected),
        }
    }

    fn notify(&mut self, event: Event) -> Result<(), ChannelError> {
        self.messages
            .send(Message::Event(event))
            .map_err(|_| ChannelError::Disconnected)
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    fn key_down(&self, code: u8) -> bool {
        self.keys.is_down(code)
    }
}

/// Controller side of [`pair`]. Can be moved to another thread.
pub struct Controller {
    messages: Receiver<Message>,
    answers: Sender<Answer>,
    keys: KeyState,
    interrupt: InterruptHandle,
}

impl Controller {
    /// Block until the engine sends something. `None` once the engine
    /// endpoint is dropped.
    pub fn recv(&self) -> Option<Message> {
        self.messages.recv().ok()
    }

    /// Answer the pending request.
    pub fn reply(&self, reply: Reply) -> Result<(), ChannelError> {
        self.answers
            .send(Answer::Reply(reply))
            .map_err(|_| ChannelError::Disconnected)
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Feed key events here; `canvas.check_key` reads them.
    pub fn key_state(&self) -> KeyState {
        self.keys.clone()
    }
}

/// Stops a run from any thread, waking a pending request.
#[derive(Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
    wake: Sender<Answer>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // The engine may already be gone; the flag alone is enough then.
        let _ = self.wake.send(Answer::Interrupt);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Scripted Transport
// ══════════════════════════════════════════════════════════════════════════════

/// In-process controller driven by a closure. Records every message in
/// order, which makes it the transport of choice for tests.
pub struct ScriptedChannel<F>
where
    F: FnMut(&Request) -> Result<Reply, ChannelError>,
{
    respond: F,
    transcript: Vec<Message>,
    keys: KeyState,
}

impl<F> ScriptedChannel<F>
where
    F: FnMut(&Request) -> Result<Reply, ChannelError>,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            transcript: Vec::new(),
            keys: KeyState::default(),
        }
    }

    /// Report `codes` as held for the whole run.
    pub fn with_keys_down(self, codes: impl IntoIterator<Item = u8>) -> Self {
        for code in codes {
            self.keys.press(code);
        }
        self
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn requests(&self) -> impl Iterator<Item = &Request> {
        self.transcript.iter().filter_map(|m| match m {
            Message::Request(r) => Some(r),
            Message::Event(_) => None,
        })
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.transcript.iter().filter_map(|m| match m {
            Message::Event(e) => Some(e),
            Message::Request(_) => None,
        })
    }

    /// Concatenated `print` events.
    pub fn printed(&self) -> String {
        self.events()
            .filter_map(|e| match e {
                Event::Print { msg } => Some(msg.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Lines of every breakpoint pause, in order.
    pub fn pauses(&self) -> Vec<u32> {
        self.requests()
            .filter_map(|r| match r {
                Request::Breakpt { line, .. } => Some(*line),
                _ => None,
            })
            .collect()
    }
}

impl<F> Channel for ScriptedChannel<F>
where
    F: FnMut(&Request) -> Result<Reply, ChannelError> + Send,
{
    fn request(&mut self, request: Request) -> Result<Reply, ChannelError> {
        let reply = (self.respond)(&request);
        self.transcript.push(Message::Request(request));
        reply
    }

    fn notify(&mut self, event: Event) -> Result<(), ChannelError> {
        self.transcript.push(Message::Event(event));
        Ok(())
    }

    fn key_down(&self, code: u8) -> bool {
        self.keys.is_down(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wire_shapes() {
        let pause = Request::Breakpt {
            line: 3,
            locals: BTreeMap::from([("x".to_string(), "1".to_string())]),
            globals: BTreeMap::new(),
            watches: BTreeMap::new(),
        };
        assert_eq!(
            serde_json::to_string(&pause).unwrap(),
            r#"{"cmd":"breakpt","line":3,"locals":{"x":"1"},"globals":{}}"#
        );
        assert_eq!(
            serde_json::to_string(&Event::Print { msg: "hi".into() }).unwrap(),
            r#"{"cmd":"print","msg":"hi"}"#
        );
        assert_eq!(serde_json::to_string(&Event::Cls).unwrap(), r#"{"cmd":"cls"}"#);
    }

    #[test]
    fn reply_fields_are_optional() {
        let reply: Reply = serde_json::from_str("{}").unwrap();
        assert_eq!(reply, Reply::resume());
        let reply: Reply = serde_json::from_str(r#"{"step":true,"breakpoints":[2,4]}"#).unwrap();
        assert_eq!(reply, Reply::step().with_breakpoints(vec![2, 4]));
        let reply: Reply = serde_json::from_str(r#"{"watches":["x + 1"]}"#).unwrap();
        assert_eq!(reply, Reply::resume().with_watches(vec!["x + 1".into()]));
    }

    #[test]
    fn pause_lists_watches_when_present() {
        let pause = Request::Breakpt {
            line: 1,
            locals: BTreeMap::new(),
            globals: BTreeMap::new(),
            watches: BTreeMap::from([("n * 2".to_string(), "8".to_string())]),
        };
        assert_eq!(
            serde_json::to_string(&pause).unwrap(),
            r#"{"cmd":"breakpt","line":1,"locals":{},"globals":{},"watches":{"n * 2":"8"}}"#
        );
    }

    #[test]
    fn key_state_is_shared_with_engine() {
        let (engine, controller) = pair();
        let keys = controller.key_state();
        keys.press(39);
        assert!(engine.key_down(39));
        assert!(!engine.key_down(37));
        keys.release(39);
        assert!(!engine.key_down(39));
        keys.press(0);
        assert!(!engine.key_down(0));
    }

    #[test]
    fn thread_pair_round_trip() {
        let (mut engine, controller) = pair();
        let worker = thread::spawn(move || {
            engine.notify(Event::Print { msg: "?".into() }).unwrap();
            engine.request(Request::Input { prompt: String::new() })
        });
        assert_eq!(
            controller.recv(),
            Some(Message::Event(Event::Print { msg: "?".into() }))
        );
        assert!(matches!(
            controller.recv(),
            Some(Message::Request(Request::Input { .. }))
        ));
        controller.reply(Reply::data("Bob")).unwrap();
        assert_eq!(worker.join().unwrap(), Ok(Reply::data("Bob")));
    }

    #[test]
    fn interrupt_wakes_pending_request() {
        let (mut engine, controller) = pair();
        let handle = controller.interrupt_handle();
        let worker = thread::spawn(move || engine.request(Request::Sleep { duration: 60.0 }));
        assert!(controller.recv().is_some());
        handle.interrupt();
        assert_eq!(worker.join().unwrap(), Err(ChannelError::Interrupted));
    }

    #[test]
    fn dropped_controller_disconnects() {
        let (mut engine, controller) = pair();
        drop(controller);
        assert_eq!(
            engine.request(Request::Sleep { duration: 0.0 }),
            Err(ChannelError::Disconnected)
        );
    }

    #[test]
    fn scripted_channel_records_in_order() {
        let mut channel = ScriptedChannel::new(|_| Ok(Reply::resume()));
        channel.notify(Event::Print { msg: "a".into() }).unwrap();
        channel.request(Request::Sleep { duration: 1.0 }).unwrap();
        channel.notify(Event::Print { msg: "b".into() }).unwrap();
        assert_eq!(channel.transcript().len(), 3);
        assert_eq!(channel.printed(), "ab");
        assert_eq!(channel.requests().count(), 1);
    }
}
