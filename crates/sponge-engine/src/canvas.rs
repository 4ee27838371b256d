//! Command stream with explicit double-buffering, and the headless dump
//! used for graphics equality.
//!
//! The stream never talks to the controller itself. Every operation hands
//! back the batch that has to be delivered (possibly empty) and the I/O
//! profile decides where it goes.

use sponge_types::draw::DrawCommand;

/// An ordered batch of commands ready for delivery.
pub type Batch = Vec<DrawCommand>;

#[derive(Debug, Default)]
pub struct CommandStream {
    buffer: Vec<DrawCommand>,
    double_buffered: bool,
}

impl CommandStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command. Without double-buffering it is flushed at once.
    pub fn push(&mut self, command: DrawCommand) -> Batch {
        self.buffer.push(command);
        if self.double_buffered {
            Batch::new()
        } else {
            self.flush()
        }
    }

    /// Flush, then keep buffering until the next `present` for the rest of
    /// the run.
    pub fn present(&mut self) -> Batch {
        let batch = self.flush();
        self.double_buffered = true;
        batch
    }

    /// Drop anything pending, leave double-buffered mode, and produce a
    /// single `clear`.
    pub fn reset(&mut self) -> Batch {
        self.buffer.clear();
        self.double_buffered = false;
        vec![DrawCommand::Reset]
    }

    pub fn flush(&mut self) -> Batch {
        std::mem::take(&mut self.buffer)
    }

    pub fn is_double_buffered(&self) -> bool {
        self.double_buffered
    }

    pub fn pending(&self) -> &[DrawCommand] {
        &self.buffer
    }
}

/// Split a batch into maximal runs of turtle and non-turtle commands,
/// keeping their order. `true` marks a turtle run.
pub fn split_turtle_runs(batch: Batch) -> Vec<(bool, Batch)> {
    let mut runs: Vec<(bool, Batch)> = Vec::new();
    for command in batch {
        let turtle = command.is_turtle();
        match runs.last_mut() {
            Some((kind, run)) if *kind == turtle => run.push(command),
            _ => runs.push((turtle, vec![command])),
        }
    }
    runs
}

// ══════════════════════════════════════════════════════════════════════════════
// Headless Dump
// ══════════════════════════════════════════════════════════════════════════════

/// Every batch a headless run delivered, concatenated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dump {
    commands: Vec<DrawCommand>,
}

impl Dump {
    pub fn record(&mut self, batch: Batch) {
        self.commands.extend(batch);
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// One JSON object per line. Two runs drew the same picture iff their
    /// canonical strings are byte-equal.
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        for command in &self.commands {
            // DrawCommand holds only strings, numbers and bools, so this
            // cannot fail.
            if let Ok(line) = serde_json::to_string(command) {
                out.push_str(&line);
            }
            out.push('\n');
        }
        out
    }
}
