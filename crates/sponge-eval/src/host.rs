use crate::env::Environment;
use crate::error::EvalResult;
use sponge_types::ast::HookPoint;
use sponge_types::draw::DrawCommand;

/// Everything a script can do to the world outside the evaluator.
///
/// The engine supplies one implementation per run mode. Errors returned here
/// propagate out of the script unchanged, so a host stops a run by returning
/// [`EvalError::Interrupted`](crate::EvalError::Interrupted) or
/// [`EvalError::InsufficientInput`](crate::EvalError::InsufficientInput).
pub trait Host {
    /// Console output. `print` passes its fully formatted text.
    fn write(&mut self, text: &str) -> EvalResult<()>;

    /// `input(prompt)`. The host is responsible for showing the prompt.
    fn read_line(&mut self, prompt: &str) -> EvalResult<String>;

    fn sleep(&mut self, seconds: f64) -> EvalResult<()>;

    /// `os.system(command)`; returns the exit status.
    fn shell(&mut self, command: &str) -> EvalResult<i64>;

    fn draw(&mut self, command: DrawCommand) -> EvalResult<()>;

    /// `canvas.present()`.
    fn present(&mut self) -> EvalResult<()>;

    /// An instrumentation callback. `env` is the scope at the hook site.
    fn hook(&mut self, point: HookPoint, env: &Environment) -> EvalResult<()> {
        let _ = (point, env);
        Ok(())
    }

    /// Polled before every statement.
    fn interrupted(&self) -> bool {
        false
    }

    /// `canvas.check_key(code)`: whether the key with virtual key code
    /// `code` is held down.
    fn key_down(&self, code: u8) -> bool {
        let _ = code;
        false
    }
}
