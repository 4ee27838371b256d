//! Native stack for script runs.
//!
//! The evaluator recurses on the Rust stack once per nested script call, so
//! [`MAX_CALL_DEPTH`](crate::MAX_CALL_DEPTH) only holds if the thread running
//! it has room for that many frames. Hosts run every script through
//! [`on_script_stack`].

use std::io;
use std::panic;
use std::thread;

/// Stack reserved for one script run. Covers `MAX_CALL_DEPTH` nested calls
/// in unoptimized builds with room for deep expressions inside each frame.
pub const SCRIPT_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Run `f` on a scoped thread with [`SCRIPT_STACK_SIZE`] bytes of stack and
/// wait for its result. A panic inside `f` resumes on the caller.
///
/// Fails only when the thread cannot be spawned; `f` is dropped unrun.
pub fn on_script_stack<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("sponge-script".to_string())
            .stack_size(SCRIPT_STACK_SIZE)
            .spawn_scoped(scope, f)?;
        match handle.join() {
            Ok(value) => Ok(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(n: u64) -> u64 {
        let pad = std::hint::black_box([0u8; 4096]);
        if n == 0 {
            0
        } else {
            depth(n - 1) + 1 + u64::from(pad[n as usize % pad.len()])
        }
    }

    #[test]
    fn returns_closure_value() {
        assert_eq!(on_script_stack(|| 6 * 7).unwrap(), 42);
    }

    #[test]
    fn borrows_from_caller() {
        let mut seen = Vec::new();
        on_script_stack(|| seen.push(1)).unwrap();
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn deep_native_recursion_fits() {
        // 8 MiB of frames would overflow a default test thread.
        assert_eq!(on_script_stack(|| depth(2048)).unwrap(), 2048);
    }
}
