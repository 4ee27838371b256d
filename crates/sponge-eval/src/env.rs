//! Variable environment: module globals plus one frame per active call.

use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Locals of one function call.
#[derive(Debug, Clone, Default)]
struct Frame {
    bindings: BTreeMap<String, Value>,
    /// Names routed to module scope by `global`.
    global_names: BTreeSet<String>,
}

/// Scoped variable environment with push/pop semantics.
///
/// Lookups check the innermost frame, then globals. Assignment inside a
/// frame binds a local unless the name was declared `global`.
#[derive(Debug, Clone)]
pub struct Environment {
    globals: BTreeMap<String, Value>,
    frames: Vec<Frame>,
}

impl Environment {
    /// A fresh module scope with `__name__` set to `"__main__"`.
    pub fn new() -> Self {
        let mut globals = BTreeMap::new();
        globals.insert("__name__".to_string(), Value::str("__main__"));
        Self {
            globals,
            frames: Vec::new(),
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Number of active function calls.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_module_level(&self) -> bool {
        self.frames.is_empty()
    }

    /// Bind `name` in the current scope, honouring `global` declarations.
    pub fn assign(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if !frame.global_names.contains(name) => {
                frame.bindings.insert(name.to_string(), value);
            }
            _ => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// Bind a parameter in the innermost frame.
    pub fn define_local(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.bindings.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// `global name` inside a function. A no-op at module level.
    pub fn declare_global(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.bindings.remove(name);
            frame.global_names.insert(name.to_string());
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        if let Some(frame) = self.frames.last() {
            if !frame.global_names.contains(name) {
                if let Some(value) = frame.bindings.get(name) {
                    return Some(value);
                }
            }
        }
        self.globals.get(name)
    }

    /// Bindings of the innermost scope; the globals at module level.
    pub fn locals(&self) -> &BTreeMap<String, Value> {
        match self.frames.last() {
            Some(frame) => &frame.bindings,
            None => &self.globals,
        }
    }

    pub fn globals(&self) -> &BTreeMap<String, Value> {
        &self.globals
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_level_locals_are_globals() {
        let mut env = Environment::new();
        env.assign("x", Value::Int(1));
        assert!(env.is_module_level());
        assert_eq!(env.locals().get("x"), Some(&Value::Int(1)));
        assert_eq!(env.globals().get("__name__"), Some(&Value::str("__main__")));
    }

    #[test]
    fn frame_shadows_globals() {
        let mut env = Environment::new();
        env.assign("x", Value::Int(1));
        env.push_frame();
        env.assign("x", Value::Int(2));
        assert_eq!(env.lookup("x"), Some(&Value::Int(2)));
        assert_eq!(env.globals().get("x"), Some(&Value::Int(1)));
        env.pop_frame();
        assert_eq!(env.lookup("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn global_declaration_routes_assignment() {
        let mut env = Environment::new();
        env.assign("count", Value::Int(0));
        env.push_frame();
        env.declare_global("count");
        env.assign("count", Value::Int(5));
        assert!(env.locals().is_empty());
        env.pop_frame();
        assert_eq!(env.lookup("count"), Some(&Value::Int(5)));
    }

    #[test]
    fn frames_see_globals_but_not_each_other() {
        let mut env = Environment::new();
        env.assign("g", Value::Int(9));
        env.push_frame();
        env.define_local("a", Value::Int(1));
        env.push_frame();
        assert_eq!(env.lookup("g"), Some(&Value::Int(9)));
        assert_eq!(env.lookup("a"), None);
        assert_eq!(env.depth(), 2);
    }
}
