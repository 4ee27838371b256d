//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration and callers only spell out what they change.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// Names that never appear in a breakpoint snapshot, on top of dunder
/// names, callables and modules.
pub const DEFAULT_RESERVED_NAMES: &[&str] = &["time", "os", "math", "turtle", "canvas"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct EngineConfig {
    /// Names hidden from breakpoint snapshots.
    pub reserved_names: Vec<String>,

    /// Stands for a line break in literal expectations and text inputs.
    pub newline_marker: String,

    /// Matches any text in literal expectations.
    pub wildcard_marker: String,

    /// File name shown in tracebacks.
    pub script_name: String,

    /// `os.system` commands that clear the console.
    pub clear_commands: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reserved_names: DEFAULT_RESERVED_NAMES.iter().map(|s| s.to_string()).collect(),
            newline_marker: "\\n".to_string(),
            wildcard_marker: "{*}".to_string(),
            script_name: "main.py".to_string(),
            clear_commands: vec!["cls".to_string(), "clear".to_string()],
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON, filling in defaults.
    pub fn from_json(text: &str) -> EngineResult<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.newline_marker.is_empty() {
            return Err(EngineError::Config("newlineMarker must not be empty".into()));
        }
        if self.wildcard_marker.is_empty() {
            return Err(EngineError::Config("wildcardMarker must not be empty".into()));
        }
        if self.newline_marker == self.wildcard_marker {
            return Err(EngineError::Config(
                "newlineMarker and wildcardMarker must differ".into(),
            ));
        }
        Ok(())
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        (name.starts_with("__") && name.ends_with("__"))
            || self.reserved_names.iter().any(|n| n == name)
    }

    pub fn is_clear_command(&self, command: &str) -> bool {
        let command = command.trim();
        self.clear_commands.iter().any(|c| c == command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_override() {
        let config = EngineConfig::from_json(r#"{"scriptName": "task.py"}"#).unwrap();
        assert_eq!(config.script_name, "task.py");
        assert_eq!(config.wildcard_marker, "{*}");
    }

    #[test]
    fn rejects_unknown_and_invalid_fields() {
        assert!(EngineConfig::from_json(r#"{"bogus": 1}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"wildcardMarker": ""}"#).is_err());
    }

    #[test]
    fn reserved_names_include_dunders() {
        let config = EngineConfig::default();
        assert!(config.is_reserved("__name__"));
        assert!(config.is_reserved("turtle"));
        assert!(!config.is_reserved("total"));
        assert!(config.is_clear_command(" cls "));
    }
}
