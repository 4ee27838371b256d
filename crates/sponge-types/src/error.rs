use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of syntax errors kept before the front end stops collecting.
pub const MAX_ERRORS: usize = 20;

/// Numeric syntax error code (E100–E199).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNTERMINATED_STRING: Self = Self(101);
    pub const INVALID_CHARACTER: Self = Self(102);
    pub const INCONSISTENT_DEDENT: Self = Self(110);
    pub const UNEXPECTED_INDENT: Self = Self(111);
    pub const EXPECTED_INDENT: Self = Self(112);
    pub const INVALID_ASSIGN_TARGET: Self = Self(120);
    pub const OUTSIDE_LOOP: Self = Self(121);
    pub const OUTSIDE_FUNCTION: Self = Self(122);
    pub const INVALID_NUMBER: Self = Self(130);

    /// The Python-style exception name reported to learners.
    pub fn kind(self) -> &'static str {
        match self {
            Self::INCONSISTENT_DEDENT | Self::UNEXPECTED_INDENT | Self::EXPECTED_INDENT => {
                "IndentationError"
            }
            _ => "SyntaxError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured syntax error from the lexer or parser.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{span}: {code} {message}")]
pub struct SpongeError {
    /// Script name (e.g. `main.py`).
    pub file: String,
    pub code: ErrorCode,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    /// The offending source line, for display.
    pub source_line: String,
}

impl SpongeError {
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            message: message.into(),
            span,
            source_line: source_line.into(),
        }
    }

    /// Render the error the way the learner-facing console shows it.
    pub fn to_traceback(&self) -> String {
        format!(
            "  File \"{}\", line {}\n    {}\n{}: {}\n",
            self.file,
            self.span.start_line,
            self.source_line.trim(),
            self.code.kind(),
            self.message
        )
    }
}

/// Errors collected over one lex + parse pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileErrors {
    pub errors: Vec<SpongeError>,
    pub total_errors: usize,
}

impl CompileErrors {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Record an error; only the first [`MAX_ERRORS`] are kept.
    pub fn push_error(&mut self, error: SpongeError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    /// Append everything from another pass.
    pub fn extend(&mut self, other: CompileErrors) {
        let extra = other.total_errors.saturating_sub(other.errors.len());
        for error in other.errors {
            self.push_error(error);
        }
        self.total_errors += extra;
    }

    pub fn first(&self) -> Option<&SpongeError> {
        self.errors.first()
    }

    pub fn is_full(&self) -> bool {
        self.total_errors >= MAX_ERRORS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(line: u32) -> SpongeError {
        SpongeError::new(
            "main.py",
            ErrorCode::UNEXPECTED_TOKEN,
            "invalid syntax",
            Span::point(line, 1),
            "print(",
        )
    }

    #[test]
    fn indentation_codes_report_indentation_error() {
        assert_eq!(ErrorCode::UNEXPECTED_INDENT.kind(), "IndentationError");
        assert_eq!(ErrorCode::UNEXPECTED_TOKEN.kind(), "SyntaxError");
        assert_eq!(ErrorCode::EXPECTED_INDENT.to_string(), "E112");
    }

    #[test]
    fn traceback_names_file_and_line() {
        let text = sample(4).to_traceback();
        assert!(text.contains("File \"main.py\", line 4"));
        assert!(text.ends_with("SyntaxError: invalid syntax\n"));
    }

    #[test]
    fn error_json_uses_line_and_column() {
        let json = serde_json::to_string(&sample(2)).unwrap();
        assert!(json.contains("\"line\":2"));
        assert!(json.contains("\"column\":1"));
        let back: SpongeError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, ErrorCode::UNEXPECTED_TOKEN);
    }

    #[test]
    fn collection_caps_stored_errors() {
        let mut errs = CompileErrors::empty();
        for i in 0..25 {
            errs.push_error(sample(i + 1));
        }
        assert_eq!(errs.errors.len(), MAX_ERRORS);
        assert_eq!(errs.total_errors, 25);
        assert!(errs.is_full());
        assert_eq!(errs.first().map(|e| e.span.start_line), Some(1));
    }

    #[test]
    fn extend_keeps_totals() {
        let mut a = CompileErrors::empty();
        a.push_error(sample(1));
        let mut b = CompileErrors::empty();
        b.push_error(sample(2));
        b.push_error(sample(3));
        a.extend(b);
        assert_eq!(a.total_errors, 3);
        assert_eq!(a.errors.len(), 3);
    }
}
