//! Argument checking for builtins, module functions and methods.

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

/// Evaluated arguments of one call, with the callee's display name for
/// error messages.
#[derive(Debug, Clone)]
pub(crate) struct CallArgs {
    pub name: String,
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(name: impl Into<String>, positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            name: name.into(),
            positional,
            keywords,
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Require between `min` and `max` positional arguments.
    pub fn arity(&self, min: usize, max: usize) -> EvalResult<()> {
        let given = self.positional.len();
        if (min..=max).contains(&given) {
            return Ok(());
        }
        let expected = if min == max {
            format!("exactly {min}")
        } else if given < min {
            format!("at least {min}")
        } else {
            format!("at most {max}")
        };
        let plural = if min == max && min == 1 { "" } else { "s" };
        Err(EvalError::type_error(format!(
            "{}() takes {expected} argument{plural} ({given} given)",
            self.name
        )))
    }

    /// Remove and return a keyword argument.
    pub fn take_keyword(&mut self, key: &str) -> Option<Value> {
        let pos = self.keywords.iter().position(|(k, _)| k == key)?;
        Some(self.keywords.remove(pos).1)
    }

    /// Fail on any keyword argument that was not taken.
    pub fn finish(&self) -> EvalResult<()> {
        match self.keywords.first() {
            Some((key, _)) => Err(EvalError::type_error(format!(
                "'{key}' is an invalid keyword argument for {}()",
                self.name
            ))),
            None => Ok(()),
        }
    }

    fn missing(&self, index: usize) -> EvalError {
        EvalError::type_error(format!(
            "{}() missing required argument {}",
            self.name,
            index + 1
        ))
    }

    pub fn value(&self, index: usize) -> EvalResult<&Value> {
        self.get(index).ok_or_else(|| self.missing(index))
    }

    pub fn number(&self, index: usize) -> EvalResult<f64> {
        let value = self.value(index)?;
        value.as_float().ok_or_else(|| {
            EvalError::type_error(format!(
                "{}() argument {} must be a number, not '{}'",
                self.name,
                index + 1,
                value.type_name()
            ))
        })
    }

    pub fn int(&self, index: usize) -> EvalResult<i64> {
        let value = self.value(index)?;
        value.as_int().ok_or_else(|| {
            EvalError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                value.type_name()
            ))
        })
    }

    pub fn string(&self, index: usize) -> EvalResult<&str> {
        match self.value(index)? {
            Value::Str(s) => Ok(s),
            other => Err(EvalError::type_error(format!(
                "{}() argument {} must be str, not {}",
                self.name,
                index + 1,
                other.type_name()
            ))),
        }
    }

    /// An optional string argument that may also be passed as `None`.
    pub fn optional_string(&self, index: usize) -> EvalResult<Option<&str>> {
        match self.get(index) {
            None | Some(Value::None) => Ok(None),
            Some(_) => self.string(index).map(Some),
        }
    }
}

/// A call that takes no arguments and yields `value`.
pub(crate) fn no_args<T>(call: &CallArgs, value: T) -> EvalResult<T> {
    call.arity(0, 0)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_messages() {
        let call = CallArgs::new("len", vec![], vec![]);
        let err = call.arity(1, 1).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: len() takes exactly 1 argument (0 given)");
        let call = CallArgs::new("range", vec![Value::Int(1); 4], vec![]);
        assert!(call.arity(1, 3).unwrap_err().to_string().contains("at most 3"));
    }

    #[test]
    fn leftover_keywords_are_rejected() {
        let mut call = CallArgs::new(
            "print",
            vec![],
            vec![("sep".into(), Value::str("-")), ("bogus".into(), Value::None)],
        );
        assert_eq!(call.take_keyword("sep"), Some(Value::str("-")));
        assert!(call.finish().unwrap_err().to_string().contains("'bogus'"));
    }

    #[test]
    fn typed_accessors() {
        let call = CallArgs::new("f", vec![Value::Bool(true), Value::str("x")], vec![]);
        assert_eq!(call.int(0).unwrap(), 1);
        assert_eq!(call.number(0).unwrap(), 1.0);
        assert_eq!(call.string(1).unwrap(), "x");
        assert!(call.number(1).is_err());
        assert!(call.value(2).is_err());
        assert_eq!(call.optional_string(3).unwrap(), None);
    }

    #[test]
    fn no_args_rejects_arguments() {
        let empty = CallArgs::new("upper", vec![], vec![]);
        assert_eq!(no_args(&empty, 7).unwrap(), 7);
        let given = CallArgs::new("upper", vec![Value::Int(1)], vec![]);
        let err = no_args(&given, 7).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: upper() takes exactly 0 arguments (1 given)");
    }
}
