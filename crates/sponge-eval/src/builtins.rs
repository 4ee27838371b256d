//! Builtin functions and exception constructors.

use crate::args::CallArgs;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::host::Host;
use crate::ops;
use crate::value::{ExceptionValue, Value};
use std::cmp::Ordering;
use std::rc::Rc;

const FUNCTIONS: &[&str] = &[
    "print", "input", "len", "range", "str", "int", "float", "bool", "list", "abs", "min", "max",
    "round", "sum", "sorted", "open",
];

const EXCEPTIONS: &[&str] = &[
    "Exception",
    "ValueError",
    "TypeError",
    "ZeroDivisionError",
    "IndexError",
    "KeyError",
    "NameError",
    "AttributeError",
    "OverflowError",
    "RuntimeError",
    "RecursionError",
    "MemoryError",
    "FileNotFoundError",
];

pub(crate) fn is_builtin(name: &str) -> bool {
    FUNCTIONS.contains(&name) || is_exception(name)
}

pub(crate) fn is_exception(name: &str) -> bool {
    EXCEPTIONS.contains(&name)
}

pub(crate) fn call<H: Host>(
    eval: &mut Evaluator<H>,
    name: &str,
    mut call: CallArgs,
) -> EvalResult<Value> {
    if is_exception(name) {
        call.finish()?;
        let message = call.get(0).map(Value::to_str).unwrap_or_default();
        return Ok(Value::Exception(Rc::new(ExceptionValue {
            kind: name.to_string(),
            message,
        })));
    }

    match name {
        "print" => {
            let sep = separator(&mut call, "sep", " ")?;
            let end = separator(&mut call, "end", "\n")?;
            call.finish()?;
            let parts: Vec<String> = call.positional.iter().map(Value::to_str).collect();
            let mut text = parts.join(&sep);
            text.push_str(&end);
            eval.host.write(&text)?;
            Ok(Value::None)
        }
        "input" => {
            call.finish()?;
            call.arity(0, 1)?;
            let prompt = call.get(0).map(Value::to_str).unwrap_or_default();
            eval.host.read_line(&prompt).map(Value::Str)
        }
        "len" => {
            call.finish()?;
            call.arity(1, 1)?;
            let len = match call.value(0)? {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.borrow().len(),
                other => {
                    return Err(EvalError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            i64::try_from(len).map(Value::Int).map_err(|_| EvalError::overflow())
        }
        "range" => Range::from_call(&call)?.materialize(),
        "str" => {
            call.finish()?;
            call.arity(0, 1)?;
            Ok(Value::Str(call.get(0).map(Value::to_str).unwrap_or_default()))
        }
        "int" => {
            call.finish()?;
            call.arity(0, 2)?;
            to_int(&call)
        }
        "float" => {
            call.finish()?;
            call.arity(0, 1)?;
            to_float(call.get(0))
        }
        "bool" => {
            call.finish()?;
            call.arity(0, 1)?;
            Ok(Value::Bool(call.get(0).is_some_and(Value::truthy)))
        }
        "list" => {
            call.finish()?;
            call.arity(0, 1)?;
            match call.get(0) {
                Some(value) => eval.iterate(value).map(Value::list),
                None => Ok(Value::list(Vec::new())),
            }
        }
        "abs" => {
            call.finish()?;
            call.arity(1, 1)?;
            match call.value(0)? {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                v => match v.as_int() {
                    Some(n) => n.checked_abs().map(Value::Int).ok_or_else(EvalError::overflow),
                    None => Err(EvalError::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        v.type_name()
                    ))),
                },
            }
        }
        "min" | "max" => {
            call.finish()?;
            call.arity(1, usize::MAX)?;
            let items = if call.len() == 1 {
                eval.iterate(call.value(0)?)?
            } else {
                call.positional.clone()
            };
            let wanted = if name == "min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut iter = items.into_iter();
            let mut best = iter.next().ok_or_else(|| {
                EvalError::value_error(format!("{name}() arg is an empty sequence"))
            })?;
            for item in iter {
                if ops::order(&item, &best)? == wanted {
                    best = item;
                }
            }
            Ok(best)
        }
        "round" => {
            let ndigits = call.take_keyword("ndigits");
            call.finish()?;
            call.arity(1, 2)?;
            let ndigits = match call.get(1).or(ndigits.as_ref()) {
                None | Some(Value::None) => None,
                Some(v) => Some(v.as_int().ok_or_else(|| {
                    EvalError::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        v.type_name()
                    ))
                })?),
            };
            round(call.value(0)?, ndigits)
        }
        "sum" => {
            call.finish()?;
            call.arity(1, 2)?;
            let mut total = call.get(1).cloned().unwrap_or(Value::Int(0));
            for item in eval.iterate(call.value(0)?)? {
                total = ops::binary(sponge_types::ast::BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        "sorted" => {
            let reverse = call.take_keyword("reverse").is_some_and(|v| v.truthy());
            call.finish()?;
            call.arity(1, 1)?;
            let mut items = eval.iterate(call.value(0)?)?;
            sort_values(&mut items, reverse)?;
            Ok(Value::list(items))
        }
        "open" => {
            let mode = call.take_keyword("mode");
            call.finish()?;
            call.arity(1, 2)?;
            let file = call.string(0)?.to_string();
            let mode = match call.get(1).or(mode.as_ref()) {
                None => "r".to_string(),
                Some(Value::Str(mode)) => mode.replace('t', ""),
                Some(other) => {
                    return Err(EvalError::type_error(format!(
                        "open() argument 'mode' must be str, not {}",
                        other.type_name()
                    )))
                }
            };
            eval.open_file(&file, &mode).map(Value::File)
        }
        other => Err(EvalError::script(
            "NameError",
            format!("name '{other}' is not defined"),
        )),
    }
}

/// `sep=` / `end=` for `print`: `None` means the default.
fn separator(call: &mut CallArgs, key: &str, default: &str) -> EvalResult<String> {
    match call.take_keyword(key) {
        None | Some(Value::None) => Ok(default.to_string()),
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(EvalError::type_error(format!(
            "{key} must be None or a string, not {}",
            other.type_name()
        ))),
    }
}

/// The integers of `range(start, stop, step)`, produced on demand. A `for`
/// loop over `range(...)` walks one of these directly; any other use
/// materializes it as a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Range {
    next: Option<i64>,
    stop: i64,
    step: i64,
}

impl Range {
    pub(crate) fn from_call(call: &CallArgs) -> EvalResult<Self> {
        call.finish()?;
        call.arity(1, 3)?;
        let (start, stop, step) = match call.len() {
            1 => (0, call.int(0)?, 1),
            2 => (call.int(0)?, call.int(1)?, 1),
            _ => (call.int(0)?, call.int(1)?, call.int(2)?),
        };
        Self::new(start, stop, step)
    }

    pub(crate) fn new(start: i64, stop: i64, step: i64) -> EvalResult<Self> {
        if step == 0 {
            return Err(EvalError::value_error("range() arg 3 must not be zero"));
        }
        Ok(Self {
            next: Some(start),
            stop,
            step,
        })
    }

    /// Items left to produce.
    pub(crate) fn remaining(&self) -> u128 {
        let Some(next) = self.next else {
            return 0;
        };
        let (next, stop, step) = (i128::from(next), i128::from(self.stop), i128::from(self.step));
        let span = if step > 0 { stop - next } else { next - stop };
        if span <= 0 {
            return 0;
        }
        let step = step.unsigned_abs();
        (span.unsigned_abs() - 1) / step + 1
    }

    fn materialize(self) -> EvalResult<Value> {
        if self.remaining() > ops::MAX_SEQUENCE_LEN as u128 {
            return Err(EvalError::script(
                "MemoryError",
                "range is too large to build as a list",
            ));
        }
        Ok(Value::list(self.map(Value::Int).collect()))
    }
}

impl Iterator for Range {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let current = self.next?;
        let more = if self.step > 0 {
            current < self.stop
        } else {
            current > self.stop
        };
        if !more {
            self.next = None;
            return None;
        }
        self.next = current.checked_add(self.step);
        Some(current)
    }
}

/// Truncate a float toward zero, as `int(x)` does.
pub(crate) fn float_to_int(f: f64) -> EvalResult<i64> {
    if f.is_nan() {
        return Err(EvalError::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(EvalError::script(
            "OverflowError",
            "cannot convert float infinity to integer",
        ));
    }
    let truncated = f.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(EvalError::overflow());
    }
    Ok(truncated as i64)
}

fn to_int(call: &CallArgs) -> EvalResult<Value> {
    let Some(value) = call.get(0) else {
        return Ok(Value::Int(0));
    };
    let base = match call.get(1) {
        Some(_) => Some(call.int(1)?),
        None => None,
    };
    match (value, base) {
        (Value::Str(s), base) => {
            let base = base.unwrap_or(10);
            if !(2..=36).contains(&base) {
                return Err(EvalError::value_error("int() base must be >= 2 and <= 36"));
            }
            let digits = s.trim().replace('_', "");
            let radix = u32::try_from(base).unwrap_or(10);
            i64::from_str_radix(&digits, radix)
                .map(Value::Int)
                .map_err(|_| {
                    EvalError::value_error(format!(
                        "invalid literal for int() with base {base}: {}",
                        value.repr()
                    ))
                })
        }
        (_, Some(_)) => Err(EvalError::type_error(
            "int() can't convert non-string with explicit base",
        )),
        (Value::Float(f), None) => float_to_int(*f).map(Value::Int),
        (v, None) => v.as_int().map(Value::Int).ok_or_else(|| {
            EvalError::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                v.type_name()
            ))
        }),
    }
}

fn to_float(value: Option<&Value>) -> EvalResult<Value> {
    match value {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => s
            .trim()
            .replace('_', "")
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| {
                EvalError::value_error(format!(
                    "could not convert string to float: {}",
                    Value::str(s.as_str()).repr()
                ))
            }),
        Some(v) => v.as_float().map(Value::Float).ok_or_else(|| {
            EvalError::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                v.type_name()
            ))
        }),
    }
}

/// `round(x[, ndigits])` with ties to even.
fn round(value: &Value, ndigits: Option<i64>) -> EvalResult<Value> {
    match (value, ndigits) {
        (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Value::Float(f), Some(n)) => {
            if !f.is_finite() {
                return Ok(Value::Float(*f));
            }
            let exponent = i32::try_from(n.clamp(-308, 308)).unwrap_or(0);
            let factor = 10f64.powi(exponent);
            Ok(Value::Float((f * factor).round_ties_even() / factor))
        }
        (v, _) => v.as_int().map(Value::Int).ok_or_else(|| {
            EvalError::type_error(format!(
                "type {} doesn't define __round__ method",
                v.type_name()
            ))
        }),
    }
}

/// Stable sort shared by `sorted` and `list.sort`.
pub(crate) fn sort_values(items: &mut [Value], reverse: bool) -> EvalResult<()> {
    let mut failure = None;
    items.sort_by(|a, b| {
        let ordering = if reverse {
            ops::order(b, a)
        } else {
            ops::order(a, b)
        };
        ordering.unwrap_or_else(|err| {
            failure.get_or_insert(err);
            Ordering::Equal
        })
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_handles_negative_steps() {
        let Value::List(items) = Range::new(5, 0, -2).unwrap().materialize().unwrap() else {
            panic!("range returns a list");
        };
        assert_eq!(
            *items.borrow(),
            vec![Value::Int(5), Value::Int(3), Value::Int(1)]
        );
        assert!(Range::new(0, 3, 0).is_err());
    }

    #[test]
    fn range_counts_without_building() {
        assert_eq!(Range::new(0, 10, 3).unwrap().remaining(), 4);
        assert_eq!(Range::new(3, 0, 1).unwrap().remaining(), 0);
        assert_eq!(Range::new(0, 10_000_000_000, 1).unwrap().remaining(), 10_000_000_000);
        assert_eq!(
            Range::new(i64::MIN, i64::MAX, 1).unwrap().remaining(),
            u128::from(u64::MAX)
        );
        let mut walk = Range::new(0, 10_000_000_000, 1).unwrap();
        assert_eq!(walk.next(), Some(0));
        assert_eq!(walk.remaining(), 9_999_999_999);
    }

    #[test]
    fn range_stops_at_integer_limit() {
        let tail: Vec<i64> = Range::new(i64::MAX - 2, i64::MAX, 5).unwrap().collect();
        assert_eq!(tail, vec![i64::MAX - 2]);
    }

    #[test]
    fn huge_range_as_value_is_a_memory_error() {
        let err = Range::new(0, 10_000_000_000, 1).unwrap().materialize().unwrap_err();
        assert_eq!(err.kind(), Some("MemoryError"));
    }

    #[test]
    fn round_ties_to_even() {
        assert_eq!(round(&Value::Float(2.5), None).unwrap(), Value::Int(2));
        assert_eq!(round(&Value::Float(3.5), None).unwrap(), Value::Int(4));
        assert_eq!(round(&Value::Float(1.25), Some(1)).unwrap(), Value::Float(1.2));
        assert_eq!(round(&Value::Int(7), Some(2)).unwrap(), Value::Int(7));
    }

    #[test]
    fn int_conversion() {
        let call = CallArgs::new("int", vec![Value::str(" 42 ")], vec![]);
        assert_eq!(to_int(&call).unwrap(), Value::Int(42));
        let call = CallArgs::new("int", vec![Value::str("ff"), Value::Int(16)], vec![]);
        assert_eq!(to_int(&call).unwrap(), Value::Int(255));
        let call = CallArgs::new("int", vec![Value::Float(-2.9)], vec![]);
        assert_eq!(to_int(&call).unwrap(), Value::Int(-2));
        let call = CallArgs::new("int", vec![Value::str("abc")], vec![]);
        let err = to_int(&call).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: invalid literal for int() with base 10: 'abc'"
        );
    }

    #[test]
    fn float_conversion() {
        assert_eq!(to_float(Some(&Value::str("2.5"))).unwrap(), Value::Float(2.5));
        assert_eq!(to_float(Some(&Value::Int(3))).unwrap(), Value::Float(3.0));
        assert!(to_float(Some(&Value::str("two"))).is_err());
    }

    #[test]
    fn sort_is_stable_in_reverse_and_reports_mixed_types() {
        let mut items = vec![Value::Int(1), Value::Float(1.0), Value::Int(3)];
        sort_values(&mut items, true).unwrap();
        assert_eq!(items, vec![Value::Int(3), Value::Int(1), Value::Float(1.0)]);
        let mut mixed = vec![Value::Int(1), Value::str("a")];
        assert!(sort_values(&mut mixed, false).is_err());
    }
}
