//! Methods on strings, lists and file handles.

use crate::args::{no_args, CallArgs};
use crate::builtins::sort_values;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::host::Host;
use crate::ops;
use crate::value::{FileHandle, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub(crate) fn call<H: Host>(
    eval: &mut Evaluator<H>,
    receiver: Value,
    name: &str,
    call: CallArgs,
) -> EvalResult<Value> {
    match receiver {
        Value::Str(s) => string_method(eval, &s, name, call),
        Value::List(items) => list_method(eval, &items, name, call),
        Value::File(handle) => file_method(eval, &handle, name, call),
        other => Err(EvalError::attribute_error(other.type_name(), name)),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// str
// ══════════════════════════════════════════════════════════════════════════════

fn string_method<H: Host>(
    eval: &mut Evaluator<H>,
    s: &str,
    name: &str,
    mut call: CallArgs,
) -> EvalResult<Value> {
    if name == "split" {
        let sep = call.take_keyword("sep");
        let maxsplit = call.take_keyword("maxsplit");
        call.finish()?;
        call.arity(0, 2)?;
        let sep = match call.get(0).or(sep.as_ref()) {
            None | Some(Value::None) => None,
            Some(Value::Str(sep)) if sep.is_empty() => {
                return Err(EvalError::value_error("empty separator"))
            }
            Some(Value::Str(sep)) => Some(sep.clone()),
            Some(other) => {
                return Err(EvalError::type_error(format!(
                    "must be str or None, not {}",
                    other.type_name()
                )))
            }
        };
        let maxsplit = match call.get(1).or(maxsplit.as_ref()) {
            None => -1,
            Some(v) => v.as_int().ok_or_else(|| {
                EvalError::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            })?,
        };
        let parts = split(s, sep.as_deref(), maxsplit);
        return Ok(Value::list(parts.into_iter().map(Value::Str).collect()));
    }

    call.finish()?;
    let result = match name {
        "upper" => no_args(&call, Value::str(s.to_uppercase()))?,
        "lower" => no_args(&call, Value::str(s.to_lowercase()))?,
        "strip" | "lstrip" | "rstrip" => {
            call.arity(0, 1)?;
            let chars: Option<Vec<char>> = call.optional_string(0)?.map(|c| c.chars().collect());
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let stripped = match name {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            };
            Value::str(stripped)
        }
        "replace" => {
            call.arity(2, 3)?;
            let (old, new) = (call.string(0)?, call.string(1)?);
            match call.get(2) {
                Some(_) => {
                    let count = usize::try_from(call.int(2)?).unwrap_or(usize::MAX);
                    Value::str(s.replacen(old, new, count))
                }
                None => Value::str(s.replace(old, new)),
            }
        }
        "startswith" => {
            call.arity(1, 1)?;
            Value::Bool(s.starts_with(call.string(0)?))
        }
        "endswith" => {
            call.arity(1, 1)?;
            Value::Bool(s.ends_with(call.string(0)?))
        }
        "join" => {
            call.arity(1, 1)?;
            let items = eval.iterate(call.value(0)?)?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.as_str()),
                    other => {
                        return Err(EvalError::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            Value::str(parts.join(s))
        }
        "isdigit" => no_args(
            &call,
            Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())),
        )?,
        "count" => {
            call.arity(1, 1)?;
            let sub = call.string(0)?;
            let count = if sub.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(sub).count()
            };
            Value::Int(i64::try_from(count).unwrap_or(i64::MAX))
        }
        "find" => {
            call.arity(1, 1)?;
            let found = s
                .find(call.string(0)?)
                .map(|byte| s[..byte].chars().count());
            Value::Int(found.and_then(|i| i64::try_from(i).ok()).unwrap_or(-1))
        }
        "format" => Value::str(format(s, &call.positional)?),
        _ => return Err(EvalError::attribute_error("str", name)),
    };
    Ok(result)
}

/// `str.split` with Python's whitespace rules when `sep` is `None`.
fn split(s: &str, sep: Option<&str>, maxsplit: i64) -> Vec<String> {
    let limit = usize::try_from(maxsplit).ok();
    match sep {
        Some(sep) => match limit {
            Some(n) => s.splitn(n + 1, sep).map(str::to_string).collect(),
            None => s.split(sep).map(str::to_string).collect(),
        },
        None => {
            let mut parts = Vec::new();
            let mut rest = s.trim_start();
            while !rest.is_empty() {
                if limit == Some(parts.len()) {
                    parts.push(rest.to_string());
                    break;
                }
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                parts.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            parts
        }
    }
}

/// `str.format` with `{}`, `{0}` fields and `{{`/`}}` escapes.
fn format(template: &str, args: &[Value]) -> EvalResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => {
                            return Err(EvalError::value_error(
                                "expected '}' before end of string",
                            ))
                        }
                    }
                }
                let index = if field.is_empty() {
                    auto_index += 1;
                    auto_index - 1
                } else {
                    field.parse::<usize>().map_err(|_| {
                        EvalError::script("KeyError", Value::str(field.as_str()).repr())
                    })?
                };
                let value = args.get(index).ok_or_else(|| {
                    EvalError::index_error(format!(
                        "Replacement index {index} out of range for positional args tuple"
                    ))
                })?;
                out.push_str(&value.to_str());
            }
            '}' => {
                return Err(EvalError::value_error(
                    "Single '}' encountered in format string",
                ))
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

// ══════════════════════════════════════════════════════════════════════════════
// list
// ══════════════════════════════════════════════════════════════════════════════

fn list_method<H: Host>(
    eval: &mut Evaluator<H>,
    items: &Rc<RefCell<Vec<Value>>>,
    name: &str,
    mut call: CallArgs,
) -> EvalResult<Value> {
    if name == "sort" {
        let reverse = call.take_keyword("reverse").is_some_and(|v| v.truthy());
        call.finish()?;
        call.arity(0, 0)?;
        let mut sorted = items.borrow().clone();
        sort_values(&mut sorted, reverse)?;
        *items.borrow_mut() = sorted;
        return Ok(Value::None);
    }

    call.finish()?;
    match name {
        "append" => {
            call.arity(1, 1)?;
            items.borrow_mut().push(call.value(0)?.clone());
            Ok(Value::None)
        }
        "extend" => {
            call.arity(1, 1)?;
            let extra = eval.iterate(call.value(0)?)?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            call.arity(2, 2)?;
            let index = call.int(0)?;
            let mut items = items.borrow_mut();
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let at = if index < 0 { index + len } else { index }.clamp(0, len);
            items.insert(usize::try_from(at).unwrap_or(0), call.value(1)?.clone());
            Ok(Value::None)
        }
        "pop" => {
            call.arity(0, 1)?;
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(EvalError::index_error("pop from empty list"));
            }
            let index = match call.get(0) {
                Some(_) => call.int(0)?,
                None => -1,
            };
            let at = ops::normalize_index(index, items.len())
                .ok_or_else(|| EvalError::index_error("pop index out of range"))?;
            Ok(items.remove(at))
        }
        "remove" => {
            call.arity(1, 1)?;
            let target = call.value(0)?;
            let at = items
                .borrow()
                .iter()
                .position(|item| ops::equals(item, target))
                .ok_or_else(|| EvalError::value_error("list.remove(x): x not in list"))?;
            items.borrow_mut().remove(at);
            Ok(Value::None)
        }
        "index" => {
            call.arity(1, 1)?;
            let target = call.value(0)?;
            let at = items
                .borrow()
                .iter()
                .position(|item| ops::equals(item, target))
                .ok_or_else(|| {
                    EvalError::value_error(format!("{} is not in list", target.repr()))
                })?;
            Ok(Value::Int(i64::try_from(at).unwrap_or(i64::MAX)))
        }
        "count" => {
            call.arity(1, 1)?;
            let target = call.value(0)?;
            let count = items
                .borrow()
                .iter()
                .filter(|item| ops::equals(item, target))
                .count();
            Ok(Value::Int(i64::try_from(count).unwrap_or(i64::MAX)))
        }
        "reverse" => {
            call.arity(0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "clear" => {
            call.arity(0, 0)?;
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            call.arity(0, 0)?;
            Ok(Value::list(items.borrow().clone()))
        }
        _ => Err(EvalError::attribute_error("list", name)),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// file
// ══════════════════════════════════════════════════════════════════════════════

fn file_method<H: Host>(
    eval: &mut Evaluator<H>,
    handle: &FileHandle,
    name: &str,
    call: CallArgs,
) -> EvalResult<Value> {
    call.finish()?;
    if name == "close" {
        call.arity(0, 0)?;
        handle.state.borrow_mut().closed = true;
        return Ok(Value::None);
    }
    if handle.state.borrow().closed {
        return Err(EvalError::value_error("I/O operation on closed file."));
    }
    match name {
        "read" => {
            call.arity(0, 0)?;
            let text = eval.read_remaining(handle)?;
            Ok(Value::Str(text))
        }
        "readline" => {
            call.arity(0, 0)?;
            Ok(Value::Str(eval.read_line_from(handle)?))
        }
        "readlines" => {
            call.arity(0, 0)?;
            let text = eval.read_remaining(handle)?;
            Ok(Value::list(
                text.split_inclusive('\n').map(Value::str).collect(),
            ))
        }
        "write" => {
            call.arity(1, 1)?;
            let text = call.string(0)?;
            eval.write_file(handle, text)?;
            Ok(Value::Int(i64::try_from(text.chars().count()).unwrap_or(i64::MAX)))
        }
        _ => Err(EvalError::attribute_error("TextIOWrapper", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_split_collapses_runs() {
        assert_eq!(split("  a  b\tc \n", None, -1), vec!["a", "b", "c"]);
        assert_eq!(split("a b  c ", None, 1), vec!["a", "b  c "]);
        assert!(split("   ", None, -1).is_empty());
    }

    #[test]
    fn explicit_separator_keeps_empty_fields() {
        assert_eq!(split("a,,b", Some(","), -1), vec!["a", "", "b"]);
        assert_eq!(split("a,b,c", Some(","), 1), vec!["a", "b,c"]);
    }

    #[test]
    fn format_fields() {
        let args = vec![Value::str("Bob"), Value::Int(3)];
        assert_eq!(format("{} has {}", &args).unwrap(), "Bob has 3");
        assert_eq!(format("{1}{0}{{}}", &args).unwrap(), "3Bob{}");
        assert!(format("{2}", &args).is_err());
        assert!(format("oops }", &args).is_err());
    }
}
