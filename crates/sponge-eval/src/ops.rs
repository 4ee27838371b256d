//! Operator semantics: arithmetic, comparison, membership, indexing.

use crate::error::{EvalError, EvalResult};
use crate::value::Value;
use sponge_types::ast::{BinOp, CmpOp, UnaryOp};
use std::cmp::Ordering;

// ══════════════════════════════════════════════════════════════════════════════
// Arithmetic
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) fn binary(op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{a}{b}"))),
        (BinOp::Add, Value::Str(_), other) => {
            return Err(EvalError::type_error(format!(
                "can only concatenate str (not \"{}\") to str",
                other.type_name()
            )))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            return Ok(Value::list(items));
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            let count = repeat_count(n, s.len())?;
            return Ok(Value::Str(s.repeat(count)));
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if n.as_int().is_some() =>
        {
            let items = items.borrow();
            let count = repeat_count(n, items.len())?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            return Ok(Value::list(out));
        }
        _ => {}
    }

    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return int_arith(op, a, b);
    }
    if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
        return float_arith(op, a, b);
    }
    Err(EvalError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.as_str(),
        left.type_name(),
        right.type_name()
    )))
}

/// Longest string (in bytes) or list that repetition or `range` may build.
pub(crate) const MAX_SEQUENCE_LEN: usize = 1 << 27;

/// Copies of a sequence of `len` elements that `* n` makes. Fails before
/// anything is allocated when the result would exceed [`MAX_SEQUENCE_LEN`].
fn repeat_count(n: &Value, len: usize) -> EvalResult<usize> {
    let n = n.as_int().unwrap_or(0);
    if n <= 0 || len == 0 {
        return Ok(0);
    }
    usize::try_from(n)
        .ok()
        .filter(|count| count.checked_mul(len).is_some_and(|total| total <= MAX_SEQUENCE_LEN))
        .ok_or_else(|| EvalError::script("MemoryError", "repeated sequence is too large"))
}

fn int_arith(op: BinOp, a: i64, b: i64) -> EvalResult<Value> {
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(EvalError::zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(EvalError::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            a.checked_div(b).map(|q| {
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(EvalError::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            a.checked_rem(b).map(|r| {
                if r != 0 && ((r < 0) != (b < 0)) {
                    r + b
                } else {
                    r
                }
            })
        }
        BinOp::Pow => {
            if b < 0 {
                return float_arith(op, a as f64, b as f64);
            }
            u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp))
        }
    };
    result.map(Value::Int).ok_or_else(EvalError::overflow)
}

fn float_arith(op: BinOp, a: f64, b: f64) -> EvalResult<Value> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(EvalError::zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(EvalError::zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(EvalError::zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(EvalError::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            a.powf(b)
        }
    };
    Ok(Value::Float(result))
}

pub(crate) fn unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, v) if v.as_int().is_some() => v
            .as_int()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(EvalError::overflow),
        (UnaryOp::Pos, v) if v.as_int().is_some() => Ok(Value::Int(v.as_int().unwrap_or(0))),
        (op, v) => {
            let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
            Err(EvalError::type_error(format!(
                "bad operand type for unary {symbol}: '{}'",
                v.type_name()
            )))
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Comparison
// ══════════════════════════════════════════════════════════════════════════════

/// Python `==`.
pub(crate) fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| equals(p, q))
        }
        (Value::Function(x), Value::Function(y)) => std::rc::Rc::ptr_eq(x, y),
        (Value::Exception(x), Value::Exception(y)) => std::rc::Rc::ptr_eq(x, y),
        (Value::Float(_), _) | (_, Value::Float(_)) => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

/// Ordering for `<`, `sorted`, `min` and `max`.
pub(crate) fn order(a: &Value, b: &Value) -> EvalResult<Ordering> {
    order_with(a, b, "<")
}

fn order_with(a: &Value, b: &Value, symbol: &str) -> EvalResult<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            for (p, q) in x.iter().zip(y.iter()) {
                if !equals(p, q) {
                    return order_with(p, q, symbol);
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => {
            if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
                return Ok(x.cmp(&y));
            }
            match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
                _ => Err(EvalError::type_error(format!(
                    "'{symbol}' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
    }
}

pub(crate) fn compare(op: CmpOp, a: &Value, b: &Value) -> EvalResult<bool> {
    match op {
        CmpOp::Eq => Ok(equals(a, b)),
        CmpOp::NotEq => Ok(!equals(a, b)),
        CmpOp::In => contains(b, a),
        CmpOp::NotIn => contains(b, a).map(|found| !found),
        CmpOp::Less | CmpOp::Greater | CmpOp::LessEq | CmpOp::GreaterEq => {
            // NaN compares false with everything.
            if a.as_float().is_some_and(f64::is_nan) || b.as_float().is_some_and(f64::is_nan) {
                return Ok(false);
            }
            let ordering = order_with(a, b, op.as_str())?;
            Ok(match op {
                CmpOp::Less => ordering == Ordering::Less,
                CmpOp::Greater => ordering == Ordering::Greater,
                CmpOp::LessEq => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// `needle in haystack`.
pub(crate) fn contains(haystack: &Value, needle: &Value) -> EvalResult<bool> {
    match haystack {
        Value::Str(s) => match needle {
            Value::Str(n) => Ok(s.contains(n.as_str())),
            other => Err(EvalError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|item| equals(item, needle))),
        other => Err(EvalError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Indexing
// ══════════════════════════════════════════════════════════════════════════════

/// Resolve a possibly negative index against `len`.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}

fn index_operand(container: &Value, index: &Value) -> EvalResult<i64> {
    index.as_int().ok_or_else(|| {
        EvalError::type_error(format!(
            "{} indices must be integers, not {}",
            container.type_name(),
            index.type_name()
        ))
    })
}

pub(crate) fn get_index(container: &Value, index: &Value) -> EvalResult<Value> {
    match container {
        Value::List(items) => {
            let i = index_operand(container, index)?;
            let items = items.borrow();
            normalize_index(i, items.len())
                .and_then(|i| items.get(i).cloned())
                .ok_or_else(|| EvalError::index_error("list index out of range"))
        }
        Value::Str(s) => {
            let i = index_operand(container, index)?;
            let chars: Vec<char> = s.chars().collect();
            normalize_index(i, chars.len())
                .and_then(|i| chars.get(i))
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| EvalError::index_error("string index out of range"))
        }
        other => Err(EvalError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub(crate) fn set_index(container: &Value, index: &Value, value: Value) -> EvalResult<()> {
    match container {
        Value::List(items) => {
            let i = index_operand(container, index)?;
            let mut items = items.borrow_mut();
            let slot = normalize_index(i, items.len())
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| EvalError::index_error("list assignment index out of range"))?;
            *slot = value;
            Ok(())
        }
        other => Err(EvalError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// Clamp optional slice bounds the way Python does for a step of 1.
fn slice_bounds(lower: Option<i64>, upper: Option<i64>, len: usize) -> (usize, usize) {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |bound: i64| -> usize {
        let resolved = if bound < 0 { bound + len_i } else { bound };
        usize::try_from(resolved.clamp(0, len_i)).unwrap_or(len)
    };
    let start = lower.map_or(0, clamp);
    let end = upper.map_or(len, clamp);
    (start, end.max(start))
}

pub(crate) fn get_slice(
    container: &Value,
    lower: Option<&Value>,
    upper: Option<&Value>,
) -> EvalResult<Value> {
    let bound = |v: Option<&Value>| -> EvalResult<Option<i64>> {
        match v {
            None | Some(Value::None) => Ok(None),
            Some(v) => v.as_int().map(Some).ok_or_else(|| {
                EvalError::type_error(
                    "slice indices must be integers or None or have an __index__ method",
                )
            }),
        }
    };
    let (lower, upper) = (bound(lower)?, bound(upper)?);
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let (start, end) = slice_bounds(lower, upper, items.len());
            Ok(Value::list(items[start..end].to_vec()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(lower, upper, chars.len());
            Ok(Value::Str(chars[start..end].iter().collect()))
        }
        other => Err(EvalError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}
