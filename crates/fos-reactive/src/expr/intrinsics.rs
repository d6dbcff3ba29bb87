//! Built-in methods on arrays, strings and numbers

use std::cmp::Ordering;

use super::interp::Interpreter;
use crate::value::format_number;
use crate::{ArrayOp, EvalError, Function, Value};

/// Non-mutating array members
pub const ARRAY_INTRINSICS: &[&str] = &[
    "length",
    "map",
    "filter",
    "find",
    "findIndex",
    "some",
    "every",
    "includes",
    "indexOf",
    "join",
    "slice",
    "concat",
    "forEach",
    "reduce",
];

/// Intrinsic or mutator name of an array
pub fn is_array_intrinsic(name: &str) -> bool {
    ARRAY_INTRINSICS.contains(&name) || ArrayOp::is_mutator(name)
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn callback(args: &[Value], method: &str) -> Result<Function, EvalError> {
    match args.first() {
        Some(Value::Function(f)) => Ok(f.clone()),
        _ => Err(EvalError::NotCallable(format!("{method} callback"))),
    }
}

/// Clamp a relative index the way slice/splice do
fn relative(i: f64, len: usize) -> usize {
    if i.is_nan() {
        return 0;
    }
    if i < 0.0 {
        len.saturating_sub((-i) as usize)
    } else {
        (i as usize).min(len)
    }
}

/// Strict equality used by `includes`/`indexOf`
pub(super) fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        _ => a == b,
    }
}

/// Array methods that never write
pub(super) fn call_array(
    interp: &mut Interpreter<'_>,
    items: &[Value],
    method: &str,
    args: Vec<Value>,
) -> Result<Option<Value>, EvalError> {
    let value = match method {
        "map" => {
            let f = callback(&args, method)?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(interp.call(&f, vec![item.clone(), Value::from(i as f64)])?);
            }
            Value::Array(out)
        }
        "filter" => {
            let f = callback(&args, method)?;
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if interp
                    .call(&f, vec![item.clone(), Value::from(i as f64)])?
                    .is_truthy()
                {
                    out.push(item.clone());
                }
            }
            Value::Array(out)
        }
        "find" | "findIndex" | "some" | "every" => {
            let f = callback(&args, method)?;
            let mut hit = None;
            for (i, item) in items.iter().enumerate() {
                let passed = interp
                    .call(&f, vec![item.clone(), Value::from(i as f64)])?
                    .is_truthy();
                if passed != (method == "every") {
                    hit = Some(i);
                    break;
                }
            }
            match method {
                "find" => hit.map(|i| items[i].clone()).unwrap_or_default(),
                "findIndex" => Value::from(hit.map(|i| i as f64).unwrap_or(-1.0)),
                "some" => Value::Bool(hit.is_some()),
                _ => Value::Bool(hit.is_none()),
            }
        }
        "forEach" => {
            let f = callback(&args, method)?;
            for (i, item) in items.iter().enumerate() {
                interp.call(&f, vec![item.clone(), Value::from(i as f64)])?;
            }
            Value::Undefined
        }
        "reduce" => {
            let f = callback(&args, method)?;
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some(init) => init.clone(),
                None => match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => {
                        return Err(EvalError::Type(
                            "reduce of empty array with no initial value".into(),
                        ));
                    }
                },
            };
            for (i, item) in iter {
                acc = interp.call(&f, vec![acc, item.clone(), Value::from(i as f64)])?;
            }
            acc
        }
        "includes" => {
            let needle = arg(&args, 0);
            Value::Bool(items.iter().any(|v| same_value(v, &needle)))
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            let pos = items.iter().position(|v| same_value(v, &needle));
            Value::from(pos.map(|i| i as f64).unwrap_or(-1.0))
        }
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(v) => v.to_display(),
            };
            Value::String(
                items
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        "slice" => {
            let len = items.len();
            let start = relative(arg(&args, 0).to_number(), len);
            let end = match args.get(1) {
                None | Some(Value::Undefined) => len,
                Some(v) => relative(v.to_number(), len),
            };
            Value::Array(items.get(start..end.max(start)).unwrap_or_default().to_vec())
        }
        "concat" => {
            let mut out = items.to_vec();
            for extra in args {
                match extra {
                    Value::Array(more) => out.extend(more),
                    other => out.push(other),
                }
            }
            Value::Array(out)
        }
        "toString" => Value::String(Value::Array(items.to_vec()).to_display()),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Translate mutator arguments into an [`ArrayOp`]; `sort` with a
/// comparator is handled by the caller.
pub(super) fn array_op(method: &str, args: Vec<Value>) -> Result<ArrayOp, EvalError> {
    let int = |v: Option<&Value>| v.map(|v| v.to_number()).filter(|n| !n.is_nan()).map(|n| n as i64);
    Ok(match method {
        "push" => ArrayOp::Push(args),
        "pop" => ArrayOp::Pop,
        "shift" => ArrayOp::Shift,
        "unshift" => ArrayOp::Unshift(args),
        "splice" => {
            let start = int(args.first()).unwrap_or(0);
            let delete = args.get(1).map(|v| v.to_number().max(0.0) as usize);
            let items = args.into_iter().skip(2).collect();
            ArrayOp::Splice {
                start,
                delete,
                items,
            }
        }
        "sort" => ArrayOp::Sort(None),
        "reverse" => ArrayOp::Reverse,
        "fill" => ArrayOp::Fill {
            value: arg(&args, 0),
            start: int(args.get(1)).unwrap_or(0),
            end: int(args.get(2)),
        },
        "copyWithin" => ArrayOp::CopyWithin {
            target: int(args.first()).unwrap_or(0),
            start: int(args.get(1)).unwrap_or(0),
            end: int(args.get(2)),
        },
        other => return Err(EvalError::NotCallable(other.to_string())),
    })
}

/// Sort with a script comparator, surfacing the first comparator error
pub(super) fn sort_with(
    interp: &mut Interpreter<'_>,
    items: &mut [Value],
    compare: &Function,
) -> Result<(), EvalError> {
    let mut failure = None;
    items.sort_by(|a, b| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        match interp.call(compare, vec![a.clone(), b.clone()]) {
            Ok(v) => v.to_number().partial_cmp(&0.0).unwrap_or(Ordering::Equal),
            Err(e) => {
                failure = Some(e);
                Ordering::Equal
            }
        }
    });
    failure.map_or(Ok(()), Err)
}

/// Apply a mutator to an array that is not store-backed
pub(super) fn mutate_owned(items: &mut Vec<Value>, op: ArrayOp) -> Value {
    let len = items.len();
    match op {
        ArrayOp::Push(values) => {
            items.extend(values);
            Value::from(items.len() as f64)
        }
        ArrayOp::Pop => items.pop().unwrap_or_default(),
        ArrayOp::Shift => {
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        }
        ArrayOp::Unshift(values) => {
            items.splice(0..0, values);
            Value::from(items.len() as f64)
        }
        ArrayOp::Splice {
            start,
            delete,
            items: inserted,
        } => {
            let start = relative(start as f64, len);
            let end = delete.map_or(len, |d| (start + d).min(len));
            Value::Array(items.splice(start..end, inserted).collect())
        }
        ArrayOp::Sort(cmp) => {
            match cmp {
                Some(mut f) => items.sort_by(|a, b| f(a, b)),
                None => items.sort_by_key(Value::to_display),
            }
            Value::Array(items.clone())
        }
        ArrayOp::Reverse => {
            items.reverse();
            Value::Array(items.clone())
        }
        ArrayOp::Fill { value, start, end } => {
            let start = relative(start as f64, len);
            let end = end.map_or(len, |e| relative(e as f64, len));
            for slot in items.iter_mut().take(end).skip(start) {
                *slot = value.clone();
            }
            Value::Array(items.clone())
        }
        ArrayOp::CopyWithin { target, start, end } => {
            let target = relative(target as f64, len);
            let start = relative(start as f64, len);
            let end = end.map_or(len, |e| relative(e as f64, len));
            let chunk: Vec<Value> = items.get(start..end.max(start)).unwrap_or_default().to_vec();
            for (offset, v) in chunk.into_iter().enumerate() {
                if let Some(slot) = items.get_mut(target + offset) {
                    *slot = v;
                }
            }
            Value::Array(items.clone())
        }
    }
}

/// String methods
pub(super) fn call_string(s: &str, method: &str, args: &[Value]) -> Option<Value> {
    let text = |i: usize| arg(args, i).to_display();
    let value = match method {
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::String(s.trim().to_string()),
        "includes" => Value::Bool(s.contains(&text(0))),
        "startsWith" => Value::Bool(s.starts_with(&text(0))),
        "endsWith" => Value::Bool(s.ends_with(&text(0))),
        "indexOf" => {
            let needle = text(0);
            Value::from(
                s.find(&needle)
                    .map(|byte| s[..byte].chars().count() as f64)
                    .unwrap_or(-1.0),
            )
        }
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::String(s.to_string())],
                Some(sep) => {
                    let sep = sep.to_display();
                    if sep.is_empty() {
                        s.chars().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::from).collect()
                    }
                }
            };
            Value::Array(parts)
        }
        "slice" | "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len();
            let start = relative(arg(args, 0).to_number(), len);
            let end = match args.get(1) {
                None | Some(Value::Undefined) => len,
                Some(v) => relative(v.to_number(), len),
            };
            Value::String(chars[start..end.max(start)].iter().collect())
        }
        "replace" => Value::String(s.replacen(&text(0), &text(1), 1)),
        "replaceAll" => Value::String(s.replace(&text(0), &text(1))),
        "padStart" | "padEnd" => {
            let width = arg(args, 0).to_number().max(0.0) as usize;
            let fill = match args.get(1) {
                None | Some(Value::Undefined) => " ".to_string(),
                Some(v) => v.to_display(),
            };
            let current = s.chars().count();
            if current >= width || fill.is_empty() {
                Value::String(s.to_string())
            } else {
                let pad: String = fill.chars().cycle().take(width - current).collect();
                if method == "padStart" {
                    Value::String(format!("{pad}{s}"))
                } else {
                    Value::String(format!("{s}{pad}"))
                }
            }
        }
        "charAt" => Value::String(
            s.chars()
                .nth(arg(args, 0).to_number().max(0.0) as usize)
                .map(String::from)
                .unwrap_or_default(),
        ),
        "toString" => Value::String(s.to_string()),
        _ => return None,
    };
    Some(value)
}

/// Number methods
pub(super) fn call_number(n: f64, method: &str, args: &[Value]) -> Option<Value> {
    match method {
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
            Some(Value::String(format!("{n:.digits$}")))
        }
        "toString" => Some(Value::String(format_number(n))),
        _ => None,
    }
}
