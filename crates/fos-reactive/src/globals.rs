//! Global environment
//!
//! The last stop of name resolution: a handful of host objects and
//! functions directive expressions commonly reach for.

use std::collections::HashMap;

use crate::value::Object;
use crate::{EvalError, Function, Value};

/// Global names
#[derive(Debug)]
pub struct Globals {
    values: HashMap<String, Value>,
}

impl Default for Globals {
    fn default() -> Self {
        Self::new()
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn numbers(args: &[Value]) -> impl Iterator<Item = f64> + '_ {
    args.iter().map(Value::to_number)
}

fn namespace(entries: Vec<(&'static str, Value)>) -> Value {
    Value::Object(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<Object>(),
    )
}

fn native(
    name: &'static str,
    func: impl Fn(&[Value]) -> Result<Value, EvalError> + 'static,
) -> Value {
    Value::Function(Function::native(name, move |_, args| func(&args)))
}

fn math() -> Value {
    namespace(vec![
        (
            "max",
            native("max", |args| {
                Ok(Value::Number(numbers(args).fold(f64::NEG_INFINITY, |a, b| {
                    if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
                })))
            }),
        ),
        (
            "min",
            native("min", |args| {
                Ok(Value::Number(numbers(args).fold(f64::INFINITY, |a, b| {
                    if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
                })))
            }),
        ),
        ("abs", native("abs", |args| Ok(Value::Number(arg(args, 0).to_number().abs())))),
        ("floor", native("floor", |args| Ok(Value::Number(arg(args, 0).to_number().floor())))),
        ("ceil", native("ceil", |args| Ok(Value::Number(arg(args, 0).to_number().ceil())))),
        (
            "round",
            native("round", |args| {
                // half-way cases round toward +infinity
                Ok(Value::Number((arg(args, 0).to_number() + 0.5).floor()))
            }),
        ),
        ("PI", Value::Number(std::f64::consts::PI)),
    ])
}

fn json() -> Value {
    namespace(vec![
        (
            "stringify",
            native("stringify", |args| {
                let value = arg(args, 0);
                if matches!(value, Value::Undefined | Value::Function(_)) {
                    return Ok(Value::Undefined);
                }
                let indent = arg(args, 2);
                let text = if indent.is_nullish() {
                    value.to_json_string()
                } else {
                    serde_json::to_string_pretty(&value.to_json())
                        .map_err(|e| EvalError::Type(e.to_string()))?
                };
                Ok(Value::String(text))
            }),
        ),
        (
            "parse",
            native("parse", |args| {
                Value::from_json_str(&arg(args, 0).to_display())
                    .map_err(|e| EvalError::Type(format!("JSON.parse: {e}")))
            }),
        ),
    ])
}

fn console() -> Value {
    fn join(args: &[Value]) -> String {
        args.iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => format!("{other:?}"),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
    namespace(vec![
        (
            "log",
            native("log", |args| {
                tracing::info!("console: {}", join(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "warn",
            native("warn", |args| {
                tracing::warn!("console: {}", join(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "error",
            native("error", |args| {
                tracing::error!("console: {}", join(args));
                Ok(Value::Undefined)
            }),
        ),
    ])
}

fn parse_int(text: &str) -> f64 {
    let t = text.trim();
    let (sign, digits) = match t.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, t.strip_prefix('+').unwrap_or(t)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end]
        .parse::<f64>()
        .map(|n| sign * n)
        .unwrap_or(f64::NAN)
}

fn parse_float(text: &str) -> f64 {
    let t = text.trim();
    let mut end = 0;
    for i in (1..=t.len()).rev() {
        if t.is_char_boundary(i) && t[..i].parse::<f64>().is_ok() {
            end = i;
            break;
        }
    }
    t[..end].parse().unwrap_or(f64::NAN)
}

impl Globals {
    pub fn new() -> Self {
        let mut values = HashMap::new();
        let mut put = |name: &str, value: Value| {
            values.insert(name.to_string(), value);
        };

        put("Math", math());
        put("JSON", json());
        put("console", console());
        put("NaN", Value::Number(f64::NAN));
        put("Infinity", Value::Number(f64::INFINITY));
        put(
            "String",
            native("String", |args| Ok(Value::String(arg(args, 0).to_display()))),
        );
        put(
            "Number",
            native("Number", |args| Ok(Value::Number(arg(args, 0).to_number()))),
        );
        put(
            "Boolean",
            native("Boolean", |args| Ok(Value::Bool(arg(args, 0).is_truthy()))),
        );
        put(
            "parseInt",
            native("parseInt", |args| {
                Ok(Value::Number(parse_int(&arg(args, 0).to_display())))
            }),
        );
        put(
            "parseFloat",
            native("parseFloat", |args| {
                Ok(Value::Number(parse_float(&arg(args, 0).to_display())))
            }),
        );
        put(
            "isNaN",
            native("isNaN", |args| Ok(Value::Bool(arg(args, 0).to_number().is_nan()))),
        );
        put(
            "Array",
            namespace(vec![(
                "isArray",
                native("isArray", |args| {
                    Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))
                }),
            )]),
        );
        put(
            "Object",
            namespace(vec![
                (
                    "keys",
                    native("keys", |args| {
                        Ok(Value::Array(match arg(args, 0) {
                            Value::Object(map) => map.into_keys().map(Value::String).collect(),
                            Value::Array(items) => (0..items.len())
                                .map(|i| Value::String(i.to_string()))
                                .collect(),
                            _ => Vec::new(),
                        }))
                    }),
                ),
                (
                    "values",
                    native("values", |args| {
                        Ok(Value::Array(match arg(args, 0) {
                            Value::Object(map) => map.into_values().collect(),
                            Value::Array(items) => items,
                            _ => Vec::new(),
                        }))
                    }),
                ),
                (
                    "entries",
                    native("entries", |args| {
                        Ok(Value::Array(match arg(args, 0) {
                            Value::Object(map) => map
                                .into_iter()
                                .map(|(k, v)| Value::Array(vec![Value::String(k), v]))
                                .collect(),
                            _ => Vec::new(),
                        }))
                    }),
                ),
                (
                    "assign",
                    native("assign", |args| {
                        let mut out = match arg(args, 0) {
                            Value::Object(map) => map,
                            _ => Object::new(),
                        };
                        for extra in args.iter().skip(1) {
                            if let Value::Object(map) = extra {
                                out.extend(map.clone());
                            }
                        }
                        Ok(Value::Object(out))
                    }),
                ),
            ]),
        );

        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Install or replace a global
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_and_float() {
        assert_eq!(parse_int("42px"), 42.0);
        assert_eq!(parse_int("-7"), -7.0);
        assert!(parse_int("px").is_nan());
        assert_eq!(parse_float("3.5em"), 3.5);
    }

    #[test]
    fn test_namespaces_present() {
        let g = Globals::new();
        for name in ["Math", "JSON", "String", "Number", "Boolean", "Array", "Object", "console"] {
            assert!(g.contains(name), "{name}");
        }
        assert!(matches!(g.get("Math").map(|m| m.get("max")), Some(Value::Function(_))));
    }
}
