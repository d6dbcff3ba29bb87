//! Value model
//!
//! Plain structured data (the shape of JSON plus `undefined`), a few
//! special leaf kinds that are never wrapped into containers, and callable
//! values produced by the expression engine.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::expr::{Closure, Interpreter};
use crate::{EvalError, Path};

/// Object representation
pub type Object = BTreeMap<String, Value>;

/// Runtime value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    /// Non-plain leaf (dates, patterns, URLs); stored as-is
    Special(Special),
    Function(Function),
}

/// Kinds of non-plain values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    Date,
    Pattern,
    Url,
}

/// Non-plain leaf value, kept opaque by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Special {
    pub kind: SpecialKind,
    pub repr: String,
}

/// Signature of host-provided functions
pub type NativeFn = dyn Fn(&mut Interpreter<'_>, Vec<Value>) -> Result<Value, EvalError>;

/// Callable value
#[derive(Clone)]
pub enum Function {
    /// Arrow function or declared function
    Closure(Rc<Closure>),
    /// Host function
    Native {
        name: &'static str,
        func: Rc<NativeFn>,
    },
    /// Setter writing one scoped key; a function argument receives the previous value
    Setter(Path),
}

impl Function {
    pub fn native(
        name: &'static str,
        func: impl Fn(&mut Interpreter<'_>, Vec<Value>) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        Function::Native {
            name,
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Function::Closure(c) => c.name.clone().unwrap_or_else(|| "anonymous".into()),
            Function::Native { name, .. } => (*name).to_string(),
            Function::Setter(path) => format!("set {path}"),
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::Closure(a), Function::Closure(b)) => Rc::ptr_eq(a, b),
            (Function::Native { func: a, .. }, Function::Native { func: b, .. }) => {
                Rc::ptr_eq(a, b)
            }
            (Function::Setter(a), Function::Setter(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function {}]", self.name())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Special(a), Value::Special(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => f.debug_list().entries(items).finish(),
            Value::Object(map) => f.debug_map().entries(map).finish(),
            Value::Special(s) => write!(f, "{:?}({})", s.kind, s.repr),
            Value::Function(func) => write!(f, "{func:?}"),
        }
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Parse JSON text into a value
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<serde_json::Value>(text).map(Value::from)
    }

    /// `typeof` result
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Special(_) => "object",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Plain object or array
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) if items.is_empty() => 0.0,
            Value::Array(items) if items.len() == 1 => items[0].to_number(),
            _ => f64::NAN,
        }
    }

    /// String conversion as done by string concatenation
    pub fn to_display(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_display()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".into(),
            Value::Special(s) => s.repr.clone(),
            Value::Function(f) => format!("function {}", f.name()),
        }
    }

    /// Text rendered into the document for `{{ }}` output
    pub fn to_text(&self) -> String {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => String::new(),
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::Object(_) | Value::Array(_) => v.to_json_string(),
                    other => other.to_text(),
                })
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(_) => {
                serde_json::to_string_pretty(&self.to_json()).unwrap_or_default()
            }
            other => other.to_display(),
        }
    }

    /// Compact JSON text
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.to_json()).unwrap_or_default()
    }

    /// Convert to serde_json, dropping what JSON cannot represent
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(|num| {
                    if n.fract() == 0.0 && n.abs() < 9.0e15 {
                        serde_json::Value::from(*n as i64)
                    } else {
                        serde_json::Value::Number(num)
                    }
                })
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .filter(|(_, v)| !matches!(v, Value::Undefined | Value::Function(_)))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Special(s) => serde_json::Value::String(s.repr.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Property read with array/string indexing
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map.get(key).cloned().unwrap_or_default(),
            Value::Array(items) => {
                if key == "length" {
                    return Value::Number(items.len() as f64);
                }
                key.parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default()
            }
            Value::String(s) => {
                if key == "length" {
                    return Value::Number(s.chars().count() as f64);
                }
                key.parse::<usize>()
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or_default()
            }
            _ => Value::Undefined,
        }
    }

    /// Property write on an owned value, creating objects along the way
    pub fn set_in(&mut self, path: &[String], value: Value) {
        let Some((head, rest)) = path.split_first() else {
            *self = value;
            return;
        };
        if !self.is_container() {
            *self = Value::Object(Object::new());
        }
        match self {
            Value::Object(map) => map.entry(head.clone()).or_default().set_in(rest, value),
            Value::Array(items) => {
                if let Ok(i) = head.parse::<usize>() {
                    if i >= items.len() {
                        items.resize(i + 1, Value::Undefined);
                    }
                    items[i].set_in(rest, value);
                }
            }
            _ => {}
        }
    }

    /// Nested read on an owned value
    pub fn get_in(&self, path: &[String]) -> Value {
        match path.split_first() {
            None => self.clone(),
            Some((head, rest)) => self.get(head).get_in(rest),
        }
    }
}

/// Number to string, following script number formatting for common cases
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n == 0.0 {
        "0".into()
    } else {
        n.to_string()
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(text: &str) -> Value {
        Value::from_json_str(text).unwrap()
    }

    #[test]
    fn test_text_formatting() {
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::Undefined.to_text(), "");
        assert_eq!(Value::Bool(false).to_text(), "false");
        assert_eq!(Value::Number(3.0).to_text(), "3");
        assert_eq!(Value::Number(0.5).to_text(), "0.5");
        assert_eq!(json("[1, \"a\", {\"x\": 1}]").to_text(), "1, a, {\"x\":1}");
        assert_eq!(json("{\"a\": 1}").to_text(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(json("[]").is_truthy());
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(Value::from(" 42 ").to_number(), 42.0);
        assert!(Value::from("x").to_number().is_nan());
        assert_eq!(Value::Bool(true).to_number(), 1.0);
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_deep_equality() {
        assert_eq!(json("{\"a\": [1, 2]}"), json("{\"a\": [1, 2]}"));
        assert_ne!(json("{\"a\": [1, 2]}"), json("{\"a\": [2, 1]}"));
    }

    #[test]
    fn test_nested_get_set() {
        let mut v = Value::Undefined;
        v.set_in(&["user".into(), "name".into()], Value::from("ada"));
        assert_eq!(v.get_in(&["user".into(), "name".into()]), Value::from("ada"));
        assert_eq!(json("[1,2,3]").get("length"), Value::Number(3.0));
        assert_eq!(Value::from("héllo").get("1"), Value::from("é"));
    }

    #[test]
    fn test_json_round_trip() {
        let v = json("{\"n\": 2, \"f\": 1.5, \"s\": \"x\", \"l\": [true, null]}");
        assert_eq!(Value::from(v.to_json()), v);
        assert_eq!(Value::from(3.0).to_json_string(), "3");
    }
}
