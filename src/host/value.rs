use std::fmt;

use crate::errors::ExecutionError;
use crate::zone::InteractionZone;

use super::collections::ArrayObject;
use super::object::{ObjectRef, PlainObject};
use super::promise::{Promise, PromiseCell};

/// A host value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(ObjectRef),
    /// Zones travel as values but are never wrapped by detection proxies
    Zone(InteractionZone),
    /// A thrown error used as a value (rejection reasons, caught errors)
    Error(ExecutionError),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The object, if this value is callable.
    pub fn as_callable(&self) -> Option<&ObjectRef> {
        self.as_object().filter(|o| o.is_callable())
    }

    pub fn is_callable(&self) -> bool {
        self.as_callable().is_some()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_zone(&self) -> Option<&InteractionZone> {
        match self {
            Value::Zone(z) => Some(z),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<Promise> {
        self.as_object()?.downcast_arc::<PromiseCell>().map(Promise::from_cell)
    }

    /// Numeric conversion, NaN where no number makes sense.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => *b as u8 as f64,
            Value::Number(n) => *n,
            Value::String(s) if s.trim().is_empty() => 0.0,
            Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Zone(_) | Value::Error(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(o) if o.is_callable() => "function",
            Value::Object(_) => "object",
        }
    }
}

/// Strict equality: references compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Zone(a), Value::Zone(b)) => a.ptr_eq(b),
            (Value::Error(a), Value::Error(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e21 => write!(f, "{}", *n as i64),
            Value::Number(n) if n.is_nan() => write!(f, "NaN"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Object(o) => write!(f, "[object {}]", o.kind()),
            Value::Zone(z) => write!(f, "[zone {}]", z.name()),
            Value::Error(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(o) => write!(f, "{o:?}"),
            Value::Error(e) => write!(f, "{e:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
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

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl From<InteractionZone> for Value {
    fn from(z: InteractionZone) -> Self {
        Value::Zone(z)
    }
}

impl From<ExecutionError> for Value {
    fn from(e: ExecutionError) -> Self {
        Value::Error(e)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Value::Object(p.to_object())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Undefined)
    }
}

/// JSON arrays become [`ArrayObject`]s and JSON objects [`PlainObject`]s.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Object(ArrayObject::from_values(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => {
                Value::Object(PlainObject::from_entries(map.into_iter().map(|(k, v)| (k, Value::from(v)))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_equality() {
        assert_eq!(Value::from(5), Value::Number(5.0));
        assert_ne!(Value::from("5"), Value::from(5));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));

        let a = PlainObject::new();
        let b = PlainObject::new();
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn display_and_type_of() {
        assert_eq!(Value::from(22).to_string(), "22");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::Undefined.to_string(), "undefined");
        assert_eq!(Value::from(PlainObject::new()).to_string(), "[object Object]");
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::from(true).type_of(), "boolean");
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from("  7 ").to_number(), 7.0);
        assert!(Value::Undefined.to_number().is_nan());
        assert!(!Value::from("").truthy());
        assert!(Value::from(PlainObject::new()).truthy());
        assert_eq!(Value::from(None::<i32>), Value::Undefined);
    }

    #[test]
    fn from_json_builds_objects() {
        let v = Value::from(json!({ "a": 1, "list": [1, "x", null] }));
        let obj = v.as_object().unwrap();
        assert_eq!(obj.get("a").unwrap(), Value::from(1));

        let list = obj.get("list").unwrap();
        let list = list.as_object().unwrap();
        assert_eq!(list.get("length").unwrap(), Value::from(3));
        assert_eq!(list.get(1usize).unwrap(), Value::from("x"));
        assert_eq!(list.get(2usize).unwrap(), Value::Null);
    }
}
