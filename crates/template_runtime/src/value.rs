//! Context values seen by helpers and block programs.
//!
//! Host data is converted into a [`Value`] once, at the data-binding
//! boundary. From then on helpers match on the variant instead of inspecting
//! runtime types, which is what lets the built-in block helpers dispatch
//! exhaustively.

use crate::utils::SafeString;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Number;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;

/// Upper bound on chained lazy evaluations in [`Value::resolve`].
pub const MAX_LAZY_DEPTH: usize = 16;

/// Key-ordered mapping used for record values.
pub type Object = BTreeMap<String, Value>;

/// A value in scope during rendering.
///
/// There is no fixed schema: records, sequences, scalars and absence are
/// all valid contexts. [`Value::Lazy`] represents a context that must be
/// invoked to obtain its real value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent or null.
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Pre-escaped text that escaping must pass through unchanged.
    Safe(SafeString),
    Array(Vec<Value>),
    Object(Object),
    /// A callable producing the actual value.
    Lazy(LazyValue),
}

/// A deferred value, evaluated each time it is resolved.
#[derive(Clone)]
pub struct LazyValue(Arc<dyn Fn() -> Value + Send + Sync>);

impl LazyValue {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invokes the callable.
    pub fn resolve(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LazyValue(..)")
    }
}

impl Value {
    /// Wraps a callable as a lazy value.
    pub fn lazy<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Value::Lazy(LazyValue::new(f))
    }

    /// Marks `text` as already escaped.
    pub fn safe(text: impl Into<String>) -> Self {
        Value::Safe(SafeString::new(text))
    }

    /// Resolves lazy values until a concrete value is reached.
    ///
    /// The result is never [`Value::Lazy`]. A callable that is still
    /// producing lazies after [`MAX_LAZY_DEPTH`] evaluations resolves to
    /// `Null`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use template_runtime::Value;
    /// let value = Value::lazy(|| Value::lazy(|| Value::from("done")));
    /// assert_eq!(value.resolve(), Value::from("done"));
    /// ```
    pub fn resolve(&self) -> Value {
        let mut current = self.clone();
        for _ in 0..MAX_LAZY_DEPTH {
            match current {
                Value::Lazy(lazy) => current = lazy.resolve(),
                resolved => return resolved,
            }
        }
        match current {
            Value::Lazy(_) => {
                warn!(limit = MAX_LAZY_DEPTH, "Lazy value did not settle, using null");
                Value::Null
            }
            resolved => resolved,
        }
    }

    /// Looks up a record field, or a sequence element when `key` is an index.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Follows a dotted path such as `author.name`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |value, segment| value.get(segment))
    }

    /// Whether the value counts as true in a conditional.
    ///
    /// `Null`, `false`, zero and the empty string are falsy; everything else,
    /// including empty sequences, records and safe strings, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Safe(_) | Value::Array(_) | Value::Object(_) | Value::Lazy(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Safe(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Safe(s) => f.write_str(s.as_str()),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object]"),
            Value::Lazy(_) => f.write_str("[function]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Safe(s) => f.debug_tuple("Safe").field(s).finish(),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Object(map) => f.debug_tuple("Object").field(map).finish(),
            Value::Lazy(lazy) => lazy.fmt(f),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality; lazy values compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Safe(a), Value::Safe(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Lazy(a), Value::Lazy(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Safe(s) => serializer.serialize_str(s.as_str()),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Lazy(_) => self.resolve().serialize(serializer),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value.into())
    }
}

impl From<f64> for Value {
    /// Non-finite numbers have no representation and become `Null`.
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<SafeString> for Value {
    fn from(value: SafeString) -> Self {
        Value::Safe(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Object> for Value {
    fn from(fields: Object) -> Self {
        Value::Object(fields)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
