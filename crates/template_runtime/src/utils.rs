//! Escaping policy and the safe-string marker.

use crate::value::Value;
use std::fmt;

#[cfg(test)]
#[path = "utils_tests.rs"]
mod tests;

/// A string that has already been escaped.
///
/// [`escape_expression`] returns the wrapped text verbatim, so helpers
/// returning markup wrap it in a `SafeString` to keep it intact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SafeString(String);

impl SafeString {
    /// Marks `text` as escaped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use template_runtime::{escape_expression, SafeString, Value};
    /// let markup = SafeString::new("<b>bold</b>");
    /// assert_eq!(escape_expression(&Value::Safe(markup)), "<b>bold</b>");
    /// ```
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwraps the text, dropping the escaped marker.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SafeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SafeString {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for SafeString {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// Escapes HTML-significant characters in `text`.
///
/// Existing entities are escaped again: `&amp;` becomes `&amp;amp;`. This
/// keeps escaped snippets displayable as literal text.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '/' => escaped.push_str("&#x2F;"),
            '`' => escaped.push_str("&#x60;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Renders a value for interpolation into HTML.
///
/// Falsy values render as the empty string and safe strings pass through
/// unchanged. Anything else is converted to text and escaped.
pub fn escape_expression(value: &Value) -> String {
    if !value.is_truthy() {
        return String::new();
    }

    match value {
        Value::Safe(safe) => safe.as_str().to_string(),
        other => escape_html(&other.to_string()),
    }
}

/// Whether a conditional should treat `value` as empty.
///
/// True for `false`, absence and empty sequences only; `0` and `""` are
/// not empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Bool(false) | Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
