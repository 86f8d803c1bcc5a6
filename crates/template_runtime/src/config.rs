//! Runtime configuration.
//!
//! The configuration is plain data, deserializable from TOML so hosts can
//! keep it next to the rest of their settings:
//!
//! ```toml
//! missing_helper = "fail"
//! max_partial_depth = 32
//! max_output_bytes = 1048576
//! ```

use crate::errors::Error;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Default limit on nested partial invocations.
pub const DEFAULT_MAX_PARTIAL_DEPTH: usize = 64;

/// How lookups of helpers that do not exist are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingHelperPolicy {
    /// Value lookups fail with `MissingProperty`, block lookups render empty.
    #[default]
    Asymmetric,
    /// Both value and block lookups fail.
    Fail,
    /// Value lookups resolve to `Null`, block lookups render empty.
    Empty,
}

/// Behaviour and budgets applied while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Resolution of missing helpers.
    ///
    /// **Default**: [`MissingHelperPolicy::Asymmetric`]
    pub missing_helper: MissingHelperPolicy,

    /// Maximum nesting depth of partial invocations.
    ///
    /// Guards against partials that include themselves without end.
    ///
    /// **Default**: 64
    pub max_partial_depth: usize,

    /// Maximum bytes a single block iteration may accumulate.
    ///
    /// Checked by the iterating helpers (`each`, `blockHelperMissing`).
    ///
    /// **Default**: unbounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_bytes: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            missing_helper: MissingHelperPolicy::default(),
            max_partial_depth: DEFAULT_MAX_PARTIAL_DEPTH,
            max_output_bytes: None,
        }
    }
}

impl RuntimeConfig {
    /// Parses a configuration from TOML; absent keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` when the text is not valid TOML or a
    /// value has the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }
}
