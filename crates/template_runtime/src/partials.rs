//! Partial registry and invocation.
//!
//! A partial is either an already compiled [`Template`] or raw template
//! source. Raw source is compiled on first use when the environment has a
//! [`Compiler`](crate::Compiler) bound, and the compiled form replaces the
//! source in the registry it came from.

use crate::environment::Environment;
use crate::errors::{Error, RenderResult};
use crate::value::Value;
use crate::vm::{RenderOptions, Template};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

#[cfg(test)]
#[path = "partials_tests.rs"]
mod tests;

/// A registered partial.
#[derive(Clone)]
pub enum Partial {
    Compiled(Template),
    Source(String),
}

impl Partial {
    pub fn is_compiled(&self) -> bool {
        matches!(self, Partial::Compiled(_))
    }
}

impl fmt::Debug for Partial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partial::Compiled(_) => f.write_str("Compiled(..)"),
            Partial::Source(source) => f.debug_tuple("Source").field(source).finish(),
        }
    }
}

impl From<Template> for Partial {
    fn from(template: Template) -> Self {
        Partial::Compiled(template)
    }
}

impl From<&str> for Partial {
    fn from(source: &str) -> Self {
        Partial::Source(source.to_string())
    }
}

impl From<String> for Partial {
    fn from(source: String) -> Self {
        Partial::Source(source)
    }
}

/// Mapping from partial name to partial.
#[derive(Default)]
pub struct PartialRegistry {
    partials: RwLock<HashMap<String, Partial>>,
}

impl PartialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `partial` under `name`, replacing any previous entry.
    pub fn register_partial(&self, name: &str, partial: impl Into<Partial>) {
        self.partials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), partial.into());
    }

    pub fn get(&self, name: &str) -> Option<Partial> {
        self.partials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.partials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .partials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Renders `partial`, registered as `name`, against `context`.
///
/// Raw source is compiled with the environment's compiler and memoized in
/// `partials` under `name` before rendering, so later references skip
/// compilation.
///
/// # Errors
///
/// - `Error::MissingPartial`: `partial` is `None`
/// - `Error::PartialCompilationUnavailable`: raw source without a compiler
/// - `Error::PartialCompilation`: the compiler rejected the source
pub fn invoke_partial(
    partial: Option<Partial>,
    name: &str,
    context: &Value,
    options: &RenderOptions,
    partials: &PartialRegistry,
    environment: &Arc<Environment>,
) -> RenderResult {
    match partial {
        None => Err(Error::MissingPartial {
            name: name.to_string(),
        }),
        Some(Partial::Compiled(template)) => template.render_with(context, options),
        Some(Partial::Source(source)) => {
            let compiler =
                environment
                    .compiler()
                    .ok_or_else(|| Error::PartialCompilationUnavailable {
                        name: name.to_string(),
                    })?;

            debug!("Compiling partial {}", name);
            let template =
                compiler
                    .compile(&source, environment)
                    .map_err(|source| Error::PartialCompilation {
                        name: name.to_string(),
                        source,
                    })?;

            partials.register_partial(name, template.clone());
            template.render_with(context, options)
        }
    }
}
