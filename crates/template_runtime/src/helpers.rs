//! # Helpers
//!
//! Named functions invocable from templates, and the built-in block helpers
//! every environment starts with.
//!
//! ## Built-in Helpers
//!
//! - `if` / `unless`: pick the block or the inverse from the context's truth
//! - `each`: render the block once per sequence element
//! - `with`: render the block with the context as the new scope
//! - `blockHelperMissing`: block syntax over a plain context value
//! - `helperMissing`: references to an unknown helper name
//!
//! ## Examples
//!
//! ```rust
//! # use template_runtime::HelperRegistry;
//! let registry = HelperRegistry::with_builtins();
//! registry.register_fn("shout", |_scope, context, _options| {
//!     Ok(context.to_string().to_uppercase())
//! });
//! assert!(registry.contains("shout"));
//! assert!(registry.contains("each"));
//! ```

use crate::errors::RenderResult;
use crate::program::Program;
use crate::utils::is_empty;
use crate::value::Value;
use crate::vm::Frame;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(test)]
#[path = "helpers_tests.rs"]
mod tests;

/// Registry name of the helper dispatching blocks over plain values.
pub const BLOCK_HELPER_MISSING: &str = "blockHelperMissing";

/// Registry name of the helper dispatching blocks over unknown helpers.
pub const HELPER_MISSING: &str = "helperMissing";

/// A helper callable from generated template code.
///
/// `scope` is the caller's current scope and `context` the helper's
/// argument. Block helpers render `options.render_block` and
/// `options.render_inverse` against whichever scope they choose.
pub trait HelperDef: Send + Sync {
    fn call(&self, scope: &Value, context: &Value, options: &HelperOptions<'_>) -> RenderResult;
}

/// Adapter turning a closure into a [`HelperDef`].
struct FnHelper<F>(F);

impl<F> HelperDef for FnHelper<F>
where
    F: Fn(&Value, &Value, &HelperOptions<'_>) -> RenderResult + Send + Sync,
{
    fn call(&self, scope: &Value, context: &Value, options: &HelperOptions<'_>) -> RenderResult {
        (self.0)(scope, context, options)
    }
}

/// The record passed alongside the context to every helper invocation.
///
/// `inverse` defaults to the container's no-op program, so helpers may
/// render it unconditionally.
#[derive(Clone)]
pub struct HelperOptions<'a> {
    frame: &'a Frame<'a>,
    block: Option<Program>,
    inverse: Program,
    data: Option<Value>,
}

impl<'a> HelperOptions<'a> {
    /// Options for a non-block invocation: no block, no-op inverse.
    pub fn new(frame: &'a Frame<'a>) -> Self {
        Self {
            frame,
            block: None,
            inverse: frame.noop(),
            data: None,
        }
    }

    /// Attaches the block body, which makes this a block invocation.
    pub fn with_block(mut self, block: Program) -> Self {
        self.block = Some(block);
        self
    }

    /// Attaches the `{{else}}` body.
    pub fn with_inverse(mut self, inverse: Program) -> Self {
        self.inverse = inverse;
        self
    }

    /// Attaches private data, available to helpers through [`Self::data`].
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The frame of the render this invocation belongs to.
    pub fn frame(&self) -> &'a Frame<'a> {
        self.frame
    }

    pub fn block(&self) -> Option<&Program> {
        self.block.as_ref()
    }

    /// The `{{else}}` body, the no-op program when none was attached.
    pub fn inverse(&self) -> &Program {
        &self.inverse
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Whether the invocation carries a block body.
    pub fn is_block(&self) -> bool {
        self.block.is_some()
    }

    /// Renders the block body against `context`; empty when there is none.
    pub fn render_block(&self, context: &Value) -> RenderResult {
        match &self.block {
            Some(block) => block.call(self.frame, context, None),
            None => Ok(String::new()),
        }
    }

    /// Renders the inverse (`{{else}}`) body against `context`.
    pub fn render_inverse(&self, context: &Value) -> RenderResult {
        self.inverse.call(self.frame, context, None)
    }

    /// Options with block and inverse exchanged.
    ///
    /// Without a block, the swapped inverse is the no-op program.
    pub fn swapped(&self) -> Self {
        Self {
            frame: self.frame,
            block: Some(self.inverse.clone()),
            inverse: self.block.clone().unwrap_or_else(|| self.frame.noop()),
            data: self.data.clone(),
        }
    }
}

impl fmt::Debug for HelperOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperOptions")
            .field("block", &self.block)
            .field("inverse", &self.inverse)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// A registered helper with its optional negated counterpart.
#[derive(Clone)]
pub struct RegisteredHelper {
    helper: Arc<dyn HelperDef>,
    not: Option<Arc<dyn HelperDef>>,
}

impl RegisteredHelper {
    pub fn helper(&self) -> &Arc<dyn HelperDef> {
        &self.helper
    }

    /// The negation registered alongside the helper, if any.
    pub fn not(&self) -> Option<&Arc<dyn HelperDef>> {
        self.not.as_ref()
    }

    /// Invokes the helper itself, never its negation.
    ///
    /// # Errors
    ///
    /// Propagates the helper's error.
    pub fn call(&self, scope: &Value, context: &Value, options: &HelperOptions<'_>) -> RenderResult {
        self.helper.call(scope, context, options)
    }
}

/// Mapping from helper name to helper.
///
/// Registration only adds or replaces entries; there is no removal.
#[derive(Default)]
pub struct HelperRegistry {
    helpers: RwLock<HashMap<String, RegisteredHelper>>,
}

impl HelperRegistry {
    /// Creates an empty registry, typically used for per-render overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the built-in helpers.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_builtins();
        registry
    }

    fn register_builtins(&self) {
        self.register_helper(HELPER_MISSING, HelperMissingHelper);
        self.register_helper(BLOCK_HELPER_MISSING, BlockHelperMissingHelper);
        self.register_helper("each", EachHelper);
        self.register_helper("if", IfHelper);
        self.register_helper("unless", UnlessHelper);
        self.register_helper("with", WithHelper);
    }

    /// Stores `helper` under `name`, replacing any previous entry.
    pub fn register_helper<H>(&self, name: &str, helper: H)
    where
        H: HelperDef + 'static,
    {
        self.insert(name, Arc::new(helper), None);
    }

    /// Stores `helper` under `name` with `not` as its retrievable negation.
    pub fn register_helper_with_not<H, N>(&self, name: &str, helper: H, not: N)
    where
        H: HelperDef + 'static,
        N: HelperDef + 'static,
    {
        self.insert(name, Arc::new(helper), Some(Arc::new(not)));
    }

    /// Stores a closure helper under `name`.
    pub fn register_fn<F>(&self, name: &str, f: F)
    where
        F: Fn(&Value, &Value, &HelperOptions<'_>) -> RenderResult + Send + Sync + 'static,
    {
        self.register_helper(name, FnHelper(f));
    }

    fn insert(&self, name: &str, helper: Arc<dyn HelperDef>, not: Option<Arc<dyn HelperDef>>) {
        self.helpers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), RegisteredHelper { helper, not });
    }

    /// Returns a handle to the helper registered under `name`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use template_runtime::HelperRegistry;
    /// let registry = HelperRegistry::with_builtins();
    /// registry.register_fn("shout", |_, context, _| Ok(context.to_string().to_uppercase()));
    ///
    /// assert!(registry.get("shout").is_some());
    /// assert!(registry.get("each").is_some_and(|helper| helper.not().is_none()));
    /// assert!(registry.get("whisper").is_none());
    /// ```
    pub fn get(&self, name: &str) -> Option<RegisteredHelper> {
        self.helpers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .helpers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

// ================================
// Built-in Helpers
// ================================

/// Renders the block once per element, concatenating the results.
fn render_each(items: &[Value], options: &HelperOptions<'_>) -> RenderResult {
    let mut rendered = String::new();
    for item in items {
        rendered.push_str(&options.render_block(item)?);
        options.frame().check_output_budget(rendered.len())?;
    }
    Ok(rendered)
}

/// Reference to an unknown helper; `context` carries the helper's name.
///
/// Plain expressions and blocks are told apart by whether `options` carries
/// a block body.
pub(crate) struct HelperMissingHelper;

impl HelperDef for HelperMissingHelper {
    fn call(&self, _: &Value, context: &Value, options: &HelperOptions<'_>) -> RenderResult {
        options.frame().resolve_missing(&context.to_string(), options)
    }
}

/// Block syntax over a plain context value, `{{#value}}...{{/value}}`.
///
/// A lazy context is resolved with [`Value::resolve`], which never yields
/// another lazy, so the re-dispatch happens at most once.
pub(crate) struct BlockHelperMissingHelper;

impl HelperDef for BlockHelperMissingHelper {
    fn call(&self, scope: &Value, context: &Value, options: &HelperOptions<'_>) -> RenderResult {
        match context {
            Value::Lazy(_) => match context.resolve() {
                Value::Lazy(_) => options.render_inverse(scope),
                resolved => self.call(scope, &resolved, options),
            },
            Value::Bool(true) => options.render_block(scope),
            Value::Bool(false) | Value::Null => options.render_inverse(scope),
            Value::Array(items) if items.is_empty() => options.render_inverse(scope),
            Value::Array(items) => render_each(items, options),
            other => options.render_block(other),
        }
    }
}

/// Iterates a non-empty sequence; anything else renders the inverse.
pub(crate) struct EachHelper;

impl HelperDef for EachHelper {
    fn call(&self, scope: &Value, context: &Value, options: &HelperOptions<'_>) -> RenderResult {
        match context {
            Value::Array(items) if !items.is_empty() => render_each(items, options),
            _ => options.render_inverse(scope),
        }
    }
}

pub(crate) struct IfHelper;

impl HelperDef for IfHelper {
    fn call(&self, scope: &Value, context: &Value, options: &HelperOptions<'_>) -> RenderResult {
        if !context.is_truthy() || is_empty(context) {
            options.render_inverse(scope)
        } else {
            options.render_block(scope)
        }
    }
}

/// `if` with block and inverse exchanged.
pub(crate) struct UnlessHelper;

impl HelperDef for UnlessHelper {
    fn call(&self, scope: &Value, context: &Value, options: &HelperOptions<'_>) -> RenderResult {
        IfHelper.call(scope, context, &options.swapped())
    }
}

/// Shifts the scope to the context; the inverse is never rendered.
pub(crate) struct WithHelper;

impl HelperDef for WithHelper {
    fn call(&self, _: &Value, context: &Value, options: &HelperOptions<'_>) -> RenderResult {
        options.render_block(context)
    }
}
