//! # Template Virtual Machine
//!
//! Wraps compiler-generated programs into callable [`Template`]s.
//!
//! A compiler emits a [`TemplateSpec`]: code that renders one template given
//! a [`Frame`], the root context and optional data. The frame is the
//! generated code's only view of the runtime. Through it the program
//! escapes values, realizes nested blocks via the container's program
//! cache, invokes helpers and renders partials.
//!
//! ## Lifecycle
//!
//! ```text
//! Template::new(environment, spec)
//!     ↓ builds once
//! Container (escaping, program cache, no-op, bound partial invoker)
//!     ↓ every render
//! Frame { container, render options }  →  spec.render(frame, context, data)
//! ```
//!
//! The container, and with it the program cache, lives as long as the
//! template and is shared by all of its renders.
//!
//! ## Examples
//!
//! ```rust
//! # use template_runtime::{block_fn, Environment, HelperOptions, Template, Value};
//! # use serde_json::json;
//! # fn main() -> Result<(), template_runtime::Error> {
//! // Generated code for "{{#each items}}{{this}}{{/each}}"
//! let item = block_fn(|frame, context, _data, _depths| Ok(frame.escape_expression(context)));
//! let template = Template::from_fn(Environment::new().into(), move |frame, context, data| {
//!     let items = context.get("items").cloned().unwrap_or_default();
//!     let options = HelperOptions::new(frame).with_block(frame.program(1, &item, data.cloned()));
//!     frame.call_helper("each", context, &items, &options)
//! });
//!
//! let rendered = template.render(&Value::from(json!({"items": ["a", "b"]})))?;
//! assert_eq!(rendered, "ab");
//! # Ok(())
//! # }
//! ```

use crate::config::{MissingHelperPolicy, RuntimeConfig};
use crate::environment::Environment;
use crate::errors::{Error, RenderResult};
use crate::helpers::{
    BlockHelperMissingHelper, HelperDef, HelperOptions, HelperRegistry, RegisteredHelper,
    BLOCK_HELPER_MISSING, HELPER_MISSING,
};
use crate::logging::LogLevel;
use crate::partials::{invoke_partial, Partial, PartialRegistry};
use crate::program::{block_fn, program, program_with_depth, BlockFn, Program, ProgramRegistry};
use crate::utils::escape_expression;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "vm_tests.rs"]
mod tests;

/// A compiler-generated template program.
///
/// Implemented for closures of the same shape, which is how hand-written
/// and generated programs are usually supplied.
pub trait TemplateSpec: Send + Sync {
    fn render(&self, frame: &Frame<'_>, context: &Value, data: Option<&Value>) -> RenderResult;
}

impl<F> TemplateSpec for F
where
    F: Fn(&Frame<'_>, &Value, Option<&Value>) -> RenderResult + Send + Sync,
{
    fn render(&self, frame: &Frame<'_>, context: &Value, data: Option<&Value>) -> RenderResult {
        self(frame, context, data)
    }
}

/// Caller-supplied options for one render.
///
/// Override registries are consulted before the environment's registries
/// and are passed on to every partial rendered within the call.
#[derive(Clone, Default)]
pub struct RenderOptions {
    pub helpers: Option<Arc<HelperRegistry>>,
    pub partials: Option<Arc<PartialRegistry>>,
    pub data: Option<Value>,
    depth: usize,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Helpers consulted before the environment's for this render and its
    /// partials.
    pub fn with_helpers(mut self, helpers: Arc<HelperRegistry>) -> Self {
        self.helpers = Some(helpers);
        self
    }

    /// Partials consulted before the environment's for this render and its
    /// partials.
    pub fn with_partials(mut self, partials: Arc<PartialRegistry>) -> Self {
        self.partials = Some(partials);
        self
    }

    /// Data handed to the top-level program. Partials do not inherit it.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Partial nesting depth of the render these options belong to.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Options for a partial rendered from within this render.
    fn nested(&self) -> Self {
        Self {
            helpers: self.helpers.clone(),
            partials: self.partials.clone(),
            data: None,
            depth: self.depth + 1,
        }
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("helpers", &self.helpers.as_ref().map(|h| h.names()))
            .field("partials", &self.partials.as_ref().map(|p| p.names()))
            .field("data", &self.data)
            .field("depth", &self.depth)
            .finish()
    }
}

/// Per-template bundle of runtime primitives.
///
/// Built once per compiled template; apart from the lazily populated
/// program cache it does not change afterwards.
pub struct Container {
    environment: Arc<Environment>,
    programs: ProgramRegistry,
    noop: Program,
}

impl Container {
    /// A container with an empty program cache.
    pub fn new(environment: Arc<Environment>) -> Self {
        Self {
            environment,
            programs: ProgramRegistry::new(),
            noop: program(block_fn(|_, _, _, _| Ok(String::new())), None),
        }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// See [`escape_expression`].
    pub fn escape_expression(&self, value: &Value) -> String {
        escape_expression(value)
    }

    /// Cached program for block `index`; see [`ProgramRegistry::get`].
    pub fn program(&self, index: usize, block: &BlockFn, data: Option<Value>) -> Program {
        self.programs.get(index, block, data)
    }

    /// Uncached program closing over ancestor contexts.
    pub fn program_with_depth(
        &self,
        block: &BlockFn,
        data: Option<Value>,
        depths: Vec<Value>,
    ) -> Program {
        program_with_depth(Arc::clone(block), data, depths)
    }

    /// The shared program that renders nothing.
    pub fn noop(&self) -> Program {
        self.noop.clone()
    }

    pub fn programs(&self) -> &ProgramRegistry {
        &self.programs
    }

    /// Renders `partial` with this container's environment.
    ///
    /// Partials compiled on the fly are stored back into `partials`.
    pub fn invoke_partial(
        &self,
        partial: Option<Partial>,
        name: &str,
        context: &Value,
        options: &RenderOptions,
        partials: &PartialRegistry,
    ) -> RenderResult {
        invoke_partial(partial, name, context, options, partials, &self.environment)
    }
}

/// The runtime as seen by generated code during one render.
pub struct Frame<'a> {
    container: &'a Container,
    options: &'a RenderOptions,
}

impl<'a> Frame<'a> {
    pub fn container(&self) -> &'a Container {
        self.container
    }

    pub fn environment(&self) -> &'a Arc<Environment> {
        self.container.environment()
    }

    /// Settings of the environment this render runs in.
    pub fn config(&self) -> &'a RuntimeConfig {
        self.container.environment().config()
    }

    /// Overrides and depth of the current render.
    pub fn options(&self) -> &'a RenderOptions {
        self.options
    }

    pub fn escape_expression(&self, value: &Value) -> String {
        self.container.escape_expression(value)
    }

    /// Cached program for block `index`; see [`ProgramRegistry::get`].
    pub fn program(&self, index: usize, block: &BlockFn, data: Option<Value>) -> Program {
        self.container.program(index, block, data)
    }

    pub fn program_with_depth(
        &self,
        block: &BlockFn,
        data: Option<Value>,
        depths: Vec<Value>,
    ) -> Program {
        self.container.program_with_depth(block, data, depths)
    }

    pub fn noop(&self) -> Program {
        self.container.noop()
    }

    /// Looks `name` up in the override registry, then the environment.
    pub fn helper(&self, name: &str) -> Option<RegisteredHelper> {
        self.options
            .helpers
            .as_ref()
            .and_then(|helpers| helpers.get(name))
            .or_else(|| self.environment().helpers().get(name))
    }

    /// Invokes helper `name`.
    ///
    /// An unknown name is handed to the registered `helperMissing` helper
    /// with the name as its context. Without one the missing-helper policy
    /// applies directly, see [`Frame::resolve_missing`].
    ///
    /// # Errors
    ///
    /// - `Error::MissingProperty`: `name` is unknown and the policy rejects it
    /// - any error raised by the helper itself
    pub fn call_helper(
        &self,
        name: &str,
        scope: &Value,
        context: &Value,
        options: &HelperOptions<'_>,
    ) -> RenderResult {
        if let Some(helper) = self.helper(name) {
            return helper.call(scope, context, options);
        }

        match self.helper(HELPER_MISSING) {
            Some(missing) => missing.call(scope, &Value::from(name), options),
            None => self.resolve_missing(name, options),
        }
    }

    /// Renders a block whose head is a plain value, `{{#value}}`.
    pub fn block_helper_missing(
        &self,
        scope: &Value,
        context: &Value,
        options: &HelperOptions<'_>,
    ) -> RenderResult {
        match self.helper(BLOCK_HELPER_MISSING) {
            Some(helper) => helper.call(scope, context, options),
            None => BlockHelperMissingHelper.call(scope, context, options),
        }
    }

    /// Resolves a non-block reference to a helper that does not exist.
    pub fn resolve_missing_value(&self, name: &str) -> RenderResult<Value> {
        match self.config().missing_helper {
            MissingHelperPolicy::Asymmetric | MissingHelperPolicy::Fail => {
                Err(Error::MissingProperty {
                    name: name.to_string(),
                })
            }
            MissingHelperPolicy::Empty => Ok(Value::Null),
        }
    }

    /// Applies the missing-helper policy to the unknown helper `name`.
    ///
    /// Block invocations resolve through [`Frame::resolve_missing_block`],
    /// plain expressions through [`Frame::resolve_missing_value`] with the
    /// resolved value escaped.
    pub fn resolve_missing(&self, name: &str, options: &HelperOptions<'_>) -> RenderResult {
        if options.is_block() {
            self.resolve_missing_block(name, options)
        } else {
            Ok(self.escape_expression(&self.resolve_missing_value(name)?))
        }
    }

    /// Resolves a block invocation of a helper that does not exist.
    pub fn resolve_missing_block(&self, name: &str, _options: &HelperOptions<'_>) -> RenderResult {
        match self.config().missing_helper {
            MissingHelperPolicy::Fail => Err(Error::MissingProperty {
                name: name.to_string(),
            }),
            MissingHelperPolicy::Asymmetric | MissingHelperPolicy::Empty => {
                debug!("Missing block helper '{}' rendered empty", name);
                Ok(String::new())
            }
        }
    }

    /// Renders partial `name` against `context`.
    ///
    /// The override registry is searched first. A partial compiled from
    /// source is memoized in the registry it was found in.
    pub fn invoke_partial(&self, name: &str, context: &Value) -> RenderResult {
        let overridden = self
            .options
            .partials
            .as_ref()
            .and_then(|partials| partials.get(name).map(|partial| (&**partials, partial)));

        let (registry, partial) = match overridden {
            Some((registry, partial)) => (registry, Some(partial)),
            None => {
                let registry = self.environment().partials();
                (registry, registry.get(name))
            }
        };

        self.container
            .invoke_partial(partial, name, context, &self.options.nested(), registry)
    }

    /// Fails once accumulated block output exceeds the configured budget.
    pub fn check_output_budget(&self, len: usize) -> RenderResult<()> {
        match self.config().max_output_bytes {
            Some(limit) if len > limit => {
                warn!("Block output of {} bytes exceeds limit of {} bytes", len, limit);
                Err(Error::ResourceLimit {
                    limit_type: "output_size".to_string(),
                    message: format!("Block output {len} bytes exceeds limit of {limit} bytes"),
                })
            }
            _ => Ok(()),
        }
    }

    /// Forwards a message to the environment's logger.
    pub fn log(&self, level: LogLevel, message: &str) {
        self.environment().log(level, message);
    }
}

/// A compiled template, callable any number of times.
///
/// Cloning is cheap; clones share the container and its program cache.
#[derive(Clone)]
pub struct Template {
    inner: Arc<TemplateInner>,
}

struct TemplateInner {
    spec: Arc<dyn TemplateSpec>,
    container: Container,
}

impl Template {
    /// Wraps a generated program, building its container.
    pub fn new(environment: Arc<Environment>, spec: Arc<dyn TemplateSpec>) -> Self {
        Self {
            inner: Arc::new(TemplateInner {
                spec,
                container: Container::new(environment),
            }),
        }
    }

    /// Wraps a closure as the generated program.
    pub fn from_fn<F>(environment: Arc<Environment>, f: F) -> Self
    where
        F: Fn(&Frame<'_>, &Value, Option<&Value>) -> RenderResult + Send + Sync + 'static,
    {
        Self::new(environment, Arc::new(f))
    }

    /// Renders with default options.
    pub fn render(&self, context: &Value) -> RenderResult {
        self.render_with(context, &RenderOptions::default())
    }

    /// Renders with caller-supplied helpers, partials and data.
    ///
    /// # Errors
    ///
    /// - `Error::ResourceLimit`: the partial nesting budget is exhausted
    /// - any error raised by the program, its helpers or its partials
    pub fn render_with(&self, context: &Value, options: &RenderOptions) -> RenderResult {
        let limit = self.environment().config().max_partial_depth;
        if options.depth > limit {
            warn!("Partial nesting depth {} exceeds limit of {}", options.depth, limit);
            return Err(Error::ResourceLimit {
                limit_type: "partial_depth".to_string(),
                message: format!(
                    "Partial nesting depth {} exceeds limit of {}",
                    options.depth, limit
                ),
            });
        }

        debug!(depth = options.depth, "Rendering template");
        let frame = Frame {
            container: &self.inner.container,
            options,
        };
        self.inner.spec.render(&frame, context, options.data.as_ref())
    }

    pub fn container(&self) -> &Container {
        &self.inner.container
    }

    pub fn environment(&self) -> &Arc<Environment> {
        self.inner.container.environment()
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("cached_programs", &self.inner.container.programs().len())
            .finish_non_exhaustive()
    }
}
