//! Registries and settings shared by the templates built from them.
//!
//! An [`Environment`] is passed explicitly to every [`Template`], so tests
//! and embedders can run isolated environments side by side. A process-wide
//! instance exists for the outermost integration layer only, see
//! [`Environment::global`].
//!
//! # Examples
//!
//! ```rust
//! use template_runtime::{Environment, HandlebarsCompiler, MissingHelperPolicy, RuntimeConfig};
//!
//! let environment = Environment::builder()
//!     .config(RuntimeConfig {
//!         missing_helper: MissingHelperPolicy::Fail,
//!         ..Default::default()
//!     })
//!     .compiler(HandlebarsCompiler)
//!     .build();
//!
//! environment.register_partial("greeting", "Hello {{name}}!");
//! assert!(environment.partials().contains("greeting"));
//! ```

use crate::compiler::Compiler;
use crate::config::RuntimeConfig;
use crate::errors::RenderResult;
use crate::helpers::{HelperDef, HelperOptions, HelperRegistry};
use crate::logging::{LogLevel, Logger, TracingLogger};
use crate::partials::{Partial, PartialRegistry};
use crate::value::Value;
use crate::vm::{Template, TemplateSpec};
use std::fmt;
use std::sync::{Arc, OnceLock};

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;

static GLOBAL: OnceLock<Arc<Environment>> = OnceLock::new();

/// Helper and partial registries plus runtime settings.
pub struct Environment {
    helpers: HelperRegistry,
    partials: PartialRegistry,
    config: RuntimeConfig,
    compiler: Option<Arc<dyn Compiler>>,
    logger: Arc<dyn Logger>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Creates an environment with the built-in helpers, default settings
    /// and no compiler.
    pub fn new() -> Self {
        Self {
            helpers: HelperRegistry::with_builtins(),
            partials: PartialRegistry::new(),
            config: RuntimeConfig::default(),
            compiler: None,
            logger: Arc::new(TracingLogger),
        }
    }

    /// Starts an [`EnvironmentBuilder`] with default settings.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use template_runtime::{Environment, HandlebarsCompiler, MissingHelperPolicy, RuntimeConfig};
    /// let config = RuntimeConfig {
    ///     missing_helper: MissingHelperPolicy::Fail,
    ///     ..RuntimeConfig::default()
    /// };
    /// let environment = Environment::builder()
    ///     .config(config)
    ///     .compiler(HandlebarsCompiler)
    ///     .build();
    ///
    /// assert!(environment.compiler().is_some());
    /// assert_eq!(environment.config().missing_helper, MissingHelperPolicy::Fail);
    /// ```
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// The process-wide environment.
    ///
    /// Initialized with [`Environment::new`] on first access unless
    /// [`Environment::install_global`] ran before.
    pub fn global() -> &'static Arc<Environment> {
        GLOBAL.get_or_init(|| Arc::new(Environment::new()))
    }

    /// Installs `environment` as the process-wide environment.
    ///
    /// # Errors
    ///
    /// Returns `environment` back if the global one was already initialized.
    pub fn install_global(environment: Arc<Environment>) -> Result<(), Arc<Environment>> {
        GLOBAL.set(environment)
    }

    /// Helpers shared by every template of this environment.
    pub fn helpers(&self) -> &HelperRegistry {
        &self.helpers
    }

    /// Partials shared by every template of this environment.
    pub fn partials(&self) -> &PartialRegistry {
        &self.partials
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The bound compiler; `None` in vm mode.
    pub fn compiler(&self) -> Option<&Arc<dyn Compiler>> {
        self.compiler.as_ref()
    }

    /// Registers `helper` under `name`, replacing any previous entry.
    pub fn register_helper<H>(&self, name: &str, helper: H)
    where
        H: HelperDef + 'static,
    {
        self.helpers.register_helper(name, helper);
    }

    /// Registers `helper` with `not` as its negated counterpart.
    pub fn register_helper_with_not<H, N>(&self, name: &str, helper: H, not: N)
    where
        H: HelperDef + 'static,
        N: HelperDef + 'static,
    {
        self.helpers.register_helper_with_not(name, helper, not);
    }

    /// Registers a closure as helper `name`.
    ///
    /// The closure receives the current scope, the helper's context and the
    /// invocation options.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use template_runtime::{Environment, HelperOptions, Template, Value};
    /// # fn main() -> Result<(), template_runtime::Error> {
    /// let environment = std::sync::Arc::new(Environment::new());
    /// environment.register_fn("shout", |_, context, _| Ok(context.to_string().to_uppercase()));
    ///
    /// let template = Template::from_fn(environment, |frame, context, _| {
    ///     frame.call_helper("shout", context, context, &HelperOptions::new(frame))
    /// });
    /// assert_eq!(template.render(&Value::from("hey"))?, "HEY");
    /// # Ok(())
    /// # }
    /// ```
    pub fn register_fn<F>(&self, name: &str, f: F)
    where
        F: Fn(&Value, &Value, &HelperOptions<'_>) -> RenderResult + Send + Sync + 'static,
    {
        self.helpers.register_fn(name, f);
    }

    /// Registers a compiled template or raw source as partial `name`.
    ///
    /// Raw source is compiled on first use, which needs a bound compiler.
    pub fn register_partial(&self, name: &str, partial: impl Into<Partial>) {
        self.partials.register_partial(name, partial);
    }

    /// Wraps a generated program into a template bound to this environment.
    pub fn template(self: &Arc<Self>, spec: Arc<dyn TemplateSpec>) -> Template {
        Template::new(Arc::clone(self), spec)
    }

    /// Sends `message` to the installed logger.
    pub fn log(&self, level: LogLevel, message: &str) {
        self.logger.log(level, message);
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("helpers", &self.helpers.names())
            .field("partials", &self.partials.names())
            .field("config", &self.config)
            .field("compiler", &self.compiler.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for environments with non-default settings.
#[derive(Default)]
pub struct EnvironmentBuilder {
    config: RuntimeConfig,
    compiler: Option<Arc<dyn Compiler>>,
    logger: Option<Arc<dyn Logger>>,
}

impl EnvironmentBuilder {
    /// Replaces the default [`RuntimeConfig`].
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds a compiler for partials registered as raw source.
    pub fn compiler<C>(mut self, compiler: C) -> Self
    where
        C: Compiler + 'static,
    {
        self.compiler = Some(Arc::new(compiler));
        self
    }

    /// Routes runtime log calls to `logger` instead of [`TracingLogger`].
    pub fn logger<L>(mut self, logger: L) -> Self
    where
        L: Logger + 'static,
    {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Builds the environment with the built-in helpers registered.
    pub fn build(self) -> Arc<Environment> {
        Arc::new(Environment {
            helpers: HelperRegistry::with_builtins(),
            partials: PartialRegistry::new(),
            config: self.config,
            compiler: self.compiler,
            logger: self.logger.unwrap_or_else(|| Arc::new(TracingLogger)),
        })
    }
}
