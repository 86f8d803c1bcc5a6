//! Template Runtime
//!
//! Executes compiled logic-less templates. A compiler (not part of this
//! crate) turns template source into a [`TemplateSpec`]; this crate wraps it
//! into a [`Template`] and supplies everything the generated code calls back
//! into: HTML escaping, helpers, cached nested-block programs and partials.
//!
//! The process-wide functions here operate on [`Environment::global`] and
//! are meant for the outermost integration layer. Libraries and tests
//! should build their own [`Environment`].

use std::sync::Arc;

mod compiler;
mod config;
mod environment;
mod errors;
mod helpers;
mod logging;
mod partials;
mod program;
mod utils;
mod value;
mod vm;

#[cfg(test)]
mod test_support;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

pub use compiler::{CompileError, Compiler, HandlebarsCompiler};
pub use config::{MissingHelperPolicy, RuntimeConfig, DEFAULT_MAX_PARTIAL_DEPTH};
pub use environment::{Environment, EnvironmentBuilder};
pub use errors::{BoxedSource, Error, RenderResult};
pub use helpers::{
    HelperDef, HelperOptions, HelperRegistry, RegisteredHelper, BLOCK_HELPER_MISSING,
    HELPER_MISSING,
};
pub use logging::{LogLevel, Logger, TracingLogger};
pub use partials::{invoke_partial, Partial, PartialRegistry};
pub use program::{block_fn, program, program_with_depth, BlockFn, Program, ProgramRegistry};
pub use utils::{escape_expression, escape_html, is_empty, SafeString};
pub use value::{LazyValue, Object, Value, MAX_LAZY_DEPTH};
pub use vm::{Container, Frame, RenderOptions, Template, TemplateSpec};

/// Version of the runtime calling convention.
pub const VERSION: &str = "1.0.beta.2-yui";

/// Registers a helper in the process-wide environment.
pub fn register_helper<H>(name: &str, helper: H)
where
    H: HelperDef + 'static,
{
    Environment::global().register_helper(name, helper);
}

/// Registers a partial in the process-wide environment.
pub fn register_partial(name: &str, partial: impl Into<Partial>) {
    Environment::global().register_partial(name, partial);
}

/// Wraps a generated program into a template bound to the process-wide
/// environment.
pub fn template(spec: Arc<dyn TemplateSpec>) -> Template {
    Environment::global().template(spec)
}

/// Logs through the process-wide environment's logger.
///
/// `level` follows the numeric scale `0` (debug) to `3` (error).
pub fn log(level: u8, message: &str) {
    Environment::global().log(LogLevel::from_level(level), message);
}
