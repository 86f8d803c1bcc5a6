//! Compiler binding used for partials registered as raw source.
//!
//! The runtime does not parse templates itself. An [`Environment`] without
//! a compiler runs in "vm mode" and rejects raw-source partials; binding a
//! [`Compiler`] lets them compile on first use.

use crate::environment::Environment;
use crate::errors::{BoxedSource, Error, RenderResult};
use crate::helpers::{HelperOptions, BLOCK_HELPER_MISSING, HELPER_MISSING};
use crate::utils::escape_html;
use crate::value::Value;
use crate::vm::{Frame, Template, TemplateSpec};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, Output, RenderContext, RenderError, RenderErrorReason,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
#[path = "compiler_tests.rs"]
mod tests;

/// Error reported by a compiler.
pub type CompileError = BoxedSource;

/// Turns template source into a [`Template`] bound to `environment`.
pub trait Compiler: Send + Sync {
    /// Compiles `source`.
    ///
    /// # Errors
    ///
    /// Returns the compiler's own error when `source` is not a valid
    /// template; it ends up as the source of `Error::PartialCompilation`.
    fn compile(&self, source: &str, environment: &Arc<Environment>)
        -> Result<Template, CompileError>;
}

const TEMPLATE_NAME: &str = "__source";
const PARTIAL_HELPER: &str = "__runtime_partial";

/// Block helpers left to the `handlebars` crate's own implementation.
const NATIVE_HELPERS: [&str; 6] = [
    "each",
    "if",
    "unless",
    "with",
    BLOCK_HELPER_MISSING,
    HELPER_MISSING,
];

/// Compiles source with the `handlebars` crate.
///
/// Output uses this crate's escaping policy. Expression helpers such as
/// `{{shout name}}` and partials such as `{{> footer}}` resolve through the
/// render's frame, so the environment's registries and the caller's
/// override registries apply. Block sections (`{{#if}}`, `{{#each}}`,
/// `{{#with}}`, `{{#unless}}`) keep the `handlebars` crate's semantics,
/// including its own truthiness rules.
///
/// # Examples
///
/// ```rust
/// # use template_runtime::{Compiler, Environment, HandlebarsCompiler, Value};
/// # fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// let environment = Environment::builder().compiler(HandlebarsCompiler).build();
/// environment.register_fn("shout", |_, context, _| Ok(context.to_string().to_uppercase()));
///
/// let template = HandlebarsCompiler.compile("{{shout name}}!", &environment)?;
/// let rendered = template.render(&Value::from(serde_json::json!({"name": "hey"})))?;
/// assert_eq!(rendered, "HEY!");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct HandlebarsCompiler;

impl Compiler for HandlebarsCompiler {
    fn compile(
        &self,
        source: &str,
        environment: &Arc<Environment>,
    ) -> Result<Template, CompileError> {
        let template = handlebars::Template::compile(source)?;

        Ok(Template::new(
            Arc::clone(environment),
            Arc::new(HandlebarsSpec { template }),
        ))
    }
}

struct HandlebarsSpec {
    template: handlebars::Template,
}

impl HandlebarsSpec {
    /// Builds a registry whose helpers and partials delegate to `frame`.
    fn registry<'f>(&self, frame: &'f Frame<'f>) -> RenderResult<Handlebars<'f>> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(escape_html);
        registry.register_template(TEMPLATE_NAME, self.template.clone());

        let helpers = bridged_helpers(frame);
        for name in &helpers {
            registry.register_helper(
                name,
                Box::new(RuntimeHelper {
                    frame,
                    name: name.clone(),
                }),
            );
        }

        registry.register_helper(PARTIAL_HELPER, Box::new(RuntimePartial { frame }));
        let partials = bridged_partials(frame);
        for name in &partials {
            registry
                .register_template_string(name, format!("{{{{{PARTIAL_HELPER} \"{name}\" this}}}}"))
                .map_err(|e| Error::with_source(format!("Partial {name} could not be bridged"), e))?;
        }

        debug!(
            helpers = helpers.len(),
            partials = partials.len(),
            "Bridged runtime registries into handlebars"
        );
        Ok(registry)
    }
}

impl TemplateSpec for HandlebarsSpec {
    fn render(&self, frame: &Frame<'_>, context: &Value, _: Option<&Value>) -> RenderResult {
        self.registry(frame)?
            .render(TEMPLATE_NAME, context)
            .map_err(|e| Error::with_source("Template rendering failed", e))
    }
}

/// Helper names visible to the frame, minus the natively handled blocks.
fn bridged_helpers(frame: &Frame<'_>) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = frame.environment().helpers().names().into_iter().collect();
    if let Some(helpers) = &frame.options().helpers {
        names.extend(helpers.names());
    }
    names.retain(|name| !NATIVE_HELPERS.contains(&name.as_str()));
    names
}

/// Partial names that can be referenced with `{{> name}}`.
fn bridged_partials(frame: &Frame<'_>) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = frame.environment().partials().names().into_iter().collect();
    if let Some(partials) = &frame.options().partials {
        names.extend(partials.names());
    }
    names.retain(|name| name != TEMPLATE_NAME && !name.contains(['"', '}', '{']));
    names
}

fn bridge_error(error: Error) -> RenderError {
    RenderErrorReason::Other(error.to_string()).into()
}

/// `{{name arg}}`, dispatched to the runtime helper `name`.
///
/// The first parameter becomes the helper's context; without one the
/// render's root context is used.
struct RuntimeHelper<'f> {
    frame: &'f Frame<'f>,
    name: String,
}

impl HelperDef for RuntimeHelper<'_> {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper,
        _: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> Result<(), RenderError> {
        let scope = Value::from(ctx.data().clone());
        let context = h
            .param(0)
            .map(|param| Value::from(param.value().clone()))
            .unwrap_or_else(|| scope.clone());

        let rendered = self
            .frame
            .call_helper(&self.name, &scope, &context, &HelperOptions::new(self.frame))
            .map_err(bridge_error)?;

        out.write(&rendered)?;
        Ok(())
    }
}

/// Target of the generated partial stubs, `{{__runtime_partial "name" this}}`.
struct RuntimePartial<'f> {
    frame: &'f Frame<'f>,
}

impl HelperDef for RuntimePartial<'_> {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper,
        _: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> Result<(), RenderError> {
        let name = h
            .param(0)
            .and_then(|param| param.value().as_str())
            .ok_or_else(|| RenderErrorReason::Other("partial name missing".to_string()))?;
        let context = h
            .param(1)
            .map(|param| Value::from(param.value().clone()))
            .unwrap_or_else(|| Value::from(ctx.data().clone()));

        let rendered = self
            .frame
            .invoke_partial(name, &context)
            .map_err(bridge_error)?;

        out.write(&rendered)?;
        Ok(())
    }
}
