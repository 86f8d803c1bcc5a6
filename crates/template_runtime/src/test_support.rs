//! Shared fixtures for unit tests.

use crate::environment::Environment;
use crate::errors::RenderResult;
use crate::helpers::HelperOptions;
use crate::program::{block_fn, BlockFn};
use crate::value::Value;
use crate::vm::{Frame, Template};
use std::sync::Arc;

/// Runs `f` inside a render of a template bound to `environment`.
pub(crate) fn with_frame<F>(environment: Arc<Environment>, f: F) -> RenderResult
where
    F: Fn(&Frame<'_>) -> RenderResult + Send + Sync + 'static,
{
    Template::from_fn(environment, move |frame, _, _| f(frame)).render(&Value::Null)
}

/// Block rendering `[context]`, so the scope a helper chose is visible.
pub(crate) fn echo_block() -> BlockFn {
    block_fn(|frame, context, _, _| Ok(format!("[{}]", frame.escape_expression(context))))
}

/// Block rendering a fixed marker.
pub(crate) fn text_block(text: &'static str) -> BlockFn {
    block_fn(move |_, _, _, _| Ok(text.to_string()))
}

/// Calls helper `name` as a block helper with `fn`/`inverse` bodies.
pub(crate) fn call_block_helper(
    frame: &Frame<'_>,
    name: &str,
    scope: &Value,
    context: &Value,
    block: &BlockFn,
    inverse: &BlockFn,
) -> RenderResult {
    let options = HelperOptions::new(frame)
        .with_block(frame.program_with_depth(block, None, Vec::new()))
        .with_inverse(frame.program_with_depth(inverse, None, Vec::new()));
    frame.call_helper(name, scope, context, &options)
}
