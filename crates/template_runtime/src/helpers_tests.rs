//! Tests for the helper registry and the built-in helpers.

use super::*;
use crate::config::{MissingHelperPolicy, RuntimeConfig};
use crate::environment::Environment;
use crate::errors::Error;
use crate::program::block_fn;
use crate::test_support::{call_block_helper, echo_block, text_block, with_frame};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn render_block_helper(name: &'static str, scope: Value, context: Value) -> RenderResult {
    render_block_helper_in(Environment::new().into(), name, scope, context)
}

fn render_block_helper_in(
    environment: Arc<Environment>,
    name: &'static str,
    scope: Value,
    context: Value,
) -> RenderResult {
    with_frame(environment, move |frame| {
        call_block_helper(
            frame,
            name,
            &scope,
            &context,
            &echo_block(),
            &text_block("inverse"),
        )
    })
}

// ================================
// Registry Tests
// ================================

#[test]
fn test_with_builtins_seeds_all_builtin_helpers() {
    let registry = HelperRegistry::with_builtins();
    assert_eq!(
        registry.names(),
        vec![
            "blockHelperMissing",
            "each",
            "helperMissing",
            "if",
            "unless",
            "with"
        ]
    );
}

#[test]
fn test_new_registry_is_empty() {
    let registry = HelperRegistry::new();
    assert!(registry.names().is_empty());
    assert!(registry.get("if").is_none());
}

#[test]
fn test_register_fn_replaces_existing_helper() {
    let registry = HelperRegistry::with_builtins();
    registry.register_fn("if", |_, _, _| Ok("replaced".to_string()));

    let rendered = with_frame(Environment::new().into(), move |frame| {
        let options = HelperOptions::new(frame);
        registry
            .get("if")
            .expect("if is registered")
            .call(&Value::Null, &Value::Null, &options)
    })
    .unwrap();

    assert_eq!(rendered, "replaced");
}

#[test]
fn test_register_helper_with_not_keeps_negation() {
    let registry = HelperRegistry::new();
    registry.register_helper_with_not("truthy", IfHelper, UnlessHelper);
    registry.register_helper("plain", WithHelper);

    assert!(registry.get("truthy").unwrap().not().is_some());
    assert!(registry.get("plain").unwrap().not().is_none());
}

#[test]
fn test_not_counterpart_is_callable() {
    let registry = Arc::new(HelperRegistry::new());
    registry.register_helper_with_not("truthy", IfHelper, UnlessHelper);

    let rendered = with_frame(Environment::new().into(), move |frame| {
        let not = registry.get("truthy").unwrap().not().cloned().unwrap();
        let options = HelperOptions::new(frame)
            .with_block(frame.program_with_depth(&text_block("yes"), None, Vec::new()))
            .with_inverse(frame.program_with_depth(&text_block("no"), None, Vec::new()));
        not.call(&Value::Null, &Value::Bool(true), &options)
    })
    .unwrap();

    assert_eq!(rendered, "no");
}

// ================================
// each
// ================================

#[test]
fn test_each_renders_block_per_element_in_order() {
    let rendered = with_frame(Environment::new().into(), |frame| {
        let block = block_fn(|_, context, _, _| Ok(format!("<{context}>")));
        call_block_helper(
            frame,
            "each",
            &Value::Null,
            &Value::from(json!([1, 2, 3])),
            &block,
            &text_block("inverse"),
        )
    })
    .unwrap();

    assert_eq!(rendered, "<1><2><3>");
}

#[test]
fn test_each_empty_sequence_renders_inverse() {
    let rendered = render_block_helper("each", Value::Null, Value::Array(vec![])).unwrap();
    assert_eq!(rendered, "inverse");
}

#[test]
fn test_each_non_sequence_renders_inverse() {
    assert_eq!(
        render_block_helper("each", Value::Null, Value::Null).unwrap(),
        "inverse"
    );
    assert_eq!(
        render_block_helper("each", Value::Null, Value::from(json!({"a": 1}))).unwrap(),
        "inverse"
    );
}

#[test]
fn test_each_inverse_receives_current_scope() {
    let rendered = with_frame(Environment::new().into(), |frame| {
        call_block_helper(
            frame,
            "each",
            &Value::from("scope"),
            &Value::Array(vec![]),
            &text_block("block"),
            &echo_block(),
        )
    })
    .unwrap();

    assert_eq!(rendered, "[scope]");
}

#[test]
fn test_each_respects_output_budget() {
    let environment = Environment::builder()
        .config(RuntimeConfig {
            max_output_bytes: Some(8),
            ..Default::default()
        })
        .build();

    let result = render_block_helper_in(
        environment,
        "each",
        Value::Null,
        Value::from(json!(["aaaa", "bbbb", "cccc"])),
    );

    assert!(matches!(result, Err(Error::ResourceLimit { .. })));
}

#[test]
fn test_each_propagates_block_errors() {
    let result = with_frame(Environment::new().into(), |frame| {
        let failing = block_fn(|_, _, _, _| Err(Error::exception("block failed")));
        call_block_helper(
            frame,
            "each",
            &Value::Null,
            &Value::from(json!([1, 2])),
            &failing,
            &text_block("inverse"),
        )
    });

    assert_eq!(result.unwrap_err().to_string(), "block failed");
}

// ================================
// if / unless / with
// ================================

#[test]
fn test_if_renders_block_with_current_scope() {
    let rendered = render_block_helper("if", Value::from("scope"), Value::Bool(true)).unwrap();
    assert_eq!(rendered, "[scope]");
}

#[test]
fn test_if_falsy_and_empty_render_inverse() {
    for context in [
        Value::Bool(false),
        Value::Null,
        Value::from(0),
        Value::from(""),
        Value::Array(vec![]),
    ] {
        let rendered = render_block_helper("if", Value::Null, context.clone()).unwrap();
        assert_eq!(rendered, "inverse", "context {context:?}");
    }
}

#[test]
fn test_if_truthy_values_render_block() {
    for context in [
        Value::from(1),
        Value::from("x"),
        Value::from(json!([0])),
        Value::from(json!({})),
    ] {
        let rendered = render_block_helper("if", Value::from("s"), context.clone()).unwrap();
        assert_eq!(rendered, "[s]", "context {context:?}");
    }
}

#[test]
fn test_unless_is_if_with_swapped_blocks() {
    let contexts = [
        Value::Bool(true),
        Value::Bool(false),
        Value::Null,
        Value::from(0),
        Value::from("text"),
        Value::Array(vec![]),
        Value::from(json!([1])),
    ];

    for context in contexts {
        let expected = {
            let context = context.clone();
            with_frame(Environment::new().into(), move |frame| {
                call_block_helper(
                    frame,
                    "if",
                    &Value::from("scope"),
                    &context,
                    &text_block("inverse"),
                    &echo_block(),
                )
            })
            .unwrap()
        };
        let actual = render_block_helper("unless", Value::from("scope"), context.clone()).unwrap();
        assert_eq!(actual, expected, "context {context:?}");
    }
}

#[test]
fn test_unless_without_block_renders_nothing_for_falsy() {
    let rendered = with_frame(Environment::new().into(), |frame| {
        frame.call_helper(
            "unless",
            &Value::Null,
            &Value::Bool(true),
            &HelperOptions::new(frame),
        )
    })
    .unwrap();

    assert_eq!(rendered, "");
}

#[test]
fn test_with_shifts_scope_to_context() {
    let rendered =
        render_block_helper("with", Value::from("outer"), Value::from("inner")).unwrap();
    assert_eq!(rendered, "[inner]");
}

#[test]
fn test_with_ignores_inverse_for_falsy_context() {
    let rendered = render_block_helper("with", Value::from("outer"), Value::Null).unwrap();
    assert_eq!(rendered, "[]");
}

// ================================
// blockHelperMissing
// ================================

#[test]
fn test_block_helper_missing_true_keeps_current_scope() {
    let rendered =
        render_block_helper("blockHelperMissing", Value::from("scope"), Value::Bool(true))
            .unwrap();
    assert_eq!(rendered, "[scope]");
}

#[test]
fn test_block_helper_missing_false_and_null_render_inverse() {
    for context in [Value::Bool(false), Value::Null] {
        let rendered =
            render_block_helper("blockHelperMissing", Value::from("scope"), context).unwrap();
        assert_eq!(rendered, "inverse");
    }
}

#[test]
fn test_block_helper_missing_iterates_sequences() {
    let rendered = render_block_helper(
        "blockHelperMissing",
        Value::Null,
        Value::from(json!(["a", "b"])),
    )
    .unwrap();
    assert_eq!(rendered, "[a][b]");

    let empty =
        render_block_helper("blockHelperMissing", Value::Null, Value::Array(vec![])).unwrap();
    assert_eq!(empty, "inverse");
}

#[test]
fn test_block_helper_missing_other_values_become_scope() {
    let rendered =
        render_block_helper("blockHelperMissing", Value::from("outer"), Value::from("value"))
            .unwrap();
    assert_eq!(rendered, "[value]");

    let number = render_block_helper("blockHelperMissing", Value::Null, Value::from(7)).unwrap();
    assert_eq!(number, "[7]");
}

#[test]
fn test_block_helper_missing_invokes_lazy_then_redispatches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let lazy = Value::lazy(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Value::from(json!(["x", "y"]))
    });

    let rendered = render_block_helper("blockHelperMissing", Value::Null, lazy).unwrap();

    assert_eq!(rendered, "[x][y]");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_block_helper_missing_lazy_true_keeps_scope() {
    let lazy = Value::lazy(|| Value::Bool(true));
    let rendered =
        render_block_helper("blockHelperMissing", Value::from("scope"), lazy).unwrap();
    assert_eq!(rendered, "[scope]");
}

#[test]
fn test_block_helper_missing_endless_lazy_renders_inverse() {
    fn endless() -> Value {
        Value::lazy(endless)
    }

    let rendered =
        render_block_helper("blockHelperMissing", Value::from("scope"), endless()).unwrap();
    assert_eq!(rendered, "inverse");
}

// ================================
// helperMissing
// ================================

#[test]
fn test_helper_missing_block_form_renders_empty_by_default() {
    let rendered = render_block_helper("helperMissing", Value::Null, Value::from("nope")).unwrap();
    assert_eq!(rendered, "");
}

#[test]
fn test_helper_missing_block_form_fails_under_fail_policy() {
    let environment = Environment::builder()
        .config(RuntimeConfig {
            missing_helper: MissingHelperPolicy::Fail,
            ..Default::default()
        })
        .build();

    let result = render_block_helper_in(
        environment,
        "helperMissing",
        Value::Null,
        Value::from("nope"),
    );

    match result {
        Err(Error::MissingProperty { name }) => assert_eq!(name, "nope"),
        other => panic!("Expected MissingProperty error, got {other:?}"),
    }
}

#[test]
fn test_helper_missing_expression_form_fails_by_default() {
    let result = with_frame(Environment::new().into(), |frame| {
        frame.call_helper(
            HELPER_MISSING,
            &Value::Null,
            &Value::from("title"),
            &HelperOptions::new(frame),
        )
    });

    match result {
        Err(Error::MissingProperty { name }) => assert_eq!(name, "title"),
        other => panic!("Expected MissingProperty error, got {other:?}"),
    }
}

// ================================
// HelperOptions
// ================================

#[test]
fn test_helper_options_defaults() {
    let rendered = with_frame(Environment::new().into(), |frame| {
        let options = HelperOptions::new(frame);
        assert!(!options.is_block());
        assert!(options.block().is_none());
        assert!(options.data().is_none());
        assert!(Program::ptr_eq(options.inverse(), &frame.noop()));
        Ok(format!(
            "{}{}",
            options.render_block(&Value::from("x"))?,
            options.render_inverse(&Value::from("x"))?
        ))
    })
    .unwrap();

    assert_eq!(rendered, "");
}

#[test]
fn test_helper_options_swapped_exchanges_programs() {
    let rendered = with_frame(Environment::new().into(), |frame| {
        let options = HelperOptions::new(frame)
            .with_block(frame.program_with_depth(&text_block("fn"), None, Vec::new()))
            .with_inverse(frame.program_with_depth(&text_block("inverse"), None, Vec::new()))
            .with_data(Value::from("data"));
        let swapped = options.swapped();
        assert_eq!(swapped.data(), Some(&Value::from("data")));
        Ok(format!(
            "{}/{}",
            swapped.render_block(&Value::Null)?,
            swapped.render_inverse(&Value::Null)?
        ))
    })
    .unwrap();

    assert_eq!(rendered, "inverse/fn");
}
