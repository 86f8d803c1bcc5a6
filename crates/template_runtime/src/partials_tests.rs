use super::*;
use crate::compiler::{CompileError, Compiler};
use std::error::Error as StdError;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Compiler producing `source:context` templates and counting invocations.
#[derive(Clone, Default)]
struct CountingCompiler {
    calls: Arc<AtomicUsize>,
}

impl Compiler for CountingCompiler {
    fn compile(
        &self,
        source: &str,
        environment: &Arc<Environment>,
    ) -> Result<Template, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let source = source.to_string();
        Ok(Template::from_fn(
            Arc::clone(environment),
            move |frame, context, _| Ok(format!("{}:{}", source, frame.escape_expression(context))),
        ))
    }
}

struct RejectingCompiler;

impl Compiler for RejectingCompiler {
    fn compile(&self, _: &str, _: &Arc<Environment>) -> Result<Template, CompileError> {
        Err("unexpected end of template".into())
    }
}

fn invoke(
    registry: &PartialRegistry,
    name: &str,
    context: &Value,
    environment: &Arc<Environment>,
) -> RenderResult {
    invoke_partial(
        registry.get(name),
        name,
        context,
        &RenderOptions::new(),
        registry,
        environment,
    )
}

#[test]
fn test_registry_register_and_lookup() {
    let registry = PartialRegistry::new();
    assert!(!registry.contains("header"));

    registry.register_partial("header", "<h1>{{title}}</h1>");
    registry.register_partial("footer", String::from("<footer/>"));

    assert!(registry.contains("header"));
    assert_eq!(registry.names(), vec!["footer", "header"]);
    match registry.get("header") {
        Some(Partial::Source(source)) => assert_eq!(source, "<h1>{{title}}</h1>"),
        other => panic!("Expected source partial, got {other:?}"),
    }
}

#[test]
fn test_registry_replaces_existing_entry() {
    let environment = Arc::new(Environment::new());
    let registry = PartialRegistry::new();
    registry.register_partial("item", "raw");
    registry.register_partial(
        "item",
        Template::from_fn(Arc::clone(&environment), |_, _, _| Ok("compiled".to_string())),
    );

    assert!(registry.get("item").unwrap().is_compiled());
    assert_eq!(registry.names().len(), 1);
}

#[test]
fn test_missing_partial_is_an_error() {
    let environment = Arc::new(Environment::new());
    let registry = PartialRegistry::new();

    let err = invoke(&registry, "sidebar", &Value::Null, &environment).unwrap_err();

    assert!(matches!(err, Error::MissingPartial { ref name } if name == "sidebar"));
    assert_eq!(err.to_string(), "The partial sidebar could not be found");
}

#[test]
fn test_compiled_partial_renders_context() {
    let environment = Arc::new(Environment::new());
    let registry = PartialRegistry::new();
    registry.register_partial(
        "name",
        Template::from_fn(Arc::clone(&environment), |frame, context, _| {
            Ok(frame.escape_expression(&context.lookup("name").cloned().unwrap_or_default()))
        }),
    );

    let rendered = invoke(
        &registry,
        "name",
        &Value::from(serde_json::json!({"name": "<Ada>"})),
        &environment,
    )
    .unwrap();

    assert_eq!(rendered, "&lt;Ada&gt;");
}

#[test]
fn test_source_partial_without_compiler_fails() {
    let environment = Arc::new(Environment::new());
    let registry = PartialRegistry::new();
    registry.register_partial("row", "{{cell}}");

    let err = invoke(&registry, "row", &Value::Null, &environment).unwrap_err();

    assert!(matches!(err, Error::PartialCompilationUnavailable { .. }));
    assert_eq!(
        err.to_string(),
        "The partial row could not be compiled when running in vm mode"
    );
    assert!(!registry.get("row").unwrap().is_compiled());
}

#[test]
fn test_source_partial_compiles_once_and_is_memoized() {
    let compiler = CountingCompiler::default();
    let calls = Arc::clone(&compiler.calls);
    let environment = Environment::builder().compiler(compiler).build();
    let registry = PartialRegistry::new();
    registry.register_partial("row", "row");

    let first = invoke(&registry, "row", &Value::from("a"), &environment).unwrap();
    assert!(registry.get("row").unwrap().is_compiled());
    let second = invoke(&registry, "row", &Value::from("b"), &environment).unwrap();

    assert_eq!(first, "row:a");
    assert_eq!(second, "row:b");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_compilation_failure_keeps_compiler_error() {
    let environment = Environment::builder().compiler(RejectingCompiler).build();
    let registry = PartialRegistry::new();
    registry.register_partial("broken", "{{#if}}");

    let err = invoke(&registry, "broken", &Value::Null, &environment).unwrap_err();

    match &err {
        Error::PartialCompilation { name, .. } => assert_eq!(name, "broken"),
        other => panic!("Expected PartialCompilation error, got {other:?}"),
    }
    let source = err.source().expect("compiler error is kept as source");
    assert_eq!(source.to_string(), "unexpected end of template");
    assert!(!registry.get("broken").unwrap().is_compiled());
}

#[test]
fn test_partial_debug_hides_compiled_template() {
    let environment = Arc::new(Environment::new());
    let compiled = Partial::from(Template::from_fn(environment, |_, _, _| Ok(String::new())));

    assert_eq!(format!("{compiled:?}"), "Compiled(..)");
    assert_eq!(format!("{:?}", Partial::from("x")), "Source(\"x\")");
}
