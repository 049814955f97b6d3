use serde_json::json;
use shorthand::{Bindings, Engine, MemorySource};

fn engine(templates: &[(&str, &str)]) -> Engine {
    let mut source = MemorySource::new();
    for (name, text) in templates {
        source.insert(*name, *text);
    }
    let mut engine = Engine::new();
    engine.set_source(source);
    engine
}

#[test]
fn test_include_with_literal_and_expression_values() {
    let mut engine = engine(&[
        ("page", "<main>{{ include card with { title: 'Hello, world', owner: user.name, n: count + 1 } }}</main>"),
        ("card", "<h2>{{ title }}</h2><p>{{ owner }} #{{ n }}</p>"),
    ]);
    engine.set("user", json!({"name": "Ann"}));
    engine.set("count", 1);

    assert_eq!(
        engine.render("page"),
        "<main><h2>Hello, world</h2><p>Ann #2</p></main>"
    );
}

#[test]
fn test_include_without_variables_sees_caller_bindings() {
    let mut engine = engine(&[
        ("page", "{{ include header }}body"),
        ("header", "<title>{{ title }}</title>"),
    ]);
    engine.set("title", "Home");

    assert_eq!(engine.render("page"), "<title>Home</title>body");
}

#[test]
fn test_include_inside_loop_sees_loop_variable() {
    let mut engine = engine(&[
        ("list", "{{ for u in users }}{{ include row with { name: u.name } }}{{ end }}"),
        ("row", "<li>{{ name }}</li>"),
    ]);
    engine.set("users", json!([{"name": "a"}, {"name": "b"}]));

    assert_eq!(engine.render("list"), "<li>a</li><li>b</li>");
}

#[test]
fn test_include_does_not_leak_bindings() {
    let mut engine = engine(&[("partial", "{{ x }}")]);
    engine.set("x", "outer");

    let mut extra = Bindings::new();
    extra.set("x", 1);
    extra.set("y", 2);
    assert_eq!(engine.include("partial", extra), "1");

    assert_eq!(engine.get_value("x"), Some(&json!("outer")));
    assert!(engine.get("y").is_none());
}

#[test]
fn test_include_does_not_leak_into_caller_template() {
    let mut engine = engine(&[
        ("page", "{{ include part with { x: 1 } }}/{{ x }}"),
        ("part", "{{ x }}"),
    ]);

    assert_eq!(engine.render("page"), "1/");
    assert!(engine.get("x").is_none());
}

#[test]
fn test_nested_includes() {
    let mut engine = engine(&[
        ("layout", "[{{ include body with { depth: 1 } }}]"),
        ("body", "body{{ depth }}({{ include footer with { depth: depth + 1 } }})"),
        ("footer", "footer{{ depth }}"),
    ]);

    assert_eq!(engine.render("layout"), "[body1(footer2)]");
}

#[test]
fn test_quoted_template_name() {
    let mut engine = engine(&[
        ("page", "{{ include \"partials.nav\" with { active: 'home' } }}"),
        ("partials.nav", "nav:{{ active }}"),
    ]);

    assert_eq!(engine.render("page"), "nav:home");
}

#[test]
fn test_invalid_template_reference_is_rejected() {
    let mut engine = engine(&[("page", "{{ include ../secret }}")]);
    let err = engine.try_render("page").unwrap_err();
    assert!(err.is_translation_error());

    let output = engine.render("page");
    assert!(output.starts_with("An error occurred:"));
}

#[test]
fn test_invalid_variable_name_is_rejected() {
    let mut engine = engine(&[
        ("page", "{{ include part with { 1bad: 'x' } }}"),
        ("part", "{{ x }}"),
    ]);
    let err = engine.try_render("page").unwrap_err();
    assert_eq!(err.error_code(), "E_INVALID_VARIABLE_NAME");
}

#[test]
fn test_missing_partial_renders_inline() {
    let mut engine = engine(&[
        ("page", "<header/>{{ include sidebar }}<footer/>"),
        ("error", "<em>{{ errorMessage }}</em>"),
    ]);

    assert_eq!(
        engine.render("page"),
        "<header/><em>Template not found: &#039;sidebar&#039; at path: &#039;sidebar&#039;</em><footer/>"
    );
}

#[test]
fn test_self_include_hits_depth_limit() {
    let mut engine = engine(&[("tree", "node {{ include tree }}")]);
    engine.set_max_include_depth(10);

    let output = engine.render("tree");
    assert!(output.starts_with("An error occurred: Render failed: include depth limit of 10"));

    // the engine is usable afterwards
    engine.set_source(MemorySource::new().with_template("ok", "fine"));
    assert_eq!(engine.render("ok"), "fine");
}
