use pretty_assertions::assert_eq;
use scrawl::value::Value;
use scrawl::{parse_template, Evaluator, Scope};
use std::io;

fn render_with(source: &str, scope: &Scope) -> String {
    let program = parse_template(source).unwrap_or_else(|e| panic!("{}: {}", source, e));
    Evaluator::with_log_sink(Box::new(io::sink()))
        .render(&program, scope)
        .unwrap_or_else(|e| panic!("{}: {}", source, e))
}

fn render(source: &str) -> String {
    render_with(source, &Scope::new())
}

#[test]
fn substitutes_root_bindings() {
    let scope = Scope::new();
    scope.define("name", Value::string("world"));
    assert_eq!(render_with("hello {% name %}", &scope), "hello world");
}

#[test]
fn plain_text_passes_through() {
    assert_eq!(render("no code here\n  at all"), "no code here\n  at all");
}

#[test]
fn let_islands_print_nothing() {
    assert_eq!(render("{% let x = 2 %}x is {% x * 21 %}."), "x is 42.");
}

#[test]
fn conditionals() {
    let template = "{% if (admin) { %}welcome back{% } else { %}please sign in{% } %}";

    let scope = Scope::new();
    scope.define("admin", Value::Boolean(true));
    assert_eq!(render_with(template, &scope), "welcome back");

    let scope = Scope::new();
    scope.define("admin", Value::Boolean(false));
    assert_eq!(render_with(template, &scope), "please sign in");
}

#[test]
fn loops() {
    let scope = Scope::new();
    scope.define(
        "items",
        Value::array(vec![Value::string("a"), Value::string("b")]),
    );
    assert_eq!(
        render_with(
            "<ul>{% foreach (items as item) { %}<li>{% item %}</li>{% } %}</ul>",
            &scope
        ),
        "<ul><li>a</li><li>b</li></ul>"
    );
}

#[test]
fn lines_holding_only_code_leave_no_blank_line() {
    let template = "<ul>\n{% foreach (items as item) { %}\n  <li>{% item %}</li>\n{% } %}\n</ul>";
    let scope = Scope::new();
    scope.define("items", Value::array(vec![Value::Integer(1), Value::Integer(2)]));

    assert_eq!(
        render_with(template, &scope),
        "<ul>\n  <li>1</li>\n  <li>2</li>\n</ul>"
    );
}

#[test]
fn hash_properties() {
    let scope = Scope::new();
    scope.define(
        "user",
        Value::hash_from([
            ("name", Value::string("Ada")),
            ("roles", Value::array(vec![Value::string("admin")])),
        ]),
    );

    assert_eq!(
        render_with("{% user.name %} ({% user.roles[0] %}){% user.missing %}", &scope),
        "Ada (admin)"
    );
}

#[test]
fn functions_defined_in_templates() {
    let template = "{% fn greet(who) { \"hi \" + who } %}{% greet(\"bob\") %}!";
    assert_eq!(render(template), "hi bob!");
}

#[test]
fn return_stops_rendering() {
    assert_eq!(render("a{% return 1 %}b"), "a");
}

#[test]
fn print_builtin_writes_inline() {
    assert_eq!(render("[{% print(1, 2) %}]"), "[12]");
}

#[test]
fn decimals_and_values_render() {
    assert_eq!(
        render("{% 1.5 + 0.5 %} {% [1, \"a\"] %} {% {\"k\": true} %}"),
        "2.0 [1, a] {\"k\": true}"
    );
}

#[test]
fn same_program_renders_against_different_scopes() {
    let program = parse_template("hi {% name %}").unwrap();
    let mut evaluator = Evaluator::with_log_sink(Box::new(io::sink()));

    let first = Scope::new();
    first.define("name", Value::string("a"));
    let second = Scope::new();
    second.define("name", Value::string("b"));

    assert_eq!(evaluator.render(&program, &first).unwrap(), "hi a");
    assert_eq!(evaluator.render(&program, &second).unwrap(), "hi b");
}

#[test]
fn runtime_errors_abort_rendering() {
    let program = parse_template("before {% missing %} after").unwrap();
    let error = Evaluator::with_log_sink(Box::new(io::sink()))
        .render(&program, &Scope::new())
        .unwrap_err();
    assert_eq!(error.message, "Undefined variable 'missing'");
    assert_eq!((error.span.line, error.span.column), (1, 11));
}
