// Parser robustness tests
//
// Table-driven cases for malformed and valid input in both script and
// template mode. Every case must either parse or fail with diagnostics,
// never panic.

use scrawl::ast::Program;
use scrawl::error::ParseErrors;
use scrawl::lexer::{Lexer, Mode};
use scrawl::parser::Parser;

/// Test result for a single test case
#[derive(Debug)]
pub enum TestResult {
    Pass,
    Fail(String),
    Crash(String),
}

/// Individual test case
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub mode: Mode,
    pub should_succeed: bool,
    pub expected_error_contains: Option<String>,
}

/// Test suite containing multiple test cases
#[derive(Debug)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tests: Vec::new(),
        }
    }

    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    /// Runs every case, returning a line per case that failed or panicked.
    pub fn run(&self) -> Vec<String> {
        self.tests
            .iter()
            .filter_map(|test| match run_single_test(test) {
                TestResult::Pass => None,
                TestResult::Fail(msg) => Some(format!("{}/{}: {}", self.name, test.name, msg)),
                TestResult::Crash(msg) => {
                    Some(format!("{}/{}: panicked: {}", self.name, test.name, msg))
                }
            })
            .collect()
    }
}

/// Run a single test case
fn run_single_test(test: &TestCase) -> TestResult {
    // Catch any panics to detect crashes
    let result = std::panic::catch_unwind(|| parse_input(&test.input, test.mode));

    match result {
        Ok(parse_result) => {
            match (parse_result, test.should_succeed) {
                (Ok(_), true) => TestResult::Pass,
                (Ok(_), false) => TestResult::Fail("Expected parsing to fail, but it succeeded".to_string()),
                (Err(errors), false) => {
                    // Any diagnostic may carry the expected text
                    if let Some(expected) = &test.expected_error_contains {
                        if errors.iter().any(|error| error.message.contains(expected)) {
                            TestResult::Pass
                        } else {
                            TestResult::Fail(format!(
                                "Errors '{}' don't contain expected text '{}'",
                                errors, expected
                            ))
                        }
                    } else {
                        TestResult::Pass // Any error is acceptable
                    }
                }
                (Err(errors), true) => TestResult::Fail(format!("Expected parsing to succeed, but got: {}", errors)),
            }
        }
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic".to_string()
            };
            TestResult::Crash(panic_msg)
        }
    }
}

/// Parse input and return result
fn parse_input(input: &str, mode: Mode) -> Result<Program, ParseErrors> {
    Parser::new(Lexer::new(input.to_string(), mode)).parse()
}

/// Test case builder for convenience
impl TestCase {
    pub fn should_succeed(name: &str, input: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            mode: Mode::Script,
            should_succeed: true,
            expected_error_contains: None,
        }
    }

    pub fn should_fail(name: &str, input: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            mode: Mode::Script,
            should_succeed: false,
            expected_error_contains: None,
        }
    }

    pub fn should_fail_with_message(name: &str, input: &str, expected_msg: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            mode: Mode::Script,
            should_succeed: false,
            expected_error_contains: Some(expected_msg.to_string()),
        }
    }

    /// Same case, lexed as a template.
    pub fn in_template(mut self) -> Self {
        self.mode = Mode::Template;
        self
    }
}

// ============================================================================
// Test Suite Creation Functions
// ============================================================================

fn create_malformed_expressions_tests() -> TestSuite {
    let mut suite = TestSuite::new("Malformed Expressions");

    // === PARENTHESES TESTS ===

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_paren",
        "(1 + 2",
        "Expected ')' after expression"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_paren_nested",
        "((1 + 2)",
        "Expected ')' after expression"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_paren_complex",
        "(1 + (2 * 3)",
        "Expected ')' after expression"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_closing_paren",
        "1 + 2)",
        "found ')'"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "empty_parentheses",
        "()",
        "Expected expression, found ')'"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "empty_parentheses_in_expression",
        "1 + ()",
        "Expected expression after '+'"
    ));

    // === BRACKET TESTS ===

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_bracket",
        "[1, 2",
        "Expected ']' after array elements"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unclosed_index",
        "items[0",
        "Expected ']' after index"
    ));

    // === BRACE TESTS ===

    suite.add_test(TestCase::should_fail_with_message(
        "brace_opens_hash_literal",
        "{ x = 1",
        "Hash keys must be string literals"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_closing_brace",
        "x = 1 }",
        "Expected expression, found '}'"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unclosed_if_block",
        "if (true) { x = 1",
        "Expected '}' after block"
    ));

    suite
}

fn create_edge_case_tests() -> TestSuite {
    let mut suite = TestSuite::new("Edge Cases");

    suite.add_test(TestCase::should_succeed("empty_input", ""));
    suite.add_test(TestCase::should_succeed("only_whitespace", "   \n\t  "));
    suite.add_test(TestCase::should_fail("only_semicolons", ";;;"));

    // EOF conditions
    suite.add_test(TestCase::should_fail("unexpected_eof_after_operator", "1 +"));
    suite.add_test(TestCase::should_fail("unexpected_eof_in_expression", "1 + ("));
    suite.add_test(TestCase::should_fail_with_message(
        "unexpected_eof_after_let",
        "let x =",
        "Unexpected end of input"
    ));

    // Very deeply nested expressions
    let deep_parens = "(".repeat(100) + "1" + &")".repeat(100);
    suite.add_test(TestCase::should_succeed("deeply_nested_parens", &deep_parens));

    // Errors in several statements are all reported
    suite.add_test(TestCase::should_fail_with_message(
        "recovers_after_first_error",
        "let = 1; let y = 2; let = 3;",
        "Expected variable name after 'let'"
    ));

    suite
}

fn create_operator_tests() -> TestSuite {
    let mut suite = TestSuite::new("Operator Tests");

    // Missing operands
    suite.add_test(TestCase::should_fail("missing_left_operand", "* 1"));
    suite.add_test(TestCase::should_fail("missing_right_operand", "1 +"));
    suite.add_test(TestCase::should_fail("missing_both_operands", "+"));

    // Invalid operator combinations
    suite.add_test(TestCase::should_fail("double_plus", "1 ++ 2"));
    // Unary minus makes these valid
    suite.add_test(TestCase::should_succeed("double_minus", "1 -- 2")); // Parsed as 1 - (-2)
    suite.add_test(TestCase::should_succeed("mixed_operators", "1 +- 2")); // Parsed as 1 + (-2)
    suite.add_test(TestCase::should_succeed("not_not", "!!true"));

    // Comparison operators
    suite.add_test(TestCase::should_succeed("comparison_equal", "1 == 2"));
    suite.add_test(TestCase::should_succeed("comparison_not_equal", "1 != 2"));
    suite.add_test(TestCase::should_succeed("comparison_less", "1 < 2"));
    suite.add_test(TestCase::should_succeed("comparison_greater", "1 > 2"));
    suite.add_test(TestCase::should_succeed("comparison_less_equal", "1 <= 2"));
    suite.add_test(TestCase::should_succeed("comparison_greater_equal", "1 >= 2"));

    // Script mode has no modulo operator
    suite.add_test(TestCase::should_fail_with_message(
        "percent_is_not_an_operator",
        "1 % 2",
        "unexpected character '%'"
    ));

    suite
}

fn create_control_flow_tests() -> TestSuite {
    let mut suite = TestSuite::new("Control Flow Tests");

    // If expressions
    suite.add_test(TestCase::should_succeed("valid_if", "if (true) { x = 1 }"));
    suite.add_test(TestCase::should_succeed("valid_if_else", "if (x) { 1 } else { 2 }"));
    suite.add_test(TestCase::should_succeed("if_as_value", "let y = if (x) { 1 } else { 2 };"));
    suite.add_test(TestCase::should_fail("if_missing_condition", "if { x = 1 }"));
    suite.add_test(TestCase::should_fail("if_missing_body", "if (true)"));

    // Foreach
    suite.add_test(TestCase::should_succeed("valid_foreach", "foreach (items as item) { item }"));
    suite.add_test(TestCase::should_succeed("foreach_then_statement", "foreach (items as item) { item } 1"));
    suite.add_test(TestCase::should_fail_with_message(
        "foreach_missing_as",
        "foreach (items item) { item }",
        "Expected 'as' after foreach iterable"
    ));
    suite.add_test(TestCase::should_fail("foreach_missing_parens", "foreach items as item { item }"));
    suite.add_test(TestCase::should_fail("foreach_as_expression", "let x = foreach (a as b) { b };"));

    // Return
    suite.add_test(TestCase::should_succeed("return_value", "return 1;"));
    suite.add_test(TestCase::should_fail("return_without_value", "return;"));

    suite
}

fn create_literal_tests() -> TestSuite {
    let mut suite = TestSuite::new("Literal Tests");

    // Valid literals
    suite.add_test(TestCase::should_succeed("integer_literal", "42"));
    suite.add_test(TestCase::should_succeed("decimal_literal", "3.14"));
    suite.add_test(TestCase::should_succeed("string_literal", "\"hello\""));
    suite.add_test(TestCase::should_succeed("string_with_escapes", r#""a \"quoted\" \\ word""#));
    suite.add_test(TestCase::should_succeed("boolean_true", "true"));
    suite.add_test(TestCase::should_succeed("boolean_false", "false"));
    suite.add_test(TestCase::should_succeed("array_literal", "[1, \"two\", [3]]"));
    suite.add_test(TestCase::should_succeed("empty_array", "[]"));
    suite.add_test(TestCase::should_succeed("hash_literal", "{\"a\": 1, \"b\": [1, 2]}"));
    suite.add_test(TestCase::should_succeed("empty_hash", "{}"));

    // Invalid number formats
    suite.add_test(TestCase::should_fail_with_message(
        "multiple_dots",
        "3.14.159",
        "Invalid decimal literal"
    ));
    suite.add_test(TestCase::should_fail("leading_dot", ".42"));
    suite.add_test(TestCase::should_fail_with_message(
        "integer_out_of_range",
        "99999999999999999999",
        "Invalid integer literal"
    ));

    // Unterminated strings
    suite.add_test(TestCase::should_fail_with_message(
        "unterminated_string",
        "\"hello",
        "unterminated string"
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "unterminated_string_with_newline",
        "\"hello\nworld",
        "unexpected newline in string"
    ));

    // Hash keys
    suite.add_test(TestCase::should_fail_with_message(
        "identifier_hash_key",
        "{a: 1}",
        "Hash keys must be string literals"
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "hash_missing_colon",
        "{\"a\" 1}",
        "Expected ':' after hash key"
    ));

    suite
}

fn create_function_tests() -> TestSuite {
    let mut suite = TestSuite::new("Function Tests");

    // Calls
    suite.add_test(TestCase::should_succeed("simple_function_call", "foo()"));
    suite.add_test(TestCase::should_succeed("function_call_with_args", "foo(1, 2, 3)"));
    suite.add_test(TestCase::should_succeed("chained_calls", "make(1)(2)"));
    suite.add_test(TestCase::should_fail("missing_closing_paren", "foo(1, 2"));
    suite.add_test(TestCase::should_fail("missing_opening_paren", "foo 1, 2)"));
    suite.add_test(TestCase::should_fail("trailing_comma", "foo(1, 2,)"));

    // Literals
    suite.add_test(TestCase::should_succeed("named_function", "fn add(a, b) { a + b }"));
    suite.add_test(TestCase::should_succeed("anonymous_function", "let f = fn(x) { x * 2 };"));
    suite.add_test(TestCase::should_succeed("no_parameters", "fn hello() { \"hi\" } hello()"));
    suite.add_test(TestCase::should_succeed("closure_returning_closure", "fn(n) { fn(x) { x + n } }"));
    suite.add_test(TestCase::should_fail_with_message(
        "bad_function_name",
        "fn 1() { }",
        "Expected function name or '(' after 'fn'"
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "duplicate_parameter",
        "fn(a, a) { a }",
        "Duplicate parameter 'a'"
    ));
    suite.add_test(TestCase::should_fail("missing_body", "fn f(a)"));

    suite
}

fn create_assignment_tests() -> TestSuite {
    let mut suite = TestSuite::new("Assignment Tests");

    // Valid assignments
    suite.add_test(TestCase::should_succeed("simple_assignment", "x = 1"));
    suite.add_test(TestCase::should_succeed("assignment_with_expression", "x = 1 + 2"));
    suite.add_test(TestCase::should_succeed("index_assignment", "x[0] = 1"));
    suite.add_test(TestCase::should_succeed("property_assignment", "x.y.z = 1"));
    suite.add_test(TestCase::should_succeed("mixed_path_assignment", "x.y[0].z = 2"));
    suite.add_test(TestCase::should_succeed("let_statement", "let x = 1;"));

    // Invalid assignments
    suite.add_test(TestCase::should_fail("missing_value", "x ="));
    suite.add_test(TestCase::should_fail_with_message(
        "invalid_target",
        "1 = x",
        "Invalid assignment target"
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "call_is_not_a_target",
        "f() = 1",
        "Invalid assignment target"
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "let_without_equals",
        "let x 1;",
        "Expected '=' after variable name"
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "missing_separator",
        "let x = 1 let y = 2",
        "Expected ';' or '%}'"
    ));

    suite
}

fn create_mixed_construct_tests() -> TestSuite {
    let mut suite = TestSuite::new("Mixed Construct Tests");

    suite.add_test(TestCase::should_succeed(
        "complex_expression",
        "x = (1 + 2) * 3 + foo(4, 5)"
    ));
    suite.add_test(TestCase::should_succeed(
        "property_call_and_index",
        "page.items[0].title"
    ));
    suite.add_test(TestCase::should_succeed(
        "recursive_function",
        "fn fact(n) { if (n < 2) { return 1 }; n * fact(n - 1) } fact(5)"
    ));

    suite.add_test(TestCase::should_fail(
        "mixed_paren_bracket_error",
        "x = [1 + (2 * 3]"
    ));
    suite.add_test(TestCase::should_fail(
        "error_inside_block_is_reported",
        "if (true) { let = 1; } let y = 2;"
    ));

    suite
}

fn create_template_tests() -> TestSuite {
    let mut suite = TestSuite::new("Template Tests");

    suite.add_test(TestCase::should_succeed("plain_text", "just text, no code").in_template());
    suite.add_test(TestCase::should_succeed("expression_island", "hello {% name %}").in_template());
    suite.add_test(TestCase::should_succeed("let_island", "{% let x = 1 %}{% x %}").in_template());
    suite.add_test(TestCase::should_succeed(
        "if_else_across_islands",
        "{% if (x) { %}yes{% } else { %}no{% } %}"
    ).in_template());
    suite.add_test(TestCase::should_succeed(
        "foreach_across_islands",
        "<ul>{% foreach (items as item) { %}<li>{% item %}</li>{% } %}</ul>"
    ).in_template());
    suite.add_test(TestCase::should_succeed("unclosed_island", "{% x").in_template());
    suite.add_test(TestCase::should_succeed("lone_percent_in_text", "100% done").in_template());

    suite.add_test(TestCase::should_fail_with_message(
        "unexpected_character_in_island",
        "hello {% # %}",
        "unexpected character '#'"
    ).in_template());
    suite.add_test(TestCase::should_fail_with_message(
        "unclosed_block",
        "{% if (x) { %}yes",
        "Expected '}' after block"
    ).in_template());
    suite.add_test(TestCase::should_fail("dangling_operator", "{% 1 + %}").in_template());

    // Delimiters mean nothing in script mode
    suite.add_test(TestCase::should_fail("island_in_script_mode", "{% x %}"));

    suite
}

// ============================================================================
// Main Test Function
// ============================================================================

#[test]
fn comprehensive_parser_tests() {
    let suites = vec![
        create_malformed_expressions_tests(),
        create_edge_case_tests(),
        create_operator_tests(),
        create_control_flow_tests(),
        create_literal_tests(),
        create_function_tests(),
        create_assignment_tests(),
        create_mixed_construct_tests(),
        create_template_tests(),
    ];

    let failures: Vec<String> = suites.iter().flat_map(TestSuite::run).collect();
    assert!(failures.is_empty(), "parser cases failed:\n{}", failures.join("\n"));
}

#[test]
fn parse_errors_render_with_caret() {
    let source = "let x = 1;\nlet = 2;";
    let errors = parse_input(source, Mode::Script).unwrap_err();

    assert_eq!(errors.len(), 1);
    let rendered = errors.render(source);
    assert!(rendered.starts_with("Expected variable name after 'let', found '='"));
    assert!(rendered.ends_with("let = 2;\n----^"));
}
