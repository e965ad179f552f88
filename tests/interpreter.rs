use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use lox_interpreter as lox;

use lox::interpreter::Interpreter;
use lox::parser::Parser;
use lox::resolver::Resolver;
use lox::scanner::Scanner;
use lox::token::Token;

/// Cloneable in-memory sink for `print` output.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn scan(source: &str) -> Vec<Token> {
    Scanner::new(source.as_bytes().to_vec())
        .collect::<Result<Vec<_>, _>>()
        .expect("scan error in interpreter test input")
}

/// Full pipeline for the `run` command; returns the print output, or the
/// rendered diagnostics of whichever stage failed.
fn run_program(source: &str) -> Result<String, String> {
    let statements = Parser::new(scan(source))
        .parse()
        .map_err(|errors| render(&errors))?;

    let sink = SharedBuf::default();
    let mut interpreter = Interpreter::with_output(Box::new(sink.clone()));

    let resolve_errors = Resolver::new(&mut interpreter).resolve(&statements);

    if !resolve_errors.is_empty() {
        return Err(render(&resolve_errors));
    }

    interpreter
        .interpret(&statements)
        .map_err(|e| e.to_string())?;

    let bytes = sink.0.borrow().clone();

    Ok(String::from_utf8(bytes).expect("print output was not UTF-8"))
}

/// Pipeline for the `evaluate` command; returns the stringified value.
fn eval_expr(source: &str) -> Result<String, String> {
    let expr = Parser::new(scan(source))
        .parse_expression()
        .map_err(|errors| render(&errors))?;

    let mut interpreter = Interpreter::new();

    interpreter
        .evaluate_expression(&expr)
        .map(|value| value.to_string())
        .map_err(|e| e.to_string())
}

fn render(errors: &[lox::error::LoxError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn expect_output(source: &str, expected: &str) {
    match run_program(source) {
        Ok(output) => assert_eq!(output, expected),

        Err(e) => panic!("program failed:\n{}", e),
    }
}

fn expect_error(source: &str, expected: &str) {
    match run_program(source) {
        Ok(output) => panic!("program succeeded with output:\n{}", output),

        Err(e) => assert_eq!(e, expected),
    }
}

#[test]
fn arithmetic_precedence() {
    expect_output("print 2 + 3 * 4;", "14\n");
}

#[test]
fn string_concat_and_number_stringification() {
    expect_output("print \"a\" + \"b\";", "ab\n");
    expect_output("print 1.5 + 2.5;", "4\n");
    expect_output("print 3.5 * 2;", "7\n");
    expect_output("print 7 / 2;", "3.5\n");
}

#[test]
fn closure_counter() {
    expect_output(
        "fun makeCounter() { var n = 0;
           fun inc() { n = n + 1; return n; }
           return inc; }
         var c = makeCounter();
         print c(); print c(); print c();",
        "1\n2\n3\n",
    );
}

#[test]
fn closure_sees_binding_after_scope_exit() {
    expect_output(
        "var f;
         {
           var x = \"captured\";
           fun g() { print x; }
           f = g;
         }
         f();",
        "captured\n",
    );
}

#[test]
fn for_loop_counts() {
    expect_output("for (var i = 0; i < 3; i = i + 1) print i;", "0\n1\n2\n");
}

#[test]
fn while_loop_counts() {
    expect_output(
        "var i = 0; while (i < 3) { print i; i = i + 1; }",
        "0\n1\n2\n",
    );
}

#[test]
fn runtime_type_error_reports_line() {
    expect_error("print \"a\" - 1;", "Operands must be numbers.\n[line 1]");
    expect_error("print -\"a\";", "Operand must be a number.\n[line 1]");
    expect_error(
        "print 1;\nprint \"a\" + 1;",
        "Operands must be two numbers or two strings.\n[line 2]",
    );
}

#[test]
fn self_initializer_is_a_resolve_error() {
    expect_error(
        "{ var a = \"outer\"; { var a = a; } }",
        "[line 1] Error at 'a': Can't read local variable in its own initializer.",
    );
}

#[test]
fn duplicate_declaration_in_scope_is_a_resolve_error() {
    expect_error(
        "fun f(a) { var a = 1; }",
        "[line 1] Error at 'a': Already a variable with this name in this scope.",
    );
}

#[test]
fn return_at_top_level_is_a_resolve_error() {
    expect_error(
        "return 1;",
        "[line 1] Error at 'return': Can't return from top-level code.",
    );
}

#[test]
fn short_circuit_skips_side_effects() {
    expect_output(
        "fun boom() { print \"boom\"; return true; }
         print false and boom();
         print true or boom();",
        "false\ntrue\n",
    );
}

#[test]
fn logical_operators_return_operand_values() {
    expect_output("print nil or \"fallback\";", "fallback\n");
    expect_output("print 1 and 2;", "2\n");
    expect_output("print nil and 2;", "nil\n");
}

#[test]
fn truthiness_of_zero_and_empty_string() {
    expect_output("if (0) print \"yes\"; else print \"no\";", "yes\n");
    expect_output("if (\"\") print \"yes\"; else print \"no\";", "yes\n");
    expect_output("if (nil) print \"yes\"; else print \"no\";", "no\n");
}

#[test]
fn shadowing_restores_on_block_exit() {
    expect_output(
        "var a = \"global\";
         { var a = \"local\"; print a; }
         print a;",
        "local\nglobal\n",
    );
}

#[test]
fn undefined_variable_read_and_write() {
    expect_error("print notDefined;", "Undefined variable 'notDefined'.\n[line 1]");
    expect_error("notDefined = 1;", "Undefined variable 'notDefined'.\n[line 1]");
}

#[test]
fn arity_mismatch() {
    expect_error(
        "fun f(a) { return a; }\nf(1, 2);",
        "Expected 1 arguments but got 2.\n[line 2]",
    );
}

#[test]
fn only_callables_can_be_called() {
    expect_error(
        "\"text\"(1);",
        "Can only call functions and classes.\n[line 1]",
    );
}

#[test]
fn return_without_value_and_fallthrough_yield_nil() {
    expect_output("fun f() { return; } print f();", "nil\n");
    expect_output("fun g() { 1 + 1; } print g();", "nil\n");
}

#[test]
fn return_unwinds_nested_blocks() {
    expect_output(
        "fun f() { { { return \"deep\"; } } }\nprint f();",
        "deep\n",
    );
}

#[test]
fn recursion() {
    expect_output(
        "fun fib(n) { if (n < 2) return n; return fib(n - 2) + fib(n - 1); }
         print fib(10);",
        "55\n",
    );
}

#[test]
fn function_values_stringify() {
    expect_output("fun f() {} print f;", "<fn f>\n");
    expect_output("print clock;", "<native fn>\n");
}

#[test]
fn clock_returns_a_number() {
    expect_output("print clock() > 0;", "true\n");
}

#[test]
fn evaluate_stringification() {
    assert_eq!(eval_expr("3.0"), Ok("3".to_string()));
    assert_eq!(eval_expr("3.5"), Ok("3.5".to_string()));
    assert_eq!(eval_expr("\"quz\""), Ok("quz".to_string()));
    assert_eq!(eval_expr("nil"), Ok("nil".to_string()));
    assert_eq!(eval_expr("!nil"), Ok("true".to_string()));
    assert_eq!(eval_expr("(\"a\" + \"b\") + \"c\""), Ok("abc".to_string()));
}

#[test]
fn equality_semantics() {
    assert_eq!(eval_expr("1 == 1"), Ok("true".to_string()));
    assert_eq!(eval_expr("\"a\" == \"b\""), Ok("false".to_string()));
    assert_eq!(eval_expr("nil == nil"), Ok("true".to_string()));
    assert_eq!(eval_expr("1 == \"1\""), Ok("false".to_string()));
    assert_eq!(eval_expr("nil == false"), Ok("false".to_string()));

    // IEEE: NaN compares unequal to itself.
    assert_eq!(eval_expr("0 / 0 == 0 / 0"), Ok("false".to_string()));
    assert_eq!(eval_expr("0 / 0 != 0 / 0"), Ok("true".to_string()));
}

#[test]
fn division_by_zero_is_ieee() {
    assert_eq!(eval_expr("1 / 0 > 1000000"), Ok("true".to_string()));
}

#[test]
fn evaluate_runtime_error() {
    assert_eq!(
        eval_expr("-\"muffin\""),
        Err("Operand must be a number.\n[line 1]".to_string())
    );
}
