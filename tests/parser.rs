use lox_interpreter as lox;

use lox::ast_printer::AstPrinter;
use lox::error::LoxError;
use lox::expr::Expr;
use lox::parser::Parser;
use lox::scanner::Scanner;
use lox::stmt::Stmt;
use lox::token::Token;

fn scan(source: &str) -> Vec<Token> {
    Scanner::new(source.as_bytes().to_vec())
        .collect::<Result<Vec<_>, _>>()
        .expect("scan error in parser test input")
}

fn parse_expr(source: &str) -> String {
    let expr = Parser::new(scan(source))
        .parse_expression()
        .expect("parse error in parser test input");

    AstPrinter::print(&expr)
}

fn parse_expr_err(source: &str) -> Vec<String> {
    match Parser::new(scan(source)).parse_expression() {
        Ok(expr) => panic!("expected parse error, got {}", AstPrinter::print(&expr)),

        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    }
}

#[test]
fn grouping_and_unary() {
    assert_eq!(
        parse_expr("(1 + 2) * -3"),
        "(* (group (+ 1.0 2.0)) (- 3.0))"
    );
}

#[test]
fn literals() {
    assert_eq!(parse_expr("nil"), "nil");
    assert_eq!(parse_expr("true"), "true");
    assert_eq!(parse_expr("false"), "false");
    assert_eq!(parse_expr("3.0"), "3.0");
    assert_eq!(parse_expr("3.5"), "3.5");
    assert_eq!(parse_expr("\"hello\""), "hello");
}

#[test]
fn precedence_ladder() {
    assert_eq!(parse_expr("2 + 3 * 4"), "(+ 2.0 (* 3.0 4.0))");
    assert_eq!(parse_expr("1 < 2 == true"), "(== (< 1.0 2.0) true)");
    assert_eq!(parse_expr("!true == false"), "(== (! true) false)");
    assert_eq!(parse_expr("8 - 4 - 2"), "(- (- 8.0 4.0) 2.0)");
}

#[test]
fn logical_operators_nest_or_over_and() {
    assert_eq!(parse_expr("a or b and c"), "(or a (and b c))");
}

#[test]
fn assignment_is_right_associative() {
    assert_eq!(parse_expr("a = b = 1"), "(= a (= b 1.0))");
}

#[test]
fn calls_chain_left_to_right() {
    assert_eq!(parse_expr("f(1, 2)(3)"), "(call (call f 1.0 2.0) 3.0)");
    assert_eq!(parse_expr("noArgs()"), "(call noArgs)");
}

#[test]
fn invalid_assignment_target_is_reported() {
    let errors = parse_expr_err("1 = 2");

    assert_eq!(
        errors,
        vec!["[line 1] Error at '=': Invalid assignment target."]
    );
}

#[test]
fn unclosed_grouping_points_at_end() {
    let errors = parse_expr_err("(1 + 2");

    assert_eq!(
        errors,
        vec!["[line 1] Error at end: Expect ')' after expression."]
    );
}

#[test]
fn missing_operand_expects_expression() {
    let errors = parse_expr_err("1 +");

    assert_eq!(errors, vec!["[line 1] Error at end: Expect expression."]);
}

#[test]
fn program_mode_parses_declarations() {
    let statements = Parser::new(scan("var a = 1; print a; { a = 2; }"))
        .parse()
        .expect("program should parse");

    assert_eq!(statements.len(), 3);
    assert!(matches!(statements[0], Stmt::Var { .. }));
    assert!(matches!(statements[1], Stmt::Print(_)));
    assert!(matches!(statements[2], Stmt::Block(_)));
}

#[test]
fn program_mode_synchronizes_and_reports_every_error() {
    let errors = Parser::new(scan("var;\nprint 1;\n+;"))
        .parse()
        .expect_err("program has two syntax errors");

    let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();

    assert_eq!(
        rendered,
        vec![
            "[line 1] Error at ';': Expect variable name.",
            "[line 3] Error at '+': Expect expression.",
        ]
    );
}

#[test]
fn missing_semicolon_after_expression() {
    let errors = Parser::new(scan("1 + 2"))
        .parse()
        .expect_err("statement lacks a semicolon");

    assert!(matches!(errors[0], LoxError::Parse { .. }));
    assert_eq!(
        errors[0].to_string(),
        "[line 1] Error at end: Expect ';' after expression."
    );
}

#[test]
fn for_loop_desugars_to_init_plus_while() {
    let statements = Parser::new(scan("for (var i = 0; i < 3; i = i + 1) print i;"))
        .parse()
        .expect("for loop should parse");

    assert_eq!(statements.len(), 1);

    let Stmt::Block(outer) = &statements[0] else {
        panic!("for with initializer should become a block");
    };

    assert_eq!(outer.len(), 2);
    assert!(matches!(outer[0], Stmt::Var { .. }));

    let Stmt::While { body, .. } = &outer[1] else {
        panic!("second statement should be the while loop");
    };

    // Body block ends with the increment expression statement.
    let Stmt::Block(inner) = body.as_ref() else {
        panic!("loop body with increment should become a block");
    };

    assert_eq!(inner.len(), 2);
    assert!(matches!(inner[0], Stmt::Print(_)));
    assert!(matches!(inner[1], Stmt::Expression(Expr::Assign { .. })));
}

#[test]
fn for_loop_without_clauses_is_a_bare_while() {
    let statements = Parser::new(scan("for (;;) print 1;"))
        .parse()
        .expect("clauseless for should parse");

    assert_eq!(statements.len(), 1);

    let Stmt::While { condition, body } = &statements[0] else {
        panic!("clauseless for should become a bare while");
    };

    assert!(matches!(
        condition,
        Expr::Literal(lox::expr::LiteralValue::True)
    ));
    assert!(matches!(body.as_ref(), Stmt::Print(_)));
}

#[test]
fn function_declaration_collects_params_and_body() {
    let statements = Parser::new(scan("fun add(a, b) { return a + b; }"))
        .parse()
        .expect("function should parse");

    let Stmt::Function(decl) = &statements[0] else {
        panic!("expected a function declaration");
    };

    assert_eq!(decl.name.lexeme, "add");

    let params: Vec<&str> = decl.params.iter().map(|p| p.lexeme.as_str()).collect();
    assert_eq!(params, vec!["a", "b"]);

    assert_eq!(decl.body.len(), 1);
    assert!(matches!(decl.body[0], Stmt::Return { .. }));
}
