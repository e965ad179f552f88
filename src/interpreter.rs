use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::environment::Environment;
use crate::error::{LoxError, Result};
use crate::expr::{Expr, LiteralValue};
use crate::stmt::Stmt;
use crate::token::{Token, TokenType};
use crate::value::{LoxFunction, NativeFunction, Value};

/// Non-local control flow raised during evaluation.
///
/// `Return` is not an error: it is caught at the nearest function-invocation
/// site. `Error` unwinds the whole run and surfaces as `LoxError::Runtime`.
pub enum Interrupt {
    Return(Value),
    Error { message: String, line: usize },
}

type Exec<T> = std::result::Result<T, Interrupt>;

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    /// Resolver side-table: node id of a `Variable`/`Assign` occurrence to
    /// its binding depth. Absent ids are globals.
    locals: HashMap<usize, usize>,
    out: Box<dyn Write>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Build an interpreter whose `print` output goes to `out`.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));

        globals.borrow_mut().define(
            "clock",
            Value::NativeFunction(NativeFunction {
                name: "clock",
                arity: 0,
                func: clock_native,
            }),
        );

        let environment = globals.clone();

        Interpreter {
            globals,
            environment,
            locals: HashMap::new(),
            out,
        }
    }

    /// Called by the resolver for each local variable occurrence.
    pub fn note_local(&mut self, id: usize, depth: usize) {
        self.locals.insert(id, depth);
    }

    /// Execute a resolved program.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        for stmt in statements {
            match self.execute(stmt) {
                Ok(()) => {}

                Err(Interrupt::Error { message, line }) => {
                    return Err(LoxError::runtime(line, message));
                }

                // The resolver rejects top-level returns; a stray signal
                // simply ends the run.
                Err(Interrupt::Return(_)) => {
                    debug!("Return signal reached the top level");
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// Evaluate a single expression (the `evaluate` pipeline).
    pub fn evaluate_expression(&mut self, expr: &Expr) -> Result<Value> {
        match self.evaluate(expr) {
            Ok(value) => Ok(value),

            Err(Interrupt::Error { message, line }) => Err(LoxError::runtime(line, message)),

            Err(Interrupt::Return(value)) => Ok(value),
        }
    }

    fn execute(&mut self, stmt: &Stmt) -> Exec<()> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;

                Ok(())
            }

            Stmt::Print(expr) => {
                let value: Value = self.evaluate(expr)?;

                if let Err(e) = writeln!(self.out, "{}", value) {
                    debug!("print sink write failed: {}", e);
                }

                Ok(())
            }

            Stmt::Var { name, initializer } => {
                let value: Value = if let Some(expr) = initializer {
                    self.evaluate(expr)?
                } else {
                    Value::Nil
                };

                self.environment.borrow_mut().define(&name.lexeme, value);

                Ok(())
            }

            Stmt::Block(statements) => {
                let enclosing = self.environment.clone();

                self.execute_block(
                    statements,
                    Rc::new(RefCell::new(Environment::with_enclosing(enclosing))),
                )
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if is_truthy(&self.evaluate(condition)?) {
                    self.execute(then_branch)?;
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)?;
                }

                Ok(())
            }

            Stmt::While { condition, body } => {
                while is_truthy(&self.evaluate(condition)?) {
                    self.execute(body)?;
                }

                Ok(())
            }

            Stmt::Function(declaration) => {
                debug!("Defining function '{}'", declaration.name.lexeme);

                let function = Value::Function(Rc::new(LoxFunction {
                    declaration: declaration.clone(),
                    closure: self.environment.clone(),
                }));

                self.environment
                    .borrow_mut()
                    .define(&declaration.name.lexeme, function);

                Ok(())
            }

            Stmt::Return { value, .. } => {
                let value: Value = if let Some(expr) = value {
                    self.evaluate(expr)?
                } else {
                    Value::Nil
                };

                Err(Interrupt::Return(value))
            }
        }
    }

    /// Run `statements` inside `environment`, restoring the previous frame
    /// on both normal and unwinding exits.
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> Exec<()> {
        let previous: Rc<RefCell<Environment>> = self.environment.clone();

        self.environment = environment;

        for stmt in statements {
            if let Err(e) = self.execute(stmt) {
                self.environment = previous;
                return Err(e);
            }
        }

        self.environment = previous;

        Ok(())
    }

    fn evaluate(&mut self, expr: &Expr) -> Exec<Value> {
        match expr {
            Expr::Literal(lit) => Ok(literal_value(lit)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => self.evaluate_logical(left, operator, right),

            Expr::Variable { id, name } => self.look_up_variable(*id, name),

            Expr::Assign { id, name, value } => {
                let value: Value = self.evaluate(value)?;

                let assigned: bool = if let Some(&distance) = self.locals.get(id) {
                    self.environment
                        .borrow_mut()
                        .assign_at(distance, &name.lexeme, value.clone())
                } else {
                    self.globals
                        .borrow_mut()
                        .assign(&name.lexeme, value.clone())
                };

                if !assigned {
                    return Err(undefined_variable(name));
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => self.evaluate_call(callee, paren, arguments),
        }
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> Exec<Value> {
        let value: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => match value {
                Value::Number(n) => Ok(Value::Number(-n)),

                _ => Err(runtime(operator.line, "Operand must be a number.")),
            },

            TokenType::BANG => Ok(Value::Bool(!is_truthy(&value))),

            _ => Err(runtime(operator.line, "Invalid unary operator.")),
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Exec<Value> {
        let left_val: Value = self.evaluate(left)?;
        let right_val: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::PLUS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),

                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),

                _ => Err(runtime(
                    operator.line,
                    "Operands must be two numbers or two strings.",
                )),
            },

            TokenType::MINUS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),

                _ => Err(runtime(operator.line, "Operands must be numbers.")),
            },

            TokenType::STAR => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),

                _ => Err(runtime(operator.line, "Operands must be numbers.")),
            },

            TokenType::SLASH => match (left_val, right_val) {
                // IEEE division: x / 0 is an infinity or NaN, not an error.
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),

                _ => Err(runtime(operator.line, "Operands must be numbers.")),
            },

            TokenType::LESS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a < b)),

                _ => Err(runtime(operator.line, "Operands must be numbers.")),
            },

            TokenType::LESS_EQUAL => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a <= b)),

                _ => Err(runtime(operator.line, "Operands must be numbers.")),
            },

            TokenType::GREATER => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a > b)),

                _ => Err(runtime(operator.line, "Operands must be numbers.")),
            },

            TokenType::GREATER_EQUAL => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a >= b)),

                _ => Err(runtime(operator.line, "Operands must be numbers.")),
            },

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left_val == right_val)),

            TokenType::BANG_EQUAL => Ok(Value::Bool(left_val != right_val)),

            _ => Err(runtime(operator.line, "Invalid binary operator.")),
        }
    }

    fn evaluate_logical(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Exec<Value> {
        let left_val: Value = self.evaluate(left)?;

        match operator.token_type {
            TokenType::OR => {
                if is_truthy(&left_val) {
                    return Ok(left_val);
                }
            }

            _ => {
                if !is_truthy(&left_val) {
                    return Ok(left_val);
                }
            }
        }

        self.evaluate(right)
    }

    fn evaluate_call(&mut self, callee: &Expr, paren: &Token, arguments: &[Expr]) -> Exec<Value> {
        let callee_val: Value = self.evaluate(callee)?;

        let mut arg_values: Vec<Value> = Vec::with_capacity(arguments.len());

        for arg in arguments {
            arg_values.push(self.evaluate(arg)?);
        }

        match callee_val {
            Value::NativeFunction(native) => {
                check_arity(native.arity, arg_values.len(), paren)?;

                (native.func)(&arg_values).map_err(|message| Interrupt::Error {
                    message,
                    line: paren.line,
                })
            }

            Value::Function(function) => {
                check_arity(function.arity(), arg_values.len(), paren)?;

                debug!("Calling '{}'", function.declaration.name.lexeme);

                self.call_function(&function, arg_values)
            }

            _ => Err(runtime(
                paren.line,
                "Can only call functions and classes.",
            )),
        }
    }

    /// Invoke a user function: fresh frame under the captured closure, bind
    /// parameters positionally, run the body, catch the return signal.
    fn call_function(&mut self, function: &LoxFunction, arguments: Vec<Value>) -> Exec<Value> {
        let mut frame = Environment::with_enclosing(function.closure.clone());

        for (param, arg) in function.declaration.params.iter().zip(arguments) {
            frame.define(&param.lexeme, arg);
        }

        match self.execute_block(&function.declaration.body, Rc::new(RefCell::new(frame))) {
            Ok(()) => Ok(Value::Nil),

            Err(Interrupt::Return(value)) => Ok(value),

            Err(e) => Err(e),
        }
    }

    fn look_up_variable(&self, id: usize, name: &Token) -> Exec<Value> {
        let found: Option<Value> = if let Some(&distance) = self.locals.get(&id) {
            self.environment.borrow().get_at(distance, &name.lexeme)
        } else {
            self.globals.borrow().get(&name.lexeme)
        };

        found.ok_or_else(|| undefined_variable(name))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn literal_value(lit: &LiteralValue) -> Value {
    match lit {
        LiteralValue::Number(n) => Value::Number(*n),

        LiteralValue::Str(s) => Value::String(s.clone()),

        LiteralValue::True => Value::Bool(true),

        LiteralValue::False => Value::Bool(false),

        LiteralValue::Nil => Value::Nil,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,

        Value::Bool(b) => *b,

        _ => true,
    }
}

fn check_arity(expected: usize, got: usize, paren: &Token) -> Exec<()> {
    if expected != got {
        return Err(runtime(
            paren.line,
            format!("Expected {} arguments but got {}.", expected, got),
        ));
    }

    Ok(())
}

fn runtime<S: Into<String>>(line: usize, msg: S) -> Interrupt {
    Interrupt::Error {
        message: msg.into(),
        line,
    }
}

fn undefined_variable(name: &Token) -> Interrupt {
    Interrupt::Error {
        message: format!("Undefined variable '{}'.", name.lexeme),
        line: name.line,
    }
}

fn clock_native(_args: &[Value]) -> std::result::Result<Value, String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("Clock error: {}", e))?
        .as_secs_f64();

    Ok(Value::Number(timestamp))
}
