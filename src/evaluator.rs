use crate::ast::{AssignTarget, Block, Expr, FunctionLiteral, InfixOp, PathSegment, PrefixOp, Program, Stmt};
use crate::builtins;
use crate::error::{ScrawlError, Span};
use crate::scope::Scope;
use crate::value::{BuiltinFunction, FunctionValue, HashValue, Value};
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::Arc;

/// What a native function can reach while it runs.
pub struct CallContext<'a> {
    pub output: &'a mut String,
    pub log: &'a mut dyn Write,
}

impl CallContext<'_> {
    pub fn write_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub fn log_line(&mut self, text: &str) -> Result<(), String> {
        writeln!(self.log, "{}", text).map_err(|e| format!("failed to write log: {}", e))
    }
}

/// Why evaluation stopped early. A `return` unwinds through every
/// expression and block until a function call (or the top level) catches it.
#[derive(Debug)]
enum Unwind {
    Return(Value),
    Error(ScrawlError),
}

impl From<ScrawlError> for Unwind {
    fn from(error: ScrawlError) -> Self {
        Unwind::Error(error)
    }
}

type Eval<T> = Result<T, Unwind>;

pub struct Evaluator {
    functions: HashMap<String, Value>,
    output: String,
    log: Box<dyn Write>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_log_sink(Box::new(io::stdout()))
    }

    pub fn with_log_sink(log: Box<dyn Write>) -> Self {
        let mut evaluator = Self {
            functions: HashMap::new(),
            output: String::new(),
            log,
        };
        builtins::register_defaults(&mut evaluator);
        evaluator
    }

    /// Installs a native function, replacing any existing one with that name.
    pub fn register_function<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, String> + 'static,
    {
        tracing::debug!(name, "registering builtin");
        let builtin = BuiltinFunction::new(name, func);
        self.functions
            .insert(name.to_string(), Value::Builtin(Rc::new(builtin)));
    }

    /// Output produced by the most recent evaluation.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Runs `program` against `scope`. Yields the value of the last top-level
    /// statement, or `Value::Return` if a top-level `return` ended the run.
    pub fn evaluate(&mut self, program: &Program, scope: &Scope) -> Result<Value, ScrawlError> {
        self.output.clear();
        tracing::debug!(statements = program.statements.len(), "evaluating program");

        match self.eval_statements(&program.statements, scope, true) {
            Ok(value) => Ok(value),
            Err(Unwind::Return(value)) => Ok(Value::Return(Box::new(value))),
            Err(Unwind::Error(error)) => Err(error),
        }
    }

    /// Runs `program` and returns the text it produced. A top-level `return`
    /// stops rendering and keeps whatever was written before it.
    pub fn render(&mut self, program: &Program, scope: &Scope) -> Result<String, ScrawlError> {
        self.evaluate(program, scope)?;
        Ok(self.output.clone())
    }

    fn eval_statements(
        &mut self,
        statements: &[Stmt],
        scope: &Scope,
        emit: bool,
    ) -> Eval<Value> {
        let mut last = Value::Null;

        for statement in statements {
            last = self.eval_statement(statement, scope, emit)?;
        }

        Ok(last)
    }

    fn eval_block(&mut self, block: &Block, scope: &Scope, emit: bool) -> Eval<Value> {
        self.eval_statements(&block.statements, scope, emit)
    }

    fn eval_statement(&mut self, stmt: &Stmt, scope: &Scope, emit: bool) -> Eval<Value> {
        match stmt {
            Stmt::Text { text, .. } => {
                self.output.push_str(text);
                Ok(Value::Null)
            }
            Stmt::Let { name, value, .. } => {
                let value = self.eval_expr(value, scope)?;
                scope.define(name.clone(), value);
                Ok(Value::Null)
            }
            Stmt::Return { value, .. } => Err(Unwind::Return(self.eval_expr(value, scope)?)),
            Stmt::Expression { expr, .. } => match expr {
                // Their blocks emit on their own.
                Expr::If {
                    condition,
                    consequence,
                    alternative,
                    ..
                } => self.eval_if(condition, consequence, alternative.as_ref(), scope, emit),
                Expr::Foreach {
                    iterable,
                    variable,
                    body,
                    span,
                } => self.eval_foreach(iterable, variable, body, span, scope, emit),
                _ => {
                    let value = self.eval_expr(expr, scope)?;
                    if emit && is_printable(&value) {
                        self.output.push_str(&value.to_string());
                    }
                    Ok(value)
                }
            },
        }
    }

    fn eval_expr(&mut self, expr: &Expr, scope: &Scope) -> Eval<Value> {
        match expr {
            Expr::Identifier { name, span } => Ok(self.lookup(name, span, scope)?),
            Expr::Integer { value, .. } => Ok(Value::Integer(*value)),
            Expr::Decimal { value, .. } => Ok(Value::Decimal(*value)),
            Expr::String { value, .. } => Ok(Value::String(value.clone())),
            Expr::Boolean { value, .. } => Ok(Value::Boolean(*value)),
            Expr::Prefix {
                operator,
                operand,
                span,
            } => {
                let operand = self.eval_expr(operand, scope)?;
                Ok(evaluate_prefix_op(*operator, operand, span)?)
            }
            Expr::Infix {
                left,
                operator,
                right,
                span,
            } => {
                let left = self.eval_expr(left, scope)?;
                let right = self.eval_expr(right, scope)?;
                Ok(evaluate_binary_op(*operator, left, right, span)?)
            }
            Expr::Assign { target, value, .. } => {
                let value = self.eval_expr(value, scope)?;
                self.assign(target, value, scope)?;
                Ok(Value::Null)
            }
            Expr::Call { callee, args, span } => {
                let function = self.eval_expr(callee, scope)?;
                let mut arguments = Vec::with_capacity(args.len());
                for arg in args {
                    arguments.push(self.eval_expr(arg, scope)?);
                }
                self.apply_function(function, arguments, span)
            }
            Expr::Index {
                object,
                index,
                span,
            } => {
                let object = self.eval_expr(object, scope)?;
                let index = self.eval_expr(index, scope)?;
                Ok(index_value(&object, &index, span)?)
            }
            Expr::Property { object, path, .. } => self.eval_property(object, path, scope),
            Expr::If {
                condition,
                consequence,
                alternative,
                ..
            } => self.eval_if(condition, consequence, alternative.as_ref(), scope, false),
            Expr::Foreach {
                iterable,
                variable,
                body,
                span,
            } => self.eval_foreach(iterable, variable, body, span, scope, false),
            Expr::Function(literal) => Ok(self.eval_function_literal(literal, scope)?),
            Expr::Array { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element, scope)?);
                }
                Ok(Value::array(values))
            }
            Expr::Hash { pairs, .. } => {
                let mut hash = HashValue::new();
                for (key, value) in pairs {
                    let value = self.eval_expr(value, scope)?;
                    hash.insert_str(key.as_str(), value);
                }
                Ok(Value::hash(hash))
            }
        }
    }

    fn lookup(&self, name: &str, span: &Span, scope: &Scope) -> Result<Value, ScrawlError> {
        if let Some(value) = scope.get(name) {
            return Ok(value);
        }

        self.functions.get(name).cloned().ok_or_else(|| {
            ScrawlError::runtime_error_with_help(
                *span,
                format!("Undefined variable '{}'", name),
                format!("Declare it before use: let {} = ...;", name),
            )
        })
    }

    fn eval_if(
        &mut self,
        condition: &Expr,
        consequence: &Block,
        alternative: Option<&Block>,
        scope: &Scope,
        emit: bool,
    ) -> Eval<Value> {
        let condition = self.eval_expr(condition, scope)?;

        if condition.is_truthy() {
            self.eval_block(consequence, &scope.child(), emit)
        } else if let Some(alternative) = alternative {
            self.eval_block(alternative, &scope.child(), emit)
        } else {
            Ok(Value::Null)
        }
    }

    fn eval_foreach(
        &mut self,
        iterable: &Expr,
        variable: &str,
        body: &Block,
        span: &Span,
        scope: &Scope,
        emit: bool,
    ) -> Eval<Value> {
        // Iterate over a snapshot so the body may modify the collection.
        let items: Vec<Value> = match self.eval_expr(iterable, scope)? {
            Value::Array(elements) => elements.borrow().clone(),
            Value::Hash(hash) => hash.borrow().values().cloned().collect(),
            // Nothing to walk over.
            _ => Vec::new(),
        };

        tracing::trace!(iterations = items.len(), line = span.line, "foreach");

        for item in items {
            let iteration = scope.child();
            iteration.define(variable, item);
            self.eval_block(body, &iteration, emit)?;
        }

        Ok(Value::Null)
    }

    fn eval_function_literal(
        &mut self,
        literal: &Arc<FunctionLiteral>,
        scope: &Scope,
    ) -> Result<Value, ScrawlError> {
        let function = Value::Function(Rc::new(FunctionValue::new(
            Arc::clone(literal),
            scope.clone(),
        )));

        if let Some(name) = &literal.name {
            if scope.contains_local(name) {
                return Err(ScrawlError::runtime_error(
                    literal.span,
                    format!("'{}' is already defined in this scope", name),
                ));
            }
            scope.define(name.clone(), function.clone());
        }

        Ok(function)
    }

    fn apply_function(
        &mut self,
        function: Value,
        args: Vec<Value>,
        span: &Span,
    ) -> Eval<Value> {
        match function {
            Value::Function(function) => {
                let parameters = function.parameters();
                if parameters.len() != args.len() {
                    return Err(Unwind::Error(ScrawlError::runtime_error(
                        *span,
                        format!(
                            "{} expects {} argument(s), got {}",
                            function,
                            parameters.len(),
                            args.len()
                        ),
                    )));
                }

                tracing::debug!(
                    name = function.name().unwrap_or("<anonymous>"),
                    args = args.len(),
                    "calling function"
                );

                let call_scope = function.scope.child();
                for (parameter, arg) in parameters.iter().zip(args) {
                    call_scope.define(parameter.clone(), arg);
                }

                match self.eval_block(&function.literal.body, &call_scope, false) {
                    Ok(value) | Err(Unwind::Return(value)) => Ok(value),
                    Err(error) => Err(error),
                }
            }
            Value::Builtin(builtin) => {
                tracing::debug!(name = %builtin.name, args = args.len(), "calling builtin");

                let mut context = CallContext {
                    output: &mut self.output,
                    log: &mut *self.log,
                };
                builtin
                    .call(&mut context, &args)
                    .map_err(|message| ScrawlError::runtime_error(*span, message).into())
            }
            other => Err(ScrawlError::runtime_error(
                *span,
                format!("Cannot call {}, it is not a function", other.type_name()),
            )
            .into()),
        }
    }

    /// Reads `object.a[0].b`: anything that is not a container along the way
    /// makes the whole path null.
    fn eval_property(
        &mut self,
        object: &Expr,
        path: &[PathSegment],
        scope: &Scope,
    ) -> Eval<Value> {
        let mut current = self.eval_expr(object, scope)?;

        for segment in path {
            let next = match segment {
                PathSegment::Field { name, .. } => match &current {
                    Value::Hash(hash) => hash.borrow().get_str(name).cloned(),
                    _ => None,
                },
                PathSegment::Index { index, .. } => {
                    let index = self.eval_expr(index, scope)?;
                    soft_index(&current, &index)
                }
            };

            match next {
                Some(value) => current = value,
                None => return Ok(Value::Null),
            }
        }

        Ok(current)
    }

    fn assign(&mut self, target: &AssignTarget, value: Value, scope: &Scope) -> Eval<()> {
        match target {
            AssignTarget::Identifier { name, span } => {
                if scope.assign(name, value) {
                    Ok(())
                } else {
                    Err(ScrawlError::runtime_error_with_help(
                        *span,
                        format!("Cannot assign to undeclared variable '{}'", name),
                        format!("Declare it first: let {} = ...;", name),
                    )
                    .into())
                }
            }
            AssignTarget::Index {
                object,
                index,
                span,
            } => {
                let container = self.eval_expr(object, scope)?;
                let index = self.eval_expr(index, scope)?;
                Ok(store_index(&container, index, value, span)?)
            }
            AssignTarget::Property { object, path, span } => {
                let Some((last, intermediate)) = path.split_last() else {
                    return Err(ScrawlError::runtime_error(
                        *span,
                        "Empty property path".to_string(),
                    )
                    .into());
                };

                let mut current = self.eval_expr(object, scope)?;
                for segment in intermediate {
                    current = self.descend_or_create(&current, segment, scope)?;
                }

                match last {
                    PathSegment::Field { name, span } => match &current {
                        Value::Hash(hash) => {
                            hash.borrow_mut().insert_str(name.as_str(), value);
                            Ok(())
                        }
                        other => Err(cannot_set_property(name, other, span).into()),
                    },
                    PathSegment::Index { index, span } => {
                        let index = self.eval_expr(index, scope)?;
                        Ok(store_index(&current, index, value, span)?)
                    }
                }
            }
        }
    }

    /// One step of a property write: follows the segment, filling a missing
    /// or null slot with a new hash so deeper segments have somewhere to go.
    fn descend_or_create(
        &mut self,
        current: &Value,
        segment: &PathSegment,
        scope: &Scope,
    ) -> Eval<Value> {
        match segment {
            PathSegment::Field { name, span } => {
                let Value::Hash(hash) = current else {
                    return Err(cannot_set_property(name, current, span).into());
                };

                let existing = hash.borrow().get_str(name).cloned();
                match existing {
                    Some(value) if !value.is_null() => Ok(value),
                    _ => {
                        let created = Value::hash(HashValue::new());
                        hash.borrow_mut().insert_str(name.as_str(), created.clone());
                        Ok(created)
                    }
                }
            }
            PathSegment::Index { index, span } => {
                let index = self.eval_expr(index, scope)?;
                let existing = index_value(current, &index, span)?;
                if !existing.is_null() {
                    return Ok(existing);
                }

                let created = Value::hash(HashValue::new());
                store_index(current, index, created.clone(), span)?;
                Ok(created)
            }
        }
    }
}

fn is_printable(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Function(_) | Value::Return(_))
}

fn cannot_set_property(name: &str, target: &Value, span: &Span) -> ScrawlError {
    ScrawlError::runtime_error(
        *span,
        format!("Cannot set property '{}' on {}", name, target.type_name()),
    )
}

fn array_get(elements: &[Value], index: i64) -> Value {
    usize::try_from(index)
        .ok()
        .and_then(|i| elements.get(i).cloned())
        .unwrap_or(Value::Null)
}

/// `object[index]` as an expression. Out-of-range positions and missing keys
/// read as null; a wrong index kind is an error.
fn index_value(object: &Value, index: &Value, span: &Span) -> Result<Value, ScrawlError> {
    match (object, index) {
        (Value::Array(elements), Value::Integer(i)) => Ok(array_get(&elements.borrow(), *i)),
        (Value::Array(_), other) => Err(ScrawlError::runtime_error(
            *span,
            format!("Array index must be an integer, got {}", other.type_name()),
        )),
        (Value::Hash(hash), key) => match key.hash_key() {
            Some(key) => Ok(hash.borrow().get(&key).cloned().unwrap_or(Value::Null)),
            None => Err(ScrawlError::runtime_error_with_help(
                *span,
                format!("Unusable as hash key: {}", key.type_name()),
                "Hash keys must be strings, integers or files.".to_string(),
            )),
        },
        (other, _) => Err(ScrawlError::runtime_error(
            *span,
            format!("Cannot index into {}", other.type_name()),
        )),
    }
}

/// Indexing inside a property path never fails.
fn soft_index(object: &Value, index: &Value) -> Option<Value> {
    match (object, index) {
        (Value::Array(elements), Value::Integer(i)) => Some(array_get(&elements.borrow(), *i)),
        (Value::Hash(hash), key) => key
            .hash_key()
            .map(|key| hash.borrow().get(&key).cloned().unwrap_or(Value::Null)),
        _ => None,
    }
}

fn store_index(container: &Value, index: Value, value: Value, span: &Span) -> Result<(), ScrawlError> {
    match (container, &index) {
        (Value::Array(elements), Value::Integer(i)) => {
            let mut elements = elements.borrow_mut();
            let len = elements.len();
            match usize::try_from(*i).ok().filter(|&i| i < len) {
                Some(i) => {
                    elements[i] = value;
                    Ok(())
                }
                None => Err(ScrawlError::runtime_error_with_help(
                    *span,
                    format!("Index {} out of range for array of length {}", i, len),
                    "Use append(array, value) to add elements.".to_string(),
                )),
            }
        }
        (Value::Array(_), other) => Err(ScrawlError::runtime_error(
            *span,
            format!("Array index must be an integer, got {}", other.type_name()),
        )),
        (Value::Hash(hash), key) => match key.hash_key() {
            Some(hash_key) => {
                hash.borrow_mut().insert(hash_key, index.clone(), value);
                Ok(())
            }
            None => Err(ScrawlError::runtime_error_with_help(
                *span,
                format!("Unusable as hash key: {}", key.type_name()),
                "Hash keys must be strings, integers or files.".to_string(),
            )),
        },
        (other, _) => Err(ScrawlError::runtime_error(
            *span,
            format!("Cannot assign by index into {}", other.type_name()),
        )),
    }
}

fn evaluate_prefix_op(operator: PrefixOp, operand: Value, span: &Span) -> Result<Value, ScrawlError> {
    match operator {
        PrefixOp::Not => match operand {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            _ => Ok(Value::Boolean(false)),
        },
        PrefixOp::Negate => match operand {
            Value::Integer(n) => n
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| overflow(span)),
            Value::Decimal(n) => Ok(Value::Decimal(-n)),
            other => Err(ScrawlError::runtime_error(
                *span,
                format!("Cannot negate {}", other.type_name()),
            )),
        },
    }
}

fn overflow(span: &Span) -> ScrawlError {
    ScrawlError::runtime_error(*span, "Integer overflow".to_string())
}

fn division_by_zero(span: &Span) -> ScrawlError {
    ScrawlError::runtime_error(*span, "Division by zero".to_string())
}

fn evaluate_binary_op(
    operator: InfixOp,
    left: Value,
    right: Value,
    span: &Span,
) -> Result<Value, ScrawlError> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => integer_op(operator, l, r, span),
        (Value::Decimal(l), Value::Decimal(r)) => decimal_op(operator, l, r, span),
        (Value::Integer(l), Value::Decimal(r)) => decimal_op(operator, l as f64, r, span),
        (Value::Decimal(l), Value::Integer(r)) => decimal_op(operator, l, r as f64, span),
        (Value::Boolean(l), Value::Boolean(r)) => match operator {
            InfixOp::Equal => Ok(Value::Boolean(l == r)),
            InfixOp::NotEqual => Ok(Value::Boolean(l != r)),
            _ => Err(unknown_operator("boolean", operator, "boolean", span)),
        },
        (Value::String(l), Value::String(r)) => match operator {
            InfixOp::Add => Ok(Value::String(l + &r)),
            InfixOp::Equal => Ok(Value::Boolean(l == r)),
            InfixOp::NotEqual => Ok(Value::Boolean(l != r)),
            _ => Err(unknown_operator("string", operator, "string", span)),
        },
        (Value::DateTime(l), Value::DateTime(r)) => match operator {
            InfixOp::Equal => Ok(Value::Boolean(l == r)),
            InfixOp::NotEqual => Ok(Value::Boolean(l != r)),
            InfixOp::Less => Ok(Value::Boolean(l < r)),
            InfixOp::LessEqual => Ok(Value::Boolean(l <= r)),
            InfixOp::Greater => Ok(Value::Boolean(l > r)),
            InfixOp::GreaterEqual => Ok(Value::Boolean(l >= r)),
            _ => Err(unknown_operator("datetime", operator, "datetime", span)),
        },
        (l, r) => match operator {
            InfixOp::Equal => Ok(Value::Boolean(is_identical(&l, &r))),
            InfixOp::NotEqual => Ok(Value::Boolean(!is_identical(&l, &r))),
            _ if l.type_name() != r.type_name() => Err(ScrawlError::runtime_error(
                *span,
                format!(
                    "Type mismatch: {} {} {}",
                    l.type_name(),
                    operator.symbol(),
                    r.type_name()
                ),
            )),
            _ => Err(unknown_operator(l.type_name(), operator, r.type_name(), span)),
        },
    }
}

fn unknown_operator(left: &str, operator: InfixOp, right: &str, span: &Span) -> ScrawlError {
    ScrawlError::runtime_error(
        *span,
        format!("Unknown operator: {} {} {}", left, operator.symbol(), right),
    )
}

fn integer_op(operator: InfixOp, l: i64, r: i64, span: &Span) -> Result<Value, ScrawlError> {
    let value = match operator {
        InfixOp::Add => Value::Integer(l.checked_add(r).ok_or_else(|| overflow(span))?),
        InfixOp::Subtract => Value::Integer(l.checked_sub(r).ok_or_else(|| overflow(span))?),
        InfixOp::Multiply => Value::Integer(l.checked_mul(r).ok_or_else(|| overflow(span))?),
        InfixOp::Divide => {
            if r == 0 {
                return Err(division_by_zero(span));
            }
            Value::Integer(l.checked_div(r).ok_or_else(|| overflow(span))?)
        }
        InfixOp::Equal => Value::Boolean(l == r),
        InfixOp::NotEqual => Value::Boolean(l != r),
        InfixOp::Less => Value::Boolean(l < r),
        InfixOp::LessEqual => Value::Boolean(l <= r),
        InfixOp::Greater => Value::Boolean(l > r),
        InfixOp::GreaterEqual => Value::Boolean(l >= r),
    };
    Ok(value)
}

fn decimal_op(operator: InfixOp, l: f64, r: f64, span: &Span) -> Result<Value, ScrawlError> {
    let value = match operator {
        InfixOp::Add => Value::Decimal(l + r),
        InfixOp::Subtract => Value::Decimal(l - r),
        InfixOp::Multiply => Value::Decimal(l * r),
        InfixOp::Divide => {
            if r == 0.0 {
                return Err(division_by_zero(span));
            }
            Value::Decimal(l / r)
        }
        InfixOp::Equal => Value::Boolean(l == r),
        InfixOp::NotEqual => Value::Boolean(l != r),
        InfixOp::Less => Value::Boolean(l < r),
        InfixOp::LessEqual => Value::Boolean(l <= r),
        InfixOp::Greater => Value::Boolean(l > r),
        InfixOp::GreaterEqual => Value::Boolean(l >= r),
    };
    Ok(value)
}

/// Equality for kinds without value comparison: same object, or both null.
fn is_identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Array(l), Value::Array(r)) => Rc::ptr_eq(l, r),
        (Value::Hash(l), Value::Hash(r)) => Rc::ptr_eq(l, r),
        (Value::Function(l), Value::Function(r)) => Rc::ptr_eq(l, r),
        (Value::Builtin(l), Value::Builtin(r)) => Rc::ptr_eq(l, r),
        (Value::File(l), Value::File(r)) => Rc::ptr_eq(l, r) || l.id == r.id,
        _ => false,
    }
}
