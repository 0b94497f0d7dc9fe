//! The tree-walking evaluator.
//!
//! Dispatches on AST variants, owns the environment chain and the
//! per-block deferred-call queues, and reports failures as either a
//! control-flow signal (`break`/`continue`/`return`/assert) or an
//! evaluation error carrying a span trace.

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use crate::ast::{BinaryOp, Block, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use crate::environment::{Environment, Globals};
use crate::importer::Importer;
use crate::lexer::Span;
use crate::report;
use crate::value::{
    self, is_truthy, FunctionValue, RuntimeError, Value,
};

mod natives;

const MAX_CALL_DEPTH: usize = 256;

/// An evaluation failure annotated with the chain of node spans it
/// bubbled through, innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub error: RuntimeError,
    pub trace: Vec<Span>,
}

impl EvalError {
    pub fn new(error: RuntimeError, span: Span) -> Self {
        Self {
            error,
            trace: vec![span],
        }
    }

    pub fn bare(error: RuntimeError) -> Self {
        Self {
            error,
            trace: Vec::new(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        self.trace.first().copied()
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evaluation error: {}", self.error)
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A non-value outcome of evaluating a node. `Error` accumulates spans
/// as it unwinds; the other variants pass through every dispatch site
/// untouched until the construct that consumes them.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalSignal {
    Break { span: Span },
    Continue { span: Span },
    Return { value: Value, span: Span },
    AssertFailure { expression: String, span: Span },
    Error(EvalError),
}

impl EvalSignal {
    pub fn bare(error: RuntimeError) -> Self {
        EvalSignal::Error(EvalError::bare(error))
    }
}

fn attach_span(span: Span, result: Result<Value, EvalSignal>) -> Result<Value, EvalSignal> {
    match result {
        Err(EvalSignal::Error(mut err)) => {
            if err.trace.last() != Some(&span) {
                err.trace.push(span);
            }
            Err(EvalSignal::Error(err))
        }
        other => other,
    }
}

fn signal_into_error(signal: EvalSignal) -> EvalError {
    match signal {
        EvalSignal::Error(err) => err,
        EvalSignal::Break { span } => EvalError::new(RuntimeError::BreakOutsideLoop, span),
        EvalSignal::Continue { span } => EvalError::new(RuntimeError::ContinueOutsideLoop, span),
        EvalSignal::Return { span, .. } => {
            EvalError::new(RuntimeError::ReturnOutsideFunction, span)
        }
        EvalSignal::AssertFailure { expression, span } => {
            EvalError::new(RuntimeError::AssertionFailed { expression }, span)
        }
    }
}

pub struct Evaluator {
    globals: Rc<Globals>,
    env: Environment,
    defer_stack: Vec<Vec<Expr>>,
    pub(crate) importer: Importer,
    call_depth: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_base_dir(base_dir)
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let globals = Globals::new();
        natives::install(&globals);
        let env = Environment::new(globals.clone());
        Self {
            globals,
            env,
            defer_stack: Vec::new(),
            importer: Importer::new(base_dir.into()),
            call_depth: 0,
        }
    }

    pub fn add_module_path(&mut self, dir: impl Into<PathBuf>) {
        self.importer.add_search_path(dir.into());
    }

    /// Registers a host value in the global table. Must happen before
    /// evaluation; a duplicate name panics.
    pub fn register_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.register(name, value);
    }

    /// Evaluates a program and yields the value of its last statement.
    /// A `break`/`continue`/`return` that escapes to this level is an
    /// error, as is an assertion failure.
    pub fn evaluate(&mut self, program: &Program) -> Result<Value, EvalError> {
        self.defer_stack.push(Vec::new());

        let mut outcome = Ok(Value::Nil);
        for stmt in &program.statements {
            match self.eval_stmt(stmt) {
                Ok(value) => outcome = Ok(value),
                Err(signal) => {
                    outcome = Err(signal);
                    break;
                }
            }
        }

        self.run_deferred(outcome).map_err(signal_into_error)
    }

    /// Evaluates a single expression in the current environment. Used by
    /// the REPL to print the value of an expression line.
    pub fn evaluate_expression(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        self.eval_expr(expr).map_err(signal_into_error)
    }

    fn eval_stmt(&mut self, stmt: &Stmt) -> Result<Value, EvalSignal> {
        let result = self.eval_stmt_kind(stmt);
        attach_span(stmt.span, result)
    }

    fn eval_stmt_kind(&mut self, stmt: &Stmt) -> Result<Value, EvalSignal> {
        match &stmt.kind {
            StmtKind::Var { name, value } => {
                let value = self.eval_expr(value)?;
                self.env.declare(name, value).map_err(EvalSignal::bare)?;
                Ok(Value::Nil)
            }
            StmtKind::Assign { name, value } => {
                let value = self.eval_expr(value)?;
                self.env.assign(name, value).map_err(EvalSignal::bare)?;
                Ok(Value::Nil)
            }
            StmtKind::Expr(expr) => self.eval_expr(expr),
            StmtKind::Block(block) => self.eval_block(block),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let decided = self.eval_expr(condition)?;
                if is_truthy(&decided) {
                    self.eval_block(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.eval_block(else_branch)
                } else {
                    Ok(Value::Nil)
                }
            }
            StmtKind::While { condition, body } => self.eval_while(condition, body),
            StmtKind::Break => Err(EvalSignal::Break { span: stmt.span }),
            StmtKind::Continue => Err(EvalSignal::Continue { span: stmt.span }),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Nil,
                };
                Err(EvalSignal::Return {
                    value,
                    span: stmt.span,
                })
            }
            StmtKind::FunctionDef { name, params, body } => {
                let function = Value::Function(Rc::new(FunctionValue {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    closure: self.env.clone(),
                }));
                self.env
                    .declare(name, function.clone())
                    .map_err(EvalSignal::bare)?;
                Ok(function)
            }
            StmtKind::Defer(call) => match self.defer_stack.last_mut() {
                Some(queue) => {
                    queue.push(call.clone());
                    Ok(Value::Nil)
                }
                None => Err(EvalSignal::bare(RuntimeError::DeferOutsideBlock)),
            },
            StmtKind::Assert(expression) => {
                let value = self.eval_expr(expression)?;
                if is_truthy(&value) {
                    Ok(Value::Nil)
                } else {
                    Err(EvalSignal::AssertFailure {
                        expression: expression.to_string(),
                        span: stmt.span,
                    })
                }
            }
            StmtKind::Import { module } => {
                self.eval_import(module)?;
                Ok(Value::Nil)
            }
            StmtKind::Comment => Ok(Value::Nil),
        }
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, EvalSignal> {
        let result = self.eval_expr_kind(expr);
        attach_span(expr.span, result)
    }

    fn eval_expr_kind(&mut self, expr: &Expr) -> Result<Value, EvalSignal> {
        match &expr.kind {
            ExprKind::Identifier(name) => self.env.get(name).map_err(EvalSignal::bare),
            ExprKind::Number(value) => Ok(Value::Number(*value)),
            ExprKind::Str(value) => Ok(Value::string(value.clone())),
            ExprKind::Bool(value) => Ok(Value::Bool(*value)),
            ExprKind::Nil => Ok(Value::Nil),
            ExprKind::List(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element)?);
                }
                Ok(Value::list(values))
            }
            ExprKind::Map(pairs) => self.eval_map_literal(pairs),
            ExprKind::Index { target, index } => {
                let target = self.eval_expr(target)?;
                let index = self.eval_expr(index)?;
                value::item_at_index(&target, &index).map_err(EvalSignal::bare)
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args),
            ExprKind::Unary { op, operand } => {
                let operand = self.eval_expr(operand)?;
                match op {
                    UnaryOp::Not => Ok(value::not(&operand)),
                    UnaryOp::Negate => value::negate(&operand).map_err(EvalSignal::bare),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval_expr(lhs)?;
                let rhs = self.eval_expr(rhs)?;
                self.eval_binary(*op, &lhs, &rhs)
            }
            ExprKind::And { lhs, rhs } => {
                let left = self.eval_expr(lhs)?;
                if !is_truthy(&left) {
                    return Ok(Value::Bool(false));
                }
                let right = self.eval_expr(rhs)?;
                Ok(Value::Bool(is_truthy(&right)))
            }
            ExprKind::Or { lhs, rhs } => {
                let left = self.eval_expr(lhs)?;
                if is_truthy(&left) {
                    return Ok(Value::Bool(true));
                }
                let right = self.eval_expr(rhs)?;
                Ok(Value::Bool(is_truthy(&right)))
            }
            ExprKind::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                let decided = self.eval_expr(condition)?;
                if is_truthy(&decided) {
                    self.eval_expr(then_value)
                } else {
                    self.eval_expr(else_value)
                }
            }
        }
    }

    fn eval_binary(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalSignal> {
        let result = match op {
            BinaryOp::Add => value::add(lhs, rhs),
            BinaryOp::Subtract => value::subtract(lhs, rhs),
            BinaryOp::Multiply => value::multiply(lhs, rhs),
            BinaryOp::Divide => value::divide(lhs, rhs),
            BinaryOp::Modulo => value::modulo(lhs, rhs),
            BinaryOp::Eq => Ok(value::equal_to(lhs, rhs)),
            BinaryOp::NotEq => Ok(value::not_equal_to(lhs, rhs)),
            BinaryOp::Lt => value::less_than(lhs, rhs),
            BinaryOp::LtEq => value::less_than_eq(lhs, rhs),
            BinaryOp::Gt => value::greater_than(lhs, rhs),
            BinaryOp::GtEq => value::greater_than_eq(lhs, rhs),
        };
        result.map_err(EvalSignal::bare)
    }

    fn eval_map_literal(&mut self, pairs: &[(Expr, Expr)]) -> Result<Value, EvalSignal> {
        let mut entries = indexmap::IndexMap::new();
        for (key_expr, value_expr) in pairs {
            let key = self.eval_expr(key_expr)?;
            let value = self.eval_expr(value_expr)?;
            let key = value::MapKey::from_value(&key).map_err(EvalSignal::bare)?;
            let rendered = key.to_string();
            if entries.insert(key, value).is_some() {
                return Err(EvalSignal::bare(RuntimeError::DuplicateMapKey {
                    key: rendered,
                }));
            }
        }
        Ok(Value::Map(Rc::new(entries)))
    }

    /// Runs a block in a fresh scope enclosed by the current one. The
    /// environment and the block's deferred queue are unwound on every
    /// exit path.
    fn eval_block(&mut self, block: &Block) -> Result<Value, EvalSignal> {
        self.eval_block_in(block, Environment::new_enclosed(&self.env))
    }

    pub(crate) fn eval_block_in(
        &mut self,
        block: &[Stmt],
        env: Environment,
    ) -> Result<Value, EvalSignal> {
        let previous = std::mem::replace(&mut self.env, env);
        self.defer_stack.push(Vec::new());

        let mut outcome = Ok(Value::Nil);
        for stmt in block {
            if let Err(signal) = self.eval_stmt(stmt) {
                outcome = Err(signal);
                break;
            }
        }

        let outcome = self.run_deferred(outcome);
        self.env = previous;
        outcome
    }

    // Deferred calls run last-in first-out. A deferred failure becomes
    // the outcome only when the block was exiting normally; during an
    // unwind the original signal wins. Remaining calls run either way.
    fn run_deferred(&mut self, outcome: Result<Value, EvalSignal>) -> Result<Value, EvalSignal> {
        let Some(mut queue) = self.defer_stack.pop() else {
            return outcome;
        };

        let mut outcome = outcome;
        while let Some(call) = queue.pop() {
            if let Err(signal) = self.eval_expr(&call) {
                if outcome.is_ok() {
                    outcome = Err(signal);
                }
            }
        }

        outcome
    }

    fn eval_while(&mut self, condition: &Expr, body: &Block) -> Result<Value, EvalSignal> {
        loop {
            let decided = self.eval_expr(condition)?;
            if !is_truthy(&decided) {
                break;
            }

            match self.eval_block(body) {
                Ok(_) => {}
                Err(EvalSignal::Break { .. }) => break,
                Err(EvalSignal::Continue { .. }) => continue,
                Err(signal) => return Err(signal),
            }
        }

        Ok(Value::Nil)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value, EvalSignal> {
        let callee_value = self.eval_expr(callee)?;

        // A non-callable callee gets one retry: its display string is
        // looked up in the environment and that binding is tried instead.
        let target = if callee_value.as_callable().is_some() {
            callee_value
        } else {
            match self.env.get(&callee_value.to_string()) {
                Ok(bound) if bound.as_callable().is_some() => bound,
                _ => {
                    return Err(EvalSignal::bare(RuntimeError::NotCallable(
                        callee_value.type_tag(),
                    )));
                }
            }
        };

        let Some(callable) = target.as_callable() else {
            return Err(EvalSignal::bare(RuntimeError::NotCallable(
                target.type_tag(),
            )));
        };

        if !callable.variadic() && callable.arity() != args.len() {
            return Err(EvalSignal::bare(RuntimeError::ArityMismatch {
                callee: callable.name().to_string(),
                expected: callable.arity(),
                provided: args.len(),
            }));
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg)?);
        }

        callable.call(self, values)
    }

    /// Invokes a user function: binds formals to actuals in a fresh
    /// environment enclosing the captured one, runs the body, and
    /// consumes a `return` signal. The body's last value is discarded;
    /// without an explicit `return` the call yields Nil.
    pub(crate) fn invoke_function(
        &mut self,
        function: &FunctionValue,
        args: Vec<Value>,
    ) -> Result<Value, EvalSignal> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(EvalSignal::bare(RuntimeError::CallDepthExceeded {
                limit: MAX_CALL_DEPTH,
            }));
        }

        let call_env = Environment::new_enclosed(&function.closure);
        for (param, arg) in function.params.iter().zip(args) {
            call_env.declare(param, arg).map_err(EvalSignal::bare)?;
        }

        self.call_depth += 1;
        let result = self.eval_block_in(&function.body, call_env);
        self.call_depth -= 1;

        match result {
            Ok(_) => Ok(Value::Nil),
            Err(EvalSignal::Return { value, .. }) => Ok(value),
            Err(signal) => Err(signal),
        }
    }

    fn eval_import(&mut self, name: &str) -> Result<(), EvalSignal> {
        let module = self.importer.resolve(name).map_err(EvalSignal::bare)?;
        self.import(&module).map_err(|err| {
            let detail = report::render_import_error(&err, &module);
            EvalSignal::bare(RuntimeError::ImportFailed {
                module: name.to_string(),
                detail,
            })
        })
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}
