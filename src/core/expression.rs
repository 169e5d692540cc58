#![allow(clippy::result_large_err)] // Expression APIs return AppError so callers keep the offending expression.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use rhai::{Dynamic, Engine, Scope, AST};
use serde_json::Value;

/// Limits applied to every expression evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionLimits {
    pub max_operations: u64,
    pub max_expr_depth: usize,
}

impl Default for ExpressionLimits {
    fn default() -> Self {
        Self {
            max_operations: 50_000,
            max_expr_depth: 64,
        }
    }
}

/// Expression evaluation engine using a locked-down Rhai configuration.
///
/// Only single expressions are accepted: comparisons, boolean and arithmetic
/// operators, literals, and dotted references into the bound record. Statements,
/// blocks, loops, closures, and `if`/`switch` expressions are rejected at parse
/// time, and no function packages are registered.
pub struct ExpressionEngine {
    engine: Engine,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::with_limits(ExpressionLimits::default())
    }
}

impl ExpressionEngine {
    pub fn with_limits(limits: ExpressionLimits) -> Self {
        let mut engine = Engine::new_raw();
        engine.set_max_operations(limits.max_operations);
        engine.set_max_call_levels(8);
        engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
        engine.set_allow_if_expression(false);
        engine.set_allow_switch_expression(false);
        engine.set_allow_statement_expression(false);
        engine.set_allow_anonymous_fn(false);
        engine.set_allow_looping(false);
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});
        // Fields absent from a record read as unit, like absent map members.
        engine.on_var(|name, _, context| {
            if context.scope().contains(name) {
                Ok(None)
            } else {
                Ok(Some(Dynamic::UNIT))
            }
        });
        ExpressionEngine { engine }
    }

    /// Parse `expr` without evaluating it.
    pub fn compile(&self, expr: &str) -> Result<AST, AppError> {
        if expr.trim().is_empty() {
            return Err(syntax_error(expr, "expression is empty"));
        }
        self.engine
            .compile_expression(expr)
            .map_err(|err| syntax_error(expr, &err.to_string()))
    }

    /// Returns `true` when `expr` parses under the restricted grammar.
    pub fn is_valid(&self, expr: &str) -> bool {
        self.compile(expr).is_ok()
    }

    /// Evaluate `expr` with the top-level fields of `record` bound as variables.
    pub fn evaluate(&self, expr: &str, record: &Value) -> Result<Value, AppError> {
        self.evaluate_with(expr, record, &[])
    }

    /// Evaluate `expr` with the fields of `record` plus `extra` bindings in scope.
    /// Extra bindings never shadow a field of the record.
    pub fn evaluate_with(
        &self,
        expr: &str,
        record: &Value,
        extra: &[(&str, &Value)],
    ) -> Result<Value, AppError> {
        let ast = self.compile(expr)?;
        let mut scope = Scope::new();
        if let Value::Object(map) = record {
            for (key, value) in map {
                if is_identifier(key) {
                    scope.push_dynamic(key.as_str(), bind(value));
                }
            }
        }
        for (name, value) in extra {
            if !scope.contains(name) {
                scope.push_dynamic(*name, bind(value));
            }
        }

        let outcome = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::StepExecutionFailure,
                    format!("expression execution error in '{}': {}", expr, err),
                )
                .with_code("PW-EXPR-002")
                .with_context("expression", expr)
            })?;
        unbind(expr, outcome)
    }

    /// Evaluate `expr` and reduce the result to a boolean using JSON truthiness.
    pub fn evaluate_truthy(
        &self,
        expr: &str,
        record: &Value,
        extra: &[(&str, &Value)],
    ) -> Result<bool, AppError> {
        self.evaluate_with(expr, record, extra)
            .map(|value| is_truthy(&value))
    }
}

fn syntax_error(expr: &str, detail: &str) -> AppError {
    AppError::new(
        ErrorCategory::InvalidExpressionSyntax,
        format!("expression compile error in '{}': {}", expr, detail),
    )
    .with_context("expression", expr)
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// JSON truthiness: `null`, `false`, zero, and empty strings/containers are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn bind(value: &Value) -> Dynamic {
    rhai::serde::to_dynamic(value).unwrap_or(Dynamic::UNIT)
}

fn unbind(expr: &str, value: Dynamic) -> Result<Value, AppError> {
    rhai::serde::from_dynamic::<Value>(&value).map_err(|err| {
        AppError::new(
            ErrorCategory::StepExecutionFailure,
            format!("expression '{}' produced a non-JSON value: {}", expr, err),
        )
        .with_code("PW-EXPR-003")
        .with_context("expression", expr)
    })
}
