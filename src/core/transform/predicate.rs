#![allow(clippy::result_large_err)]

//! Predicate trees: `{path, op, value}` leaves combined with `and`/`or`/`not`.

use crate::core::error::AppError;
use crate::core::expression::ExpressionEngine;
use crate::core::path;
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison applied by a predicate leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    #[serde(alias = "==", alias = "equals")]
    Eq,
    #[serde(alias = "!=", alias = "neq")]
    Ne,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Gte,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Lte,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Exists,
    NotExists,
    Empty,
    NotEmpty,
}

/// Boolean condition over one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    And {
        and: Vec<Predicate>,
    },
    Or {
        or: Vec<Predicate>,
    },
    Not {
        not: Box<Predicate>,
    },
    Leaf {
        path: String,
        op: ComparisonOp,
        #[serde(default)]
        value: Value,
    },
}

impl Predicate {
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Predicate::And { and } => and.iter().all(|p| p.matches(record)),
            Predicate::Or { or } => or.iter().any(|p| p.matches(record)),
            Predicate::Not { not } => !not.matches(record),
            Predicate::Leaf { path, op, value } => compare(path::get(record, path), *op, value),
        }
    }
}

/// A `where`/`having` clause: an expression string or a predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Expression(String),
    Tree(Predicate),
}

impl Condition {
    pub fn parse(value: &Value) -> Result<Self, AppError> {
        match value {
            Value::String(expr) => Ok(Condition::Expression(expr.clone())),
            other => serde_json::from_value::<Predicate>(other.clone())
                .map(Condition::Tree)
                .map_err(|err| {
                    AppError::new(
                        ErrorCategory::StepExecutionFailure,
                        format!("invalid predicate tree: {}", err),
                    )
                    .with_code("PW-STEP-002")
                }),
        }
    }

    /// Evaluate against `record`; expression clauses also see the record as `item`.
    pub fn matches(&self, record: &Value, engine: &ExpressionEngine) -> Result<bool, AppError> {
        match self {
            Condition::Expression(expr) => engine.evaluate_truthy(expr, record, &[("item", record)]),
            Condition::Tree(tree) => Ok(tree.matches(record)),
        }
    }
}

fn compare(actual: Option<&Value>, op: ComparisonOp, expected: &Value) -> bool {
    match op {
        ComparisonOp::Exists => actual.is_some_and(|v| !v.is_null()),
        ComparisonOp::NotExists => actual.map(Value::is_null).unwrap_or(true),
        ComparisonOp::Empty => match actual {
            None | Some(Value::Null) => true,
            Some(Value::String(text)) => text.is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        },
        ComparisonOp::NotEmpty => !compare(actual, ComparisonOp::Empty, expected),
        ComparisonOp::Eq => actual.is_some_and(|v| loosely_equal(v, expected)),
        ComparisonOp::Ne => !actual.is_some_and(|v| loosely_equal(v, expected)),
        ComparisonOp::Gt => ordering(actual, expected) == Some(Ordering::Greater),
        ComparisonOp::Gte => matches!(
            ordering(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        ComparisonOp::Lt => ordering(actual, expected) == Some(Ordering::Less),
        ComparisonOp::Lte => matches!(
            ordering(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        ComparisonOp::Contains => actual.is_some_and(|v| contains(v, expected)),
        ComparisonOp::NotContains => !actual.is_some_and(|v| contains(v, expected)),
        ComparisonOp::StartsWith => match (actual, expected) {
            (Some(Value::String(s)), Value::String(prefix)) => s.starts_with(prefix.as_str()),
            _ => false,
        },
        ComparisonOp::EndsWith => match (actual, expected) {
            (Some(Value::String(s)), Value::String(suffix)) => s.ends_with(suffix.as_str()),
            _ => false,
        },
        ComparisonOp::In => member_of(actual, expected),
        ComparisonOp::NotIn => !member_of(actual, expected),
    }
}

/// Equality that treats `1` and `1.0` as equal and numeric strings as numbers.
pub fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.parse::<f64>().ok() == n.as_f64()
        }
        _ => false,
    }
}

/// Order two JSON values when they are comparable (numbers or strings).
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn ordering(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    compare_values(actual?, expected)
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(s), Value::String(t)) => s.contains(t.as_str()),
        (Value::Array(items), target) => items.iter().any(|item| loosely_equal(item, target)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

fn member_of(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match expected {
        Value::Array(options) => options.iter().any(|option| loosely_equal(actual, option)),
        other => loosely_equal(actual, other),
    }
}
