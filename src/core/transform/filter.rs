#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::expression::ExpressionEngine;
use crate::core::transform::predicate::Condition;
use crate::core::types::ErrorCategory;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Keep,
    Drop,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(rename = "where")]
    pub condition: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostLimitConfig {
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

fn expect_array<'a>(value: &'a Value, operation: &str) -> Result<&'a Vec<Value>, AppError> {
    value.as_array().ok_or_else(|| {
        AppError::new(
            ErrorCategory::StepExecutionFailure,
            format!("{} requires an array", operation),
        )
        .with_code("PW-STEP-004")
    })
}

/// Retain (`keep`) or remove (`drop`) the elements matching `where`.
pub fn filter(
    value: &Value,
    config: &FilterConfig,
    engine: &ExpressionEngine,
) -> Result<Value, AppError> {
    let items = expect_array(value, "filter")?;
    let condition = Condition::parse(&config.condition)?;
    let keep_matches = config.mode == FilterMode::Keep;
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        if condition.matches(item, engine)? == keep_matches {
            kept.push(item.clone());
        }
    }
    Ok(Value::Array(kept))
}

/// Skip `offset` elements and take up to `limit` of the rest.
pub fn post_limit(value: &Value, config: &PostLimitConfig) -> Result<Value, AppError> {
    let items = expect_array(value, "post_limit")?;
    let offset = config.offset.unwrap_or(0) as usize;
    let limit = config.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    Ok(Value::Array(
        items.iter().skip(offset).take(limit).cloned().collect(),
    ))
}
