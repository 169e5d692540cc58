#![allow(clippy::result_large_err)]

//! Structural operations: flatten, unflatten, rename, select, compute, take.

use crate::core::error::AppError;
use crate::core::expression::ExpressionEngine;
use crate::core::path;
use crate::core::transform::schema::ValueKind;
use crate::core::types::ErrorCategory;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Levels to descend below the flattened value; `<= 0` is unlimited.
    /// `depth: 1` turns `{"a": {"b": {"c": 1}}}` into `{"a.b": {"c": 1}}`.
    #[serde(default)]
    pub depth: i64,
    #[serde(default)]
    pub preserve_arrays: bool,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            depth: 0,
            preserve_arrays: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnflattenConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub overwrite: bool,
}

impl Default for UnflattenConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            overwrite: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldMapping {
    pub from: String,
    pub to: String,
}

/// `mappings` accepts a list of `{from, to}` pairs or a `{from: to}` object.
#[derive(Debug, Clone, Deserialize)]
pub struct RenameConfig {
    #[serde(deserialize_with = "deserialize_mappings")]
    pub mappings: Vec<FieldMapping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectConfig {
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComputeConfig {
    pub field: String,
    pub expression: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TakeConfig {
    pub count: Value,
}

fn default_delimiter() -> String {
    ".".to_string()
}

fn deserialize_mappings<'de, D>(deserializer: D) -> Result<Vec<FieldMapping>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Mappings {
        List(Vec<FieldMapping>),
        Object(Map<String, Value>),
    }

    match Mappings::deserialize(deserializer)? {
        Mappings::List(list) => Ok(list),
        Mappings::Object(map) => map
            .into_iter()
            .map(|(from, to)| match to {
                Value::String(to) => Ok(FieldMapping { from, to }),
                other => Err(serde::de::Error::custom(format!(
                    "mapping for '{}' must be a string, got {}",
                    from, other
                ))),
            })
            .collect(),
    }
}

fn step_error(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::StepExecutionFailure, message)
}

fn check_delimiter(delimiter: &str) -> Result<(), AppError> {
    if delimiter.is_empty() {
        return Err(step_error("delimiter must not be empty").with_code("PW-STEP-003"));
    }
    Ok(())
}

/// Collapse nested containers into a single-level object of compound keys.
///
/// Scalars (and arrays when `preserve_arrays` is set) are returned unchanged.
pub fn flatten(value: &Value, config: &FlattenConfig) -> Result<Value, AppError> {
    check_delimiter(&config.delimiter)?;
    if !is_expandable(value, config) {
        return Ok(value.clone());
    }
    let mut out = Map::new();
    let mut prefix = Vec::new();
    flatten_into(value, config, &mut prefix, &mut out);
    Ok(Value::Object(out))
}

fn is_expandable(value: &Value, config: &FlattenConfig) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !config.preserve_arrays && !items.is_empty(),
        _ => false,
    }
}

fn flatten_into(
    value: &Value,
    config: &FlattenConfig,
    prefix: &mut Vec<String>,
    out: &mut Map<String, Value>,
) {
    let children: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => return,
    };
    for (key, child) in children {
        prefix.push(key);
        let within_depth = config.depth <= 0 || (prefix.len() as i64) <= config.depth;
        if within_depth && is_expandable(child, config) {
            flatten_into(child, config, prefix, out);
        } else {
            out.insert(prefix.join(&config.delimiter), child.clone());
        }
        prefix.pop();
    }
}

/// Rebuild nested objects from compound keys. Non-objects pass through.
pub fn unflatten(value: &Value, config: &UnflattenConfig) -> Result<Value, AppError> {
    check_delimiter(&config.delimiter)?;
    let Value::Object(flat) = value else {
        return Ok(value.clone());
    };
    let mut out = Map::new();
    for (key, child) in flat {
        let parts: Vec<&str> = key.split(config.delimiter.as_str()).collect();
        insert_nested(&mut out, &parts, child.clone(), config.overwrite);
    }
    Ok(Value::Object(out))
}

fn insert_nested(map: &mut Map<String, Value>, parts: &[&str], value: Value, overwrite: bool) {
    let Some((head, rest)) = parts.split_first() else {
        return;
    };
    if rest.is_empty() {
        if overwrite || !map.contains_key(*head) {
            map.insert(head.to_string(), value);
        }
        return;
    }
    let slot = map
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        if !overwrite {
            return;
        }
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(child) = slot {
        insert_nested(child, rest, value, overwrite);
    }
}

/// Move values between paths of the whole document. Missing sources are ignored.
pub fn rename_fields(document: &Value, config: &RenameConfig) -> Value {
    let mut out = document.clone();
    for mapping in &config.mappings {
        if mapping.from == mapping.to {
            continue;
        }
        if let Some(moved) = path::remove(&mut out, &mapping.from) {
            path::set(&mut out, &mapping.to, moved);
        }
    }
    out
}

/// Keep only the listed paths, each at the same location in a fresh document.
pub fn select_fields(value: &Value, config: &SelectConfig) -> Value {
    let mut out = Value::Object(Map::new());
    for field in &config.fields {
        if let Some(found) = path::get(value, field) {
            path::set(&mut out, field, found.clone());
        }
    }
    out
}

/// Evaluate `expression` over `value` and store the result under `field`.
/// The target must be an object, or absent (a fresh object is created).
pub fn compute_field(
    value: &Value,
    config: &ComputeConfig,
    engine: &ExpressionEngine,
) -> Result<Value, AppError> {
    let mut out = match value {
        Value::Null => Value::Object(Map::new()),
        Value::Object(_) => value.clone(),
        _ => {
            return Err(step_error(format!(
                "compute_field requires an object target, got {}",
                ValueKind::of(value)
            ))
            .with_code("PW-STEP-004"))
        }
    };
    let computed = engine.evaluate(&config.expression, value)?;
    path::set(&mut out, &config.field, computed);
    Ok(out)
}

/// Truncate an array to its first `count` elements.
pub fn array_take(value: &Value, config: &TakeConfig) -> Result<Value, AppError> {
    let count = config.count.as_u64().ok_or_else(|| {
        step_error(format!(
            "count must be a non-negative integer, got {}",
            config.count
        ))
        .with_code("PW-STEP-003")
    })?;
    let Value::Array(items) = value else {
        return Err(step_error("array_take requires an array").with_code("PW-STEP-004"));
    };
    let count = usize::try_from(count).unwrap_or(usize::MAX);
    Ok(Value::Array(items.iter().take(count).cloned().collect()))
}
