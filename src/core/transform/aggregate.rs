#![allow(clippy::result_large_err)]

//! `group_by` / `aggregate`: partition an array of records and compute metrics.

use crate::core::error::AppError;
use crate::core::expression::ExpressionEngine;
use crate::core::path;
use crate::core::transform::predicate::{compare_values, Condition};
use crate::core::types::ErrorCategory;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// Field flagging the synthetic row appended by `rollup`.
pub const ROLLUP_FLAG: &str = "_rollup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl MetricOp {
    fn name(&self) -> &'static str {
        match self {
            MetricOp::Count => "count",
            MetricOp::Sum => "sum",
            MetricOp::Avg => "avg",
            MetricOp::Min => "min",
            MetricOp::Max => "max",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricSpec {
    #[serde(default)]
    pub alias: Option<String>,
    pub op: MetricOp,
    #[serde(default = "all_rows")]
    pub field: String,
}

impl MetricSpec {
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) if !alias.is_empty() => alias.clone(),
            _ if self.field == "*" => self.op.name().to_string(),
            _ => format!("{}_{}", self.op.name(), self.field.replace('.', "_")),
        }
    }
}

fn all_rows() -> String {
    "*".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ascending")]
    Asc,
    #[serde(alias = "descending")]
    Desc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderKey {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupByConfig {
    #[serde(default)]
    pub group_by: Vec<String>,
    pub metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub having: Option<Value>,
    #[serde(default)]
    pub order_by: Vec<OrderKey>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub pivot: Option<String>,
    #[serde(default)]
    pub rollup: bool,
}

struct Group<'a> {
    key: Vec<Value>,
    row: Value,
    members: Vec<&'a Value>,
}

fn step_error(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::StepExecutionFailure, message).with_code("PW-STEP-005")
}

/// Group `value` (an array of records) and compute one output row per group.
pub fn group_by(
    value: &Value,
    config: &GroupByConfig,
    engine: &ExpressionEngine,
) -> Result<Value, AppError> {
    let items = value.as_array().ok_or_else(|| {
        AppError::new(ErrorCategory::StepExecutionFailure, "group_by requires an array")
            .with_code("PW-STEP-004")
    })?;
    for metric in &config.metrics {
        if metric.field == "*" && metric.op != MetricOp::Count {
            return Err(step_error(format!(
                "metric '{}' uses '*' which is only valid for count",
                metric.output_name()
            )));
        }
    }
    if let Some(pivot) = &config.pivot {
        if !config.group_by.contains(pivot) {
            return Err(step_error(format!(
                "pivot field '{}' must be one of the groupBy fields",
                pivot
            )));
        }
    }

    let mut partitions: IndexMap<String, Group> = IndexMap::new();
    for item in items {
        let key: Vec<Value> = config
            .group_by
            .iter()
            .map(|field| path::get(item, field).cloned().unwrap_or(Value::Null))
            .collect();
        let fingerprint = serde_json::to_string(&key)?;
        partitions
            .entry(fingerprint)
            .or_insert_with(|| Group {
                key,
                row: Value::Null,
                members: Vec::new(),
            })
            .members
            .push(item);
    }

    let mut groups: Vec<Group> = partitions.into_values().collect();
    for group in &mut groups {
        let mut row = Value::Object(Map::new());
        for (field, key_value) in config.group_by.iter().zip(&group.key) {
            path::set(&mut row, field, key_value.clone());
        }
        for metric in &config.metrics {
            path::set(
                &mut row,
                &metric.output_name(),
                compute_metric(metric, &group.members),
            );
        }
        group.row = row;
    }

    if let Some(having) = &config.having {
        let condition = Condition::parse(having)?;
        let mut surviving = Vec::with_capacity(groups.len());
        for group in groups {
            if condition.matches(&group.row, engine)? {
                surviving.push(group);
            }
        }
        groups = surviving;
    }

    if !config.order_by.is_empty() {
        groups.sort_by(|a, b| compare_rows(&a.row, &b.row, &config.order_by));
    }
    if let Some(limit) = config.limit {
        groups.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }

    let rollup = config.rollup.then(|| {
        let members: Vec<&Value> = groups
            .iter()
            .flat_map(|group| group.members.iter().copied())
            .collect();
        let mut row = Value::Object(Map::new());
        path::set(&mut row, ROLLUP_FLAG, Value::Bool(true));
        for metric in &config.metrics {
            path::set(&mut row, &metric.output_name(), compute_metric(metric, &members));
        }
        row
    });

    let mut rows = match &config.pivot {
        Some(pivot) => pivot_rows(&groups, config, pivot),
        None => groups.into_iter().map(|group| group.row).collect(),
    };
    rows.extend(rollup);
    Ok(Value::Array(rows))
}

fn compare_rows(a: &Value, b: &Value, keys: &[OrderKey]) -> Ordering {
    for key in keys {
        let ordering = match (path::get(a, &key.field), path::get(b, &key.field)) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// One row per distinct pivot value; the remaining key fields prefix the metric columns.
fn pivot_rows(groups: &[Group], config: &GroupByConfig, pivot: &str) -> Vec<Value> {
    let pivot_index = config
        .group_by
        .iter()
        .position(|field| field == pivot)
        .unwrap_or(0);
    let mut pivoted: IndexMap<String, Value> = IndexMap::new();
    for group in groups {
        let pivot_value = group.key.get(pivot_index).cloned().unwrap_or(Value::Null);
        let rest: Vec<String> = group
            .key
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != pivot_index)
            .map(|(_, value)| path::stringify(Some(value)))
            .collect();
        let prefix = rest.join("_");
        let fingerprint = pivot_value.to_string();
        let row = pivoted.entry(fingerprint).or_insert_with(|| {
            let mut row = Map::new();
            row.insert(pivot.to_string(), pivot_value.clone());
            Value::Object(row)
        });
        if let Value::Object(columns) = row {
            for metric in &config.metrics {
                let name = metric.output_name();
                let column = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}_{}", prefix, name)
                };
                let cell = path::get(&group.row, &name).cloned().unwrap_or(Value::Null);
                columns.insert(column, cell);
            }
        }
    }
    pivoted.into_values().collect()
}

fn compute_metric(metric: &MetricSpec, members: &[&Value]) -> Value {
    if metric.op == MetricOp::Count {
        let count = if metric.field == "*" {
            members.len()
        } else {
            members
                .iter()
                .filter(|member| path::get(member, &metric.field).is_some_and(|v| !v.is_null()))
                .count()
        };
        return Value::from(count as u64);
    }

    let numbers: Vec<&Number> = members
        .iter()
        .filter_map(|member| match path::get(member, &metric.field) {
            Some(Value::Number(n)) => Some(n),
            _ => None,
        })
        .collect();
    if numbers.is_empty() {
        return Value::Null;
    }
    let all_integers = numbers.iter().all(|n| n.is_i64());
    let floats = numbers.iter().filter_map(|n| n.as_f64());

    match metric.op {
        MetricOp::Sum if all_integers => {
            let total = numbers
                .iter()
                .filter_map(|n| n.as_i64())
                .try_fold(0_i64, |acc, n| acc.checked_add(n));
            match total {
                Some(total) => Value::from(total),
                None => float_value(floats.sum()),
            }
        }
        MetricOp::Sum => float_value(floats.sum()),
        MetricOp::Avg => float_value(floats.sum::<f64>() / numbers.len() as f64),
        MetricOp::Min | MetricOp::Max => {
            let pick_max = metric.op == MetricOp::Max;
            let best = numbers.iter().copied().reduce(|best, candidate| {
                let ordering = candidate
                    .as_f64()
                    .partial_cmp(&best.as_f64())
                    .unwrap_or(Ordering::Equal);
                let better = if pick_max {
                    ordering == Ordering::Greater
                } else {
                    ordering == Ordering::Less
                };
                if better {
                    candidate
                } else {
                    best
                }
            });
            best.map(|n| Value::Number(n.clone())).unwrap_or(Value::Null)
        }
        MetricOp::Count => Value::Null,
    }
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
