use pipewright::core::config::DocumentFormat;
use pipewright::core::expression::ExpressionEngine;
use pipewright::core::transform::{PipelineStep, Schema, ValueKind};
use pipewright::core::types::ErrorCategory;
use pipewright::core::validation::{validate, ConfigValidator};
use serde_json::{json, Value};

fn weather_schema() -> Schema {
    serde_json::from_value(json!({
        "temperature": {"type": "number"},
        "isHot": {"type": "boolean"},
        "current": {"type": "object"},
        "current.humidity": {"type": "integer"},
        "location.name": {"type": "string"},
        "forecast.forecastday": {"type": "array"}
    }))
    .unwrap()
}

fn steps(value: Value) -> Vec<PipelineStep> {
    serde_json::from_value(value).unwrap()
}

#[test]
fn weather_pipeline_is_valid() {
    let engine = ExpressionEngine::default();
    let pipeline = steps(json!([
        {"op": "rename_fields", "target": "", "config": {"mappings": {"current.temp_c": "temperature"}}},
        {"op": "compute_field", "target": "", "config": {"field": "isHot", "expression": "temperature > 30"}},
        {"op": "array_take", "target": "forecast.forecastday", "config": {"count": 2}},
        {"op": "select_fields", "target": "", "config": {"fields": ["temperature", "isHot"]}}
    ]));
    assert!(validate(&pipeline, &weather_schema(), &engine).is_ok());
}

#[test]
fn expected_type_must_match_schema_kind() {
    let engine = ExpressionEngine::default();
    let schema = weather_schema();
    let validator = ConfigValidator::new(&schema, &engine);

    let mismatch = vec![PipelineStep::new("compute_field", "location.name")
        .with_config(json!({"field": "x", "expression": "1"}))
        .with_expected_type(ValueKind::Number)];
    let err = validator.validate(&mismatch).unwrap_err();
    assert_eq!(err.category, ErrorCategory::TypeMismatch);
    assert_eq!(err.offending(), Some("location.name"));

    let widened = vec![PipelineStep::new("compute_field", "current.humidity")
        .with_config(json!({"field": "x", "expression": "1"}))
        .with_expected_type(ValueKind::Number)];
    assert!(validator.validate(&widened).is_ok());
}

#[test]
fn omitted_target_is_missing_target() {
    let engine = ExpressionEngine::default();
    let pipeline = steps(json!([
        {"op": "array_take", "target": "forecast.forecastday", "config": {"count": 1}},
        {"op": "flatten", "config": {"depth": 1}}
    ]));
    let err = validate(&pipeline, &weather_schema(), &engine).unwrap_err();
    assert_eq!(err.category, ErrorCategory::MissingTarget);
    assert_eq!(err.context.get("step").map(String::as_str), Some("1"));
}

#[test]
fn unknown_target_path_is_rejected() {
    let engine = ExpressionEngine::default();
    let pipeline = steps(json!([
        {"op": "array_take", "target": "forecast.days", "config": {"count": 1}}
    ]));
    let err = validate(&pipeline, &weather_schema(), &engine).unwrap_err();
    assert_eq!(err.category, ErrorCategory::UnknownPath);
    assert_eq!(err.offending(), Some("forecast.days"));
}

#[test]
fn second_write_to_a_path_is_duplicate() {
    let engine = ExpressionEngine::default();
    let pipeline = steps(json!([
        {"op": "array_take", "target": "forecast.forecastday", "config": {"count": 3}},
        {"op": "filter", "target": "forecast.forecastday", "config": {"where": "item > 1"}}
    ]));
    let err = validate(&pipeline, &weather_schema(), &engine).unwrap_err();
    assert_eq!(err.category, ErrorCategory::DuplicateWrite);
    assert_eq!(err.offending(), Some("forecast.forecastday"));
}

#[test]
fn unresolvable_guard_fails_even_with_valid_branches() {
    let engine = ExpressionEngine::default();
    let pipeline = steps(json!([
        {"op": "condition", "target": "", "config": {
            "if": "foo.bar",
            "then": [{"op": "array_take", "target": "forecast.forecastday", "config": {"count": 1}}]
        }}
    ]));
    let err = validate(&pipeline, &weather_schema(), &engine).unwrap_err();
    assert_eq!(err.category, ErrorCategory::UnresolvedBinding);
    assert_eq!(err.offending(), Some("foo.bar"));
    assert_eq!(err.context.get("expression").map(String::as_str), Some("foo.bar"));
}

fn account_schema() -> Schema {
    serde_json::from_value(json!({
        "user": {"type": "object"},
        "user.active": {"type": "boolean"},
        "user.orders": {"type": "array"},
        "user.name": {"type": "string"},
        "orders": {"type": "array"}
    }))
    .unwrap()
}

#[test]
fn branch_targets_resolve_under_condition_target() {
    let engine = ExpressionEngine::default();
    let schema = account_schema();

    // The branch write lands on user.orders, which the first step already claimed.
    let twice = steps(json!([
        {"op": "array_take", "target": "user.orders", "config": {"count": 1}},
        {"op": "condition", "target": "user", "config": {
            "if": "active",
            "then": [{"op": "array_take", "target": "orders", "config": {"count": 3}}]
        }}
    ]));
    let err = validate(&twice, &schema, &engine).unwrap_err();
    assert_eq!(err.category, ErrorCategory::DuplicateWrite);
    assert_eq!(err.offending(), Some("user.orders"));
    assert_eq!(err.context.get("step").map(String::as_str), Some("1.then.0"));

    let unknown = steps(json!([
        {"op": "condition", "target": "user", "config": {
            "if": "active",
            "else": [{"op": "array_take", "target": "history", "config": {"count": 3}}]
        }}
    ]));
    let err = validate(&unknown, &schema, &engine).unwrap_err();
    assert_eq!(err.category, ErrorCategory::UnknownPath);
    assert_eq!(err.offending(), Some("user.history"));

    let mismatch = vec![PipelineStep::new("condition", "user").with_config(json!({
        "if": "active",
        "then": [{
            "op": "compute_field", "target": "name", "expectedType": "number",
            "config": {"field": "x", "expression": "1"}
        }]
    }))];
    let err = validate(&mismatch, &schema, &engine).unwrap_err();
    assert_eq!(err.category, ErrorCategory::TypeMismatch);
    assert_eq!(err.offending(), Some("user.name"));

    let disjoint = steps(json!([
        {"op": "array_take", "target": "orders", "config": {"count": 1}},
        {"op": "condition", "target": "user", "config": {
            "if": "active",
            "then": [{"op": "array_take", "target": "orders", "config": {"count": 3}}]
        }}
    ]));
    assert!(validate(&disjoint, &schema, &engine).is_ok());
}

#[test]
fn malformed_filter_expression_is_a_syntax_error() {
    let engine = ExpressionEngine::default();
    let pipeline = steps(json!([
        {"op": "filter", "target": "forecast.forecastday", "config": {"where": "item >"}}
    ]));
    let err = validate(&pipeline, &weather_schema(), &engine).unwrap_err();
    assert_eq!(err.category, ErrorCategory::InvalidExpressionSyntax);
    assert_eq!(err.offending(), Some("item >"));
    assert!(err.category.is_validation());
}

#[test]
fn malformed_having_clause_is_a_syntax_error() {
    let engine = ExpressionEngine::default();
    let pipeline = steps(json!([
        {"op": "group_by", "target": "forecast.forecastday", "config": {
            "groupBy": ["date"],
            "metrics": [{"alias": "n", "op": "count"}],
            "having": "n >= (1"
        }}
    ]));
    let err = validate(&pipeline, &weather_schema(), &engine).unwrap_err();
    assert_eq!(err.category, ErrorCategory::InvalidExpressionSyntax);
    assert_eq!(err.offending(), Some("n >= (1"));
}

#[test]
fn persist_and_export_only_accept_valid_pipelines() {
    let engine = ExpressionEngine::default();
    let schema = weather_schema();
    let validator = ConfigValidator::new(&schema, &engine);

    let valid = steps(json!([
        {"op": "array_take", "target": "forecast.forecastday", "config": {"count": 2}}
    ]));
    let persisted = validator.persist(&valid).unwrap();
    assert_eq!(persisted, valid);

    let json = validator.export(&valid, DocumentFormat::Json).unwrap();
    let reparsed: Vec<PipelineStep> = serde_json::from_str(&json).unwrap();
    assert_eq!(reparsed, valid);

    let invalid = steps(json!([{"op": "array_take", "config": {"count": 2}}]));
    assert_eq!(
        validator.persist(&invalid).unwrap_err().category,
        ErrorCategory::MissingTarget
    );
    assert!(validator.export(&invalid, DocumentFormat::Yaml).is_err());
}
