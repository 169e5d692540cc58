use pipewright::core::error::AppError;
use pipewright::core::expression::ExpressionEngine;
use pipewright::core::transform::{PipelineStep, StepInterpreter, TransformRegistry};
use pipewright::core::types::ErrorCategory;
use serde_json::{json, Value};
use std::sync::Arc;

fn interpreter() -> StepInterpreter {
    StepInterpreter::new(
        Arc::new(TransformRegistry::builtin()),
        Arc::new(ExpressionEngine::default()),
    )
}

fn step(value: Value) -> PipelineStep {
    serde_json::from_value(value).expect("step should deserialize")
}

fn apply(document: &Value, value: Value) -> Result<Value, AppError> {
    interpreter().apply(document, &step(value))
}

#[test]
fn flatten_then_unflatten_recovers_document() {
    let documents = [
        json!({"a": {"b": 1, "c": [1, {"d": 2}]}, "e": "x"}),
        json!({"user": {"profile": {"name": "Ada", "langs": ["en", "fr"]}, "age": 36}}),
        json!({"flat": true, "n": null}),
    ];
    for delimiter in ["/", "__", "."] {
        for doc in &documents {
            let flat = apply(
                doc,
                json!({"op": "flatten", "target": "", "config": {"delimiter": delimiter, "preserveArrays": true}}),
            )
            .unwrap();
            let restored = apply(
                &flat,
                json!({"op": "unflatten", "target": "", "config": {"delimiter": delimiter, "overwrite": true}}),
            )
            .unwrap();
            assert_eq!(&restored, doc, "delimiter {:?}", delimiter);
        }
    }
}

#[test]
fn flatten_expands_arrays_and_honours_depth() {
    let doc = json!({"a": {"b": {"c": 1}}, "list": [10, 20]});
    let flat = apply(&doc, json!({"op": "flatten", "target": "", "config": {"delimiter": "."}})).unwrap();
    assert_eq!(flat, json!({"a.b.c": 1, "list.0": 10, "list.1": 20}));

    let shallow = apply(&doc, json!({"op": "flatten", "target": "", "config": {"depth": 1}})).unwrap();
    assert_eq!(shallow, json!({"a.b": {"c": 1}, "list.0": 10, "list.1": 20}));

    let deeper = apply(&doc, json!({"op": "flatten", "target": "", "config": {"depth": 2}})).unwrap();
    assert_eq!(deeper, flat);
}

#[test]
fn unflatten_skips_conflicts_unless_overwriting() {
    let doc = json!({"a": 1, "a.b": 2, "c.d": 3});
    let kept = apply(&doc, json!({"op": "unflatten", "target": "", "config": {"delimiter": "."}})).unwrap();
    assert_eq!(kept, json!({"a": 1, "c": {"d": 3}}));

    let replaced = apply(
        &doc,
        json!({"op": "unflatten", "target": "", "config": {"delimiter": ".", "overwrite": true}}),
    )
    .unwrap();
    assert_eq!(replaced, json!({"a": {"b": 2}, "c": {"d": 3}}));
}

#[test]
fn filter_keep_and_drop_partition_the_array() {
    let rows = json!({"rows": [
        {"id": 1, "price": 5},
        {"id": 2, "price": 12},
        {"id": 3, "price": 30},
        {"id": 4, "price": 10},
        {"id": 5, "price": 0}
    ]});
    let clauses = [
        json!("price > 10"),
        json!({"path": "price", "op": "lte", "value": 10}),
        json!({"or": [{"path": "id", "op": "eq", "value": 1}, {"path": "price", "op": "exists"}]}),
    ];
    for clause in clauses {
        let kept = apply(&rows, json!({"op": "filter", "target": "rows", "config": {"mode": "keep", "where": clause}})).unwrap();
        let dropped = apply(&rows, json!({"op": "filter", "target": "rows", "config": {"mode": "drop", "where": clause}})).unwrap();
        let kept = kept["rows"].as_array().unwrap().clone();
        let dropped = dropped["rows"].as_array().unwrap().clone();

        assert!(kept.iter().all(|row| !dropped.contains(row)), "overlap for {}", clause);
        let mut ids: Vec<i64> = kept
            .iter()
            .chain(dropped.iter())
            .map(|row| row["id"].as_i64().unwrap())
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3, 4, 5], "lost rows for {}", clause);
    }
}

#[test]
fn filter_tolerates_records_without_the_field() {
    let rows = json!({"rows": [
        {"id": 1, "amount": 50},
        {"id": 2},
        {"id": 3, "amount": 5},
        {"id": 4, "note": "no amount"}
    ]});

    let kept = apply(&rows, json!({"op": "filter", "target": "rows", "config": {"mode": "keep", "where": "amount > 10"}})).unwrap();
    assert_eq!(kept, json!({"rows": [{"id": 1, "amount": 50}]}));

    let dropped = apply(
        &rows,
        json!({"op": "filter", "target": "rows", "config": {"mode": "drop", "where": "amount > 10"}}),
    )
    .unwrap();
    assert_eq!(dropped["rows"].as_array().unwrap().len(), 3);

    let scored = json!({"rows": [{"meta": {"score": 5}}, {"meta": {}}]});
    let nested = apply(&scored, json!({"op": "filter", "target": "rows", "config": {"mode": "keep", "where": "meta.score > 1"}})).unwrap();
    assert_eq!(nested, json!({"rows": [{"meta": {"score": 5}}]}));
}

#[test]
fn rename_moves_values_across_the_document() {
    let doc = json!({"current": {"temp_c": 35}, "meta": {"id": "x"}});
    let renamed = apply(
        &doc,
        json!({"op": "rename_fields", "target": "", "config": {"mappings": {"current.temp_c": "temperature", "meta.id": "id"}}}),
    )
    .unwrap();
    assert_eq!(renamed, json!({"current": {}, "meta": {}, "temperature": 35, "id": "x"}));
}

#[test]
fn select_fields_keeps_only_listed_paths() {
    let doc = json!({"a": {"b": 1, "c": 2}, "d": 3, "e": [1]});
    let selected = apply(&doc, json!({"op": "select_fields", "target": "", "config": {"fields": ["d", "a.c", "missing"]}})).unwrap();
    assert_eq!(selected, json!({"a": {"c": 2}, "d": 3}));
}

#[test]
fn compute_field_evaluates_against_target_object() {
    let doc = json!({"order": {"qty": 3, "price": 2.5}});
    let computed = apply(
        &doc,
        json!({"op": "compute_field", "target": "order", "config": {"field": "total", "expression": "qty * price"}}),
    )
    .unwrap();
    assert_eq!(computed, json!({"order": {"qty": 3, "price": 2.5, "total": 7.5}}));
}

#[test]
fn compute_field_refuses_scalar_targets() {
    let doc = json!({"order": {"qty": 3}, "label": "x"});
    let err = apply(
        &doc,
        json!({"op": "compute_field", "target": "label", "config": {"field": "len", "expression": "1"}}),
    )
    .unwrap_err();
    assert_eq!(err.category, ErrorCategory::StepExecutionFailure);
    assert_eq!(err.code, "PW-STEP-004");
    assert_eq!(err.offending(), Some("label"));
}

#[test]
fn array_take_requires_an_array_target() {
    let doc = json!({"items": [1, 2, 3], "name": "x"});
    let taken = apply(&doc, json!({"op": "array_take", "target": "items", "config": {"count": 2}})).unwrap();
    assert_eq!(taken["items"], json!([1, 2]));

    let err = apply(&doc, json!({"op": "array_take", "target": "name", "config": {"count": 2}})).unwrap_err();
    assert_eq!(err.category, ErrorCategory::StepExecutionFailure);
    assert_eq!(err.code, "PW-STEP-004");
    assert_eq!(err.offending(), Some("name"));
}

#[test]
fn missing_target_fails_unless_path_creation_allowed() {
    let doc = json!({"a": 1});
    let err = apply(&doc, json!({"op": "flatten", "target": "nested", "config": {"depth": 1}})).unwrap_err();
    assert_eq!(err.code, "PW-STEP-008");

    let created = apply(
        &doc,
        json!({"op": "compute_field", "target": "stats", "config": {"field": "one", "expression": "1"}}),
    )
    .unwrap();
    assert_eq!(created, json!({"a": 1, "stats": {"one": 1}}));
}

#[test]
fn unknown_operation_is_a_step_failure() {
    let err = apply(&json!({}), json!({"op": "explode", "target": "", "config": {"x": 1}})).unwrap_err();
    assert_eq!(err.code, "PW-STEP-006");
    assert_eq!(err.context.get("operation").map(String::as_str), Some("explode"));
}

#[test]
fn post_limit_only_follows_a_filter() {
    let err = apply(&json!({"rows": [1]}), json!({"op": "post_limit", "target": "rows", "config": {"limit": 1}})).unwrap_err();
    assert_eq!(err.code, "PW-STEP-007");
}

#[test]
fn condition_routes_to_then_or_else() {
    let branchy = json!({"op": "condition", "target": "", "config": {
        "if": "user.active",
        "then": [{"op": "compute_field", "target": "", "config": {"field": "status", "expression": "\"on\""}}],
        "else": [{"op": "compute_field", "target": "", "config": {"field": "status", "expression": "\"off\""}}]
    }});
    let on = apply(&json!({"user": {"active": true}}), branchy.clone()).unwrap();
    assert_eq!(on["status"], json!("on"));
    let off = apply(&json!({"user": {"active": false}}), branchy).unwrap();
    assert_eq!(off["status"], json!("off"));

    let by_expression = apply(
        &json!({"score": 71}),
        json!({"op": "condition", "target": "", "config": {
            "if": "score >= 70",
            "then": [{"op": "compute_field", "target": "", "config": {"field": "pass", "expression": "true"}}]
        }}),
    )
    .unwrap();
    assert_eq!(by_expression, json!({"score": 71, "pass": true}));
}
