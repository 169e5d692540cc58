use assert_cmd::Command;
use insta::assert_snapshot;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;

const BIN: &str = "pipewright";

fn write_json(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn pipewright(workspace: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.arg("--workspace").arg(workspace.path());
    cmd.env_remove("RUST_LOG").env_remove("PIPEWRIGHT_LOG_LEVEL");
    cmd
}

fn weather_steps() -> Value {
    json!({"steps": [
        {"op": "rename_fields", "target": "", "config": {"mappings": {"current.temp_c": "temperature"}}},
        {"op": "compute_field", "target": "", "config": {"field": "isHot", "expression": "temperature > 30"}},
        {"op": "array_take", "target": "forecast.forecastday", "config": {"count": 2}},
        {"op": "select_fields", "target": "", "config": {"fields": ["temperature", "isHot", "forecast.forecastday"]}}
    ]})
}

fn weather_schema() -> Value {
    json!({
        "temperature": {"type": "number"},
        "isHot": {"type": "boolean"},
        "forecast.forecastday": {"type": "array"}
    })
}

#[test]
fn test_version_flag() {
    let output = Command::cargo_bin(BIN)
        .unwrap()
        .arg("--version")
        .output()
        .expect("should run successfully");
    assert_snapshot!(std::str::from_utf8(&output.stdout).unwrap().trim(), @"pipewright 0.3.0");
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("PIPELINE COMMANDS"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("transform"))
        .stdout(predicate::str::contains("graph"));
}

#[test]
fn test_run_command_help() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.arg("run").arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--responses"))
        .stdout(predicate::str::contains("pipewright run --workflow"));
}

#[test]
fn test_validate_accepts_valid_pipeline() {
    let dir = TempDir::new().unwrap();
    let steps = write_json(&dir, "steps.json", &weather_steps());
    let schema = write_json(&dir, "schema.json", &weather_schema());

    pipewright(&dir)
        .arg("validate")
        .arg("--steps")
        .arg(&steps)
        .arg("--schema")
        .arg(&schema)
        .assert()
        .success()
        .stdout(predicate::str::contains("4 steps valid against 3 schema paths"));
}

#[test]
fn test_validate_reports_unknown_path() {
    let dir = TempDir::new().unwrap();
    let steps = write_json(
        &dir,
        "steps.json",
        &json!([{"op": "array_take", "target": "forecast.days", "config": {"count": 1}}]),
    );
    let schema = write_json(&dir, "schema.json", &weather_schema());

    pipewright(&dir)
        .arg("validate")
        .arg("--steps")
        .arg(&steps)
        .arg("--schema")
        .arg(&schema)
        .assert()
        .failure()
        .stderr(predicate::str::contains("UnknownPath"))
        .stderr(predicate::str::contains("forecast.days"));
}

#[test]
fn test_transform_prints_result() {
    let dir = TempDir::new().unwrap();
    let steps = write_json(&dir, "steps.json", &weather_steps());
    let input = write_json(
        &dir,
        "weather.json",
        &json!({
            "current": {"temp_c": 35, "humidity": 50},
            "forecast": {"forecastday": [1, 2, 3]}
        }),
    );

    let output = pipewright(&dir)
        .arg("transform")
        .arg("--steps")
        .arg(&steps)
        .arg("--input")
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());
    let printed: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        printed,
        json!({"temperature": 35, "isHot": true, "forecast": {"forecastday": [1, 2]}})
    );
}

#[test]
fn test_transform_writes_yaml_output_file() {
    let dir = TempDir::new().unwrap();
    let steps = write_json(
        &dir,
        "steps.json",
        &json!([{"op": "array_take", "target": "items", "config": {"count": 1}}]),
    );
    let input = write_json(&dir, "input.json", &json!({"items": ["a", "b"]}));
    let out = dir.path().join("out.yaml");

    pipewright(&dir)
        .arg("transform")
        .arg("--steps")
        .arg(&steps)
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();
    let written: Value = serde_yaml::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written, json!({"items": ["a"]}));
}

#[test]
fn test_run_replays_recorded_responses() {
    let dir = TempDir::new().unwrap();
    let workflow = write_json(
        &dir,
        "flow.json",
        &json!({
            "nodes": [
                {"id": "start", "kind": "start"},
                {"id": "weather", "kind": "api", "data": {"url": "https://weather/{{ input.city }}"}},
                {"id": "shape", "kind": "transform", "data": {"source": "weather", "steps": [
                    {"op": "compute_field", "target": "", "config": {"field": "isHot", "expression": "temp > 30"}}
                ]}},
                {"id": "end", "kind": "end", "data": {"output": "shape"}}
            ],
            "edges": [
                {"source": "start", "target": "weather"},
                {"source": "weather", "target": "shape"},
                {"source": "shape", "target": "end"}
            ]
        }),
    );
    let input = write_json(&dir, "input.json", &json!({"city": "Seville"}));
    let responses = write_json(&dir, "responses.json", &json!({"weather": {"temp": 38}}));

    let output = pipewright(&dir)
        .arg("run")
        .arg("--workflow")
        .arg(&workflow)
        .arg("--input")
        .arg(&input)
        .arg("--responses")
        .arg(&responses)
        .arg("--events")
        .output()
        .unwrap();
    assert!(output.status.success());
    let printed: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(printed, json!({"temp": 38, "isHot": true}));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(r#""nodeId":"weather""#));
}

#[test]
fn test_run_fails_on_unrecorded_call() {
    let dir = TempDir::new().unwrap();
    let workflow = write_json(
        &dir,
        "flow.json",
        &json!({
            "nodes": [
                {"id": "start", "kind": "start"},
                {"id": "weather", "kind": "api", "data": {"url": "https://weather"}}
            ],
            "edges": [{"source": "start", "target": "weather"}]
        }),
    );

    pipewright(&dir)
        .arg("run")
        .arg("--workflow")
        .arg(&workflow)
        .assert()
        .failure()
        .stderr(predicate::str::contains("InvocationFailure"));
}

#[test]
fn test_export_yaml() {
    let dir = TempDir::new().unwrap();
    let steps = write_json(
        &dir,
        "steps.json",
        &json!([{"op": "array_take", "target": "forecast.forecastday", "config": {"count": 2}}]),
    );
    let schema = write_json(&dir, "schema.json", &weather_schema());

    let output = pipewright(&dir)
        .arg("export")
        .arg("--steps")
        .arg(&steps)
        .arg("--schema")
        .arg(&schema)
        .arg("--format")
        .arg("yaml")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_snapshot!(String::from_utf8_lossy(&output.stdout), @r"
    - operation: array_take
      targetPath: forecast.forecastday
      config:
        count: 2
    ");
}

#[test]
fn test_export_refuses_duplicate_writes() {
    let dir = TempDir::new().unwrap();
    let steps = write_json(
        &dir,
        "steps.json",
        &json!([
            {"op": "array_take", "target": "forecast.forecastday", "config": {"count": 2}},
            {"op": "array_take", "target": "forecast.forecastday", "config": {"count": 1}}
        ]),
    );
    let schema = write_json(&dir, "schema.json", &weather_schema());
    let out = dir.path().join("exported.json");

    pipewright(&dir)
        .arg("export")
        .arg("--steps")
        .arg(&steps)
        .arg("--schema")
        .arg(&schema)
        .arg("--output")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("DuplicateWrite"));
    assert!(!out.exists());
}

#[test]
fn test_graph_renders_dot() {
    let dir = TempDir::new().unwrap();
    let workflow = write_json(
        &dir,
        "flow.json",
        &json!({
            "nodes": [
                {"id": "start", "kind": "start"},
                {"id": "fetch", "kind": "api", "data": {"url": "https://x"}}
            ],
            "edges": [{"source": "start", "target": "fetch"}]
        }),
    );

    pipewright(&dir)
        .arg("graph")
        .arg("--workflow")
        .arg(&workflow)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph {"))
        .stdout(predicate::str::contains("->"));
}
