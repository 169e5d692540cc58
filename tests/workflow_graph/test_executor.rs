use async_trait::async_trait;
use pipewright::core::expression::ExpressionEngine;
use pipewright::core::transform::{PipelineRunner, TransformRegistry};
use pipewright::core::types::ErrorCategory;
use pipewright::core::workflow_graph::{
    CancellationFlag, ExecutorSettings, InvokeError, Invoker, NodeStatus, NodeStatusEvent,
    NullSink, RecordedInvoker, ResolvedCall, RunStatus, WorkflowDefinition, WorkflowExecutor,
    WorkflowNode,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn executor(settings: ExecutorSettings) -> WorkflowExecutor {
    WorkflowExecutor::new(
        PipelineRunner::new(
            Arc::new(TransformRegistry::builtin()),
            Arc::new(ExpressionEngine::default()),
        ),
        settings,
    )
}

fn definition(value: Value) -> WorkflowDefinition {
    serde_json::from_value(value).expect("workflow should deserialize")
}

/// Answers every call with the node id after a short delay and tracks how
/// many calls overlap.
#[derive(Default)]
struct SlowInvoker {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Invoker for SlowInvoker {
    async fn invoke(&self, node: &WorkflowNode, _call: ResolvedCall) -> Result<Value, InvokeError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({"from": node.id}))
    }
}

fn fan_out(width: usize) -> WorkflowDefinition {
    let mut nodes = vec![json!({"id": "start", "kind": "start"})];
    let mut edges = Vec::new();
    for i in 0..width {
        let id = format!("call_{}", i);
        nodes.push(json!({"id": id, "kind": "api", "data": {"url": format!("https://svc/{}", i)}}));
        edges.push(json!({"source": "start", "target": id}));
    }
    definition(json!({"nodes": nodes, "edges": edges}))
}

#[tokio::test]
async fn diamond_merge_runs_after_both_branches() {
    let workflow = definition(json!({
        "nodes": [
            {"id": "start", "kind": "start"},
            {"id": "left", "kind": "api", "data": {"url": "https://left"}},
            {"id": "right", "kind": "api", "data": {"url": "https://right"}},
            {"id": "merge", "kind": "transform", "data": {"steps": [
                {"op": "compute_field", "target": "", "config": {"field": "total", "expression": "left.n + right.n"}}
            ]}},
            {"id": "end", "kind": "end", "data": {"output": "total"}}
        ],
        "edges": [
            {"source": "start", "target": "left"},
            {"source": "start", "target": "right"},
            {"source": "left", "target": "merge"},
            {"source": "right", "target": "merge"},
            {"source": "merge", "target": "end"}
        ]
    }));
    let invoker = RecordedInvoker::new()
        .with_response("left", json!({"n": 2}))
        .with_response("right", json!({"n": 5}));
    let events = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&events);
    let sink = move |event: NodeStatusEvent| {
        captured.lock().unwrap().push((event.node_id, event.status));
    };

    let run = executor(ExecutorSettings::default())
        .run(&workflow, json!({}), &invoker, &sink)
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.output, json!(7));

    let events = events.lock().unwrap();
    let position = |id: &str, status: NodeStatus| {
        events
            .iter()
            .position(|(node, s)| node == id && *s == status)
            .unwrap()
    };
    let merge_started = position("merge", NodeStatus::Running);
    assert!(position("left", NodeStatus::Success) < merge_started);
    assert!(position("right", NodeStatus::Success) < merge_started);
    assert!(position("merge", NodeStatus::Success) < position("end", NodeStatus::Running));
}

#[tokio::test]
async fn parallel_limit_caps_concurrent_invocations() {
    let invoker = SlowInvoker::default();
    let settings = ExecutorSettings {
        parallel_limit: 2,
        ..ExecutorSettings::default()
    };
    let run = executor(settings)
        .run(&fan_out(5), json!({}), &invoker, &NullSink)
        .await
        .unwrap();
    assert_eq!(invoker.peak.load(Ordering::SeqCst), 2);
    for i in 0..5 {
        let id = format!("call_{}", i);
        assert_eq!(run.context[&id], json!({"from": id}));
    }
}

#[tokio::test]
async fn workflow_settings_override_executor_defaults() {
    let mut workflow = fan_out(3);
    workflow.settings.parallel_limit = Some(1);
    workflow.settings.input_key = Some("request".to_string());
    let invoker = SlowInvoker::default();

    let run = executor(ExecutorSettings::default())
        .run(&workflow, json!({"q": "x"}), &invoker, &NullSink)
        .await
        .unwrap();
    assert_eq!(invoker.peak.load(Ordering::SeqCst), 1);
    assert_eq!(run.context["request"], json!({"q": "x"}));
    assert!(run.context.get("input").is_none());
}

#[tokio::test]
async fn cancellation_stops_before_the_next_wave() {
    let workflow = definition(json!({
        "nodes": [
            {"id": "start", "kind": "start"},
            {"id": "first", "kind": "api", "data": {"url": "https://first"}},
            {"id": "second", "kind": "api", "data": {"url": "https://second"}}
        ],
        "edges": [
            {"source": "start", "target": "first"},
            {"source": "first", "target": "second"}
        ]
    }));
    let invoker = RecordedInvoker::new()
        .with_response("first", json!(1))
        .with_response("second", json!(2));
    let cancel = CancellationFlag::new();
    let trigger = cancel.clone();
    let sink = move |event: NodeStatusEvent| {
        if event.node_id == "first" && event.status == NodeStatus::Success {
            trigger.cancel();
        }
    };

    let run = executor(ExecutorSettings::default())
        .run_with_cancellation(&workflow, json!({}), &invoker, &sink, &cancel)
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.context, json!({"input": {}, "first": 1}));
    assert!(run.record("second").is_none());
    assert_eq!(invoker.calls().len(), 1);
}

#[tokio::test]
async fn sourced_transform_stores_result_under_node_id() {
    let workflow = definition(json!({
        "nodes": [
            {"id": "start", "kind": "start"},
            {"id": "weather", "kind": "api", "data": {"url": "https://weather"}},
            {"id": "shaped", "kind": "transform", "data": {
                "source": "weather",
                "steps": [{"op": "array_take", "target": "days", "config": {"count": 2}}]
            }},
            {"id": "end", "kind": "end", "data": {"output": "shaped"}}
        ],
        "edges": [
            {"source": "start", "target": "weather"},
            {"source": "weather", "target": "shaped"},
            {"source": "shaped", "target": "end"}
        ]
    }));
    let invoker = RecordedInvoker::new().with_response("weather", json!({"days": [1, 2, 3]}));
    let run = executor(ExecutorSettings::default())
        .run(&workflow, json!({}), &invoker, &NullSink)
        .await
        .unwrap();
    assert_eq!(run.output, json!({"days": [1, 2]}));
    assert_eq!(run.context["weather"], json!({"days": [1, 2, 3]}));
}

#[tokio::test]
async fn filter_and_condition_nodes_rewrite_the_context() {
    let workflow = definition(json!({
        "nodes": [
            {"id": "start", "kind": "start"},
            {"id": "orders", "kind": "api", "data": {"url": "https://orders"}},
            {"id": "paid", "kind": "filter", "data": {
                "target": "orders", "config": {"where": {"path": "paid", "op": "eq", "value": true}}
            }},
            {"id": "vip", "kind": "condition", "data": {"target": "", "config": {
                "if": "input.vip",
                "then": [{"op": "compute_field", "target": "", "config": {"field": "discount", "expression": "10"}}],
                "else": [{"op": "compute_field", "target": "", "config": {"field": "discount", "expression": "0"}}]
            }}}
        ],
        "edges": [
            {"source": "start", "target": "orders"},
            {"source": "orders", "target": "paid"},
            {"source": "paid", "target": "vip"}
        ]
    }));
    let invoker = RecordedInvoker::new().with_response(
        "orders",
        json!([{"id": 1, "paid": true}, {"id": 2, "paid": false}]),
    );

    let run = executor(ExecutorSettings::default())
        .run(&workflow, json!({"vip": true}), &invoker, &NullSink)
        .await
        .unwrap();
    assert_eq!(
        run.output,
        json!({
            "input": {"vip": true},
            "orders": [{"id": 1, "paid": true}],
            "discount": 10
        })
    );
}

#[tokio::test]
async fn failing_transform_aborts_with_node_context() {
    let workflow = definition(json!({
        "nodes": [
            {"id": "start", "kind": "start"},
            {"id": "shape", "kind": "transform", "data": {"steps": [
                {"op": "array_take", "target": "input", "config": {"count": 1}, "onError": "stop"}
            ]}}
        ],
        "edges": [{"source": "start", "target": "shape"}]
    }));
    let events = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&events);
    let sink = move |event: NodeStatusEvent| captured.lock().unwrap().push(event);

    let err = executor(ExecutorSettings::default())
        .run(&workflow, json!({"a": 1}), &RecordedInvoker::new(), &sink)
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::StepExecutionFailure);
    assert_eq!(err.context.get("node").map(String::as_str), Some("shape"));
    assert_eq!(err.document.as_deref(), Some(&json!({"input": {"a": 1}})));

    let events = events.lock().unwrap();
    let shape: Vec<NodeStatus> = events
        .iter()
        .filter(|event| event.node_id == "shape")
        .map(|event| event.status)
        .collect();
    assert_eq!(shape, vec![NodeStatus::Running, NodeStatus::Error]);
    assert!(events.last().unwrap().error.is_some());
}

#[tokio::test]
async fn unrecorded_node_without_fallback_is_an_invocation_failure() {
    let err = executor(ExecutorSettings::default())
        .run(&fan_out(1), json!({}), &RecordedInvoker::new(), &NullSink)
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::InvocationFailure);
    assert_eq!(err.context.get("node").map(String::as_str), Some("call_0"));
}

#[tokio::test]
async fn definition_errors_surface_before_any_node_runs() {
    let workflow = definition(json!({
        "nodes": [
            {"id": "start", "kind": "start"},
            {"id": "input", "kind": "api", "data": {"url": "https://x"}}
        ],
        "edges": [{"source": "start", "target": "input"}]
    }));
    let invoker = RecordedInvoker::new();
    let err = executor(ExecutorSettings::default())
        .run(&workflow, json!({}), &invoker, &NullSink)
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::WorkflowDefinition);
    assert_eq!(err.code, "PW-WF-004");
    assert!(invoker.calls().is_empty());
}
