#![allow(clippy::result_large_err)] // Executor returns AppError to preserve full diagnostic context; boxing would discard run-time state.

use crate::core::error::AppError;
use crate::core::path;
use crate::core::transform::pipeline::PipelineRunner;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::graph::WorkflowGraph;
use crate::core::workflow_graph::invoker::{Invoker, ResolvedCall};
use crate::core::workflow_graph::schema::{
    EndConfig, NodeConfig, NodeKind, WorkflowDefinition, WorkflowNode,
};
use crate::core::workflow_graph::status::{NodeStatus, NodeStatusEvent, StatusSink};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub const DEFAULT_INPUT_KEY: &str = "input";
pub const DEFAULT_PARALLEL_LIMIT: usize = 4;

/// Resolved execution configuration used by the executor.
#[derive(Clone, Debug)]
pub struct ExecutorSettings {
    /// Maximum number of api/graphql nodes in flight at once.
    pub parallel_limit: usize,
    /// Context key holding the run input.
    pub input_key: String,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            parallel_limit: DEFAULT_PARALLEL_LIMIT,
            input_key: DEFAULT_INPUT_KEY.to_string(),
        }
    }
}

/// Cooperative cancellation shared between a caller and a running workflow.
/// Checked before every wave and before every context-replacing node.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Record describing one node execution.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRunRecord {
    pub node_id: String,
    pub kind: NodeKind,
    pub status: NodeStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub used_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a workflow run that was not aborted by a failure.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub execution_id: Uuid,
    /// SHA-256 of the definition snapshot the run executed.
    pub workflow_hash: String,
    pub status: RunStatus,
    pub context: Value,
    /// Final context, or the `end` node's projection of it. `null` when cancelled.
    pub output: Value,
    pub records: Vec<NodeRunRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn record(&self, node_id: &str) -> Option<&NodeRunRecord> {
        self.records.iter().find(|record| record.node_id == node_id)
    }
}

enum NodeEffect {
    None,
    /// Store the value under the node id.
    Store(Value),
    /// Replace the whole context.
    Replace(Value),
}

struct NodeOutcome {
    record: NodeRunRecord,
    result: Result<NodeEffect, AppError>,
}

/// Drives a workflow graph to completion over an accumulating context.
pub struct WorkflowExecutor {
    runner: PipelineRunner,
    settings: ExecutorSettings,
}

impl WorkflowExecutor {
    pub fn new(runner: PipelineRunner, settings: ExecutorSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub async fn run(
        &self,
        workflow: &WorkflowDefinition,
        input: Value,
        invoker: &dyn Invoker,
        sink: &dyn StatusSink,
    ) -> Result<WorkflowRun, AppError> {
        self.run_with_cancellation(workflow, input, invoker, sink, &CancellationFlag::new())
            .await
    }

    /// Execute `workflow` against `input`.
    ///
    /// Nodes run in waves derived from the edges. Api, graphql, start and end
    /// nodes of a wave run concurrently against the same context snapshot and
    /// their results are merged once the whole wave finished. Transform,
    /// filter, aggregate and condition nodes replace the context and run one
    /// at a time after the wave's invocations. A failing node aborts the run;
    /// the returned error carries the partial context as its document.
    pub async fn run_with_cancellation(
        &self,
        workflow: &WorkflowDefinition,
        input: Value,
        invoker: &dyn Invoker,
        sink: &dyn StatusSink,
        cancel: &CancellationFlag,
    ) -> Result<WorkflowRun, AppError> {
        let definition = workflow.clone();
        let input_key = definition
            .settings
            .input_key
            .clone()
            .unwrap_or_else(|| self.settings.input_key.clone());
        let parallel_limit = definition
            .settings
            .parallel_limit
            .unwrap_or(self.settings.parallel_limit)
            .max(1);
        let graph = WorkflowGraph::build(&definition, &input_key)?;
        let workflow_hash = fingerprint(&definition)?;
        let nodes: HashMap<&str, &WorkflowNode> = definition
            .nodes
            .iter()
            .map(|node| (node.id.as_str(), node))
            .collect();

        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            %execution_id,
            nodes = definition.nodes.len(),
            unreachable = graph.unreachable().len(),
            "starting workflow run"
        );

        let mut context = Value::Object(Map::new());
        path::set(&mut context, &input_key, input);
        let mut records = Vec::new();

        let cancelled = |context: Value, records: Vec<NodeRunRecord>| {
            tracing::warn!(%execution_id, "workflow run cancelled");
            WorkflowRun {
                execution_id,
                workflow_hash: workflow_hash.clone(),
                status: RunStatus::Cancelled,
                context,
                output: Value::Null,
                records,
                started_at,
                completed_at: Utc::now(),
            }
        };

        for (wave_index, wave) in graph.waves().into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(cancelled(context, records));
            }
            let (exclusive, concurrent): (Vec<&WorkflowNode>, Vec<&WorkflowNode>) = wave
                .iter()
                .filter_map(|id| nodes.get(id.as_str()).copied())
                .partition(|node| node.kind().replaces_context());
            tracing::debug!(
                wave = wave_index,
                concurrent = concurrent.len(),
                exclusive = exclusive.len(),
                "dispatching wave"
            );

            if !concurrent.is_empty() {
                let snapshot = context.clone();
                let outcomes: Vec<NodeOutcome> = stream::iter(
                    concurrent
                        .iter()
                        .map(|node| self.run_node(node, &snapshot, invoker, sink)),
                )
                .buffered(parallel_limit)
                .collect()
                .await;

                let mut failure = None;
                for outcome in outcomes {
                    let node_id = outcome.record.node_id.clone();
                    records.push(outcome.record);
                    match outcome.result {
                        Ok(effect) => apply_effect(&mut context, &node_id, effect)?,
                        Err(err) => {
                            failure.get_or_insert(err);
                        }
                    }
                }
                if let Some(err) = failure {
                    return Err(err.with_document(context));
                }
            }

            for node in exclusive {
                if cancel.is_cancelled() {
                    return Ok(cancelled(context, records));
                }
                let outcome = self.run_node(node, &context, invoker, sink).await;
                records.push(outcome.record);
                match outcome.result {
                    Ok(effect) => apply_effect(&mut context, &node.id, effect)?,
                    Err(err) => return Err(err.with_document(context)),
                }
            }
        }

        let output = project_output(&definition, &graph, &context);
        tracing::info!(%execution_id, nodes_run = records.len(), "workflow run completed");
        Ok(WorkflowRun {
            execution_id,
            workflow_hash,
            status: RunStatus::Completed,
            context,
            output,
            records,
            started_at,
            completed_at: Utc::now(),
        })
    }

    async fn run_node(
        &self,
        node: &WorkflowNode,
        context: &Value,
        invoker: &dyn Invoker,
        sink: &dyn StatusSink,
    ) -> NodeOutcome {
        let span = tracing::info_span!("node", id = %node.id, kind = %node.kind());
        async {
            sink.emit(NodeStatusEvent::new(node.id.as_str(), NodeStatus::Running));
            let started_at = Utc::now();
            let clock = Instant::now();

            let mut used_fallback = false;
            let result = self
                .execute_node(node, context, invoker, &mut used_fallback)
                .await
                .map_err(|err| {
                    if err.context.contains_key("node") {
                        err
                    } else {
                        err.with_context("node", node.id.as_str())
                    }
                });

            let (status, error) = match &result {
                Ok(_) => {
                    sink.emit(NodeStatusEvent::new(node.id.as_str(), NodeStatus::Success));
                    tracing::debug!(used_fallback, "node succeeded");
                    (NodeStatus::Success, None)
                }
                Err(err) => {
                    sink.emit(NodeStatusEvent::failed(node.id.as_str(), err.to_string()));
                    tracing::error!(error = %err, "node failed");
                    (NodeStatus::Error, Some(err.to_string()))
                }
            };

            NodeOutcome {
                record: NodeRunRecord {
                    node_id: node.id.clone(),
                    kind: node.kind(),
                    status,
                    started_at,
                    completed_at: Utc::now(),
                    duration_ms: clock.elapsed().as_millis() as u64,
                    used_fallback,
                    error,
                },
                result,
            }
        }
        .instrument(span)
        .await
    }

    async fn execute_node(
        &self,
        node: &WorkflowNode,
        context: &Value,
        invoker: &dyn Invoker,
        used_fallback: &mut bool,
    ) -> Result<NodeEffect, AppError> {
        match &node.config {
            NodeConfig::Start | NodeConfig::End(_) => Ok(NodeEffect::None),
            NodeConfig::Api(_) | NodeConfig::Graphql(_) => {
                let (call, fallback) = resolve_call(&node.config, context)?;
                match invoker.invoke(node, call).await {
                    Ok(value) => Ok(NodeEffect::Store(value)),
                    Err(err) => match fallback {
                        Some(fallback) => {
                            tracing::warn!(error = %err, "invocation failed, using fallback");
                            *used_fallback = true;
                            Ok(NodeEffect::Store(fallback.clone()))
                        }
                        None => Err(AppError::new(
                            ErrorCategory::InvocationFailure,
                            format!("node '{}' invocation failed: {}", node.id, err),
                        )
                        .caused_by(err)),
                    },
                }
            }
            NodeConfig::Transform(transform) => match &transform.source {
                Some(source) => {
                    let slice = path::get(context, source).cloned().unwrap_or(Value::Null);
                    let result = self.runner.run(&slice, &transform.steps)?;
                    Ok(NodeEffect::Store(result))
                }
                None => {
                    let result = self.runner.run(context, &transform.steps)?;
                    Ok(NodeEffect::Replace(result))
                }
            },
            NodeConfig::Filter(_) | NodeConfig::Aggregate(_) | NodeConfig::Condition(_) => {
                let steps: Vec<_> = node.step().into_iter().collect();
                let result = self.runner.run(context, &steps)?;
                Ok(NodeEffect::Replace(result))
            }
        }
    }
}

fn apply_effect(context: &mut Value, node_id: &str, effect: NodeEffect) -> Result<(), AppError> {
    match effect {
        NodeEffect::None => Ok(()),
        NodeEffect::Store(value) => {
            if let Value::Object(map) = context {
                map.insert(node_id.to_string(), value);
            }
            Ok(())
        }
        NodeEffect::Replace(value) if value.is_object() => {
            *context = value;
            Ok(())
        }
        NodeEffect::Replace(_) => Err(AppError::new(
            ErrorCategory::StepExecutionFailure,
            format!("node '{}' must leave the execution context an object", node_id),
        )
        .with_code("PW-STEP-009")
        .with_context("node", node_id)
        .with_document(context.clone())),
    }
}

/// Substitute `{{ path }}` templates of an api/graphql node against `context`.
fn resolve_call<'a>(
    config: &'a NodeConfig,
    context: &Value,
) -> Result<(ResolvedCall, Option<&'a Value>), AppError> {
    let substitute_map = |map: &Map<String, Value>| -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| (key.clone(), path::substitute(value, context)))
            .collect()
    };
    match config {
        NodeConfig::Api(api) => Ok((
            ResolvedCall::Api {
                method: path::substitute_str(&api.method, context).to_uppercase(),
                url: path::substitute_str(&api.url, context),
                headers: substitute_map(&api.headers),
                query: substitute_map(&api.query),
                body: api.body.as_ref().map(|body| path::substitute(body, context)),
            },
            api.fallback.as_ref(),
        )),
        NodeConfig::Graphql(graphql) => Ok((
            ResolvedCall::Graphql {
                endpoint: path::substitute_str(&graphql.endpoint, context),
                query: graphql.query.clone(),
                variables: substitute_map(&graphql.variables),
                headers: substitute_map(&graphql.headers),
            },
            graphql.fallback.as_ref(),
        )),
        other => Err(AppError::new(
            ErrorCategory::InternalError,
            format!("{} node has no external call", other.kind()),
        )),
    }
}

fn project_output(definition: &WorkflowDefinition, graph: &WorkflowGraph, context: &Value) -> Value {
    let projection = definition
        .nodes
        .iter()
        .filter(|node| graph.is_reachable(&node.id))
        .find_map(|node| match &node.config {
            NodeConfig::End(EndConfig {
                output: Some(output),
            }) => Some(output.as_str()),
            _ => None,
        });
    match projection {
        Some(output) => path::get(context, output).cloned().unwrap_or(Value::Null),
        None => context.clone(),
    }
}

fn fingerprint(definition: &WorkflowDefinition) -> Result<String, AppError> {
    let bytes = serde_json::to_vec(definition)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
