#![allow(clippy::result_large_err)] // Workflow schema APIs return AppError to preserve structured validation context without boxing.

use crate::core::config::document;
use crate::core::error::AppError;
use crate::core::transform::step::{ErrorPolicy, OperationKind, PipelineStep};
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

fn default_method() -> String {
    "GET".to_string()
}

/// Root of a workflow definition: nodes, edges and optional settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    #[serde(default)]
    pub settings: WorkflowSettings,
}

/// Per-workflow overrides of the executor configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkflowSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkflowEdge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    End,
    Api,
    Graphql,
    Transform,
    Filter,
    Aggregate,
    Condition,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::Api => "api",
            NodeKind::Graphql => "graphql",
            NodeKind::Transform => "transform",
            NodeKind::Filter => "filter",
            NodeKind::Aggregate => "aggregate",
            NodeKind::Condition => "condition",
        }
    }

    /// Nodes of these kinds replace the execution context instead of adding a key to it.
    pub fn replaces_context(&self) -> bool {
        matches!(
            self,
            NodeKind::Transform | NodeKind::Filter | NodeKind::Aggregate | NodeKind::Condition
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EndConfig {
    /// Dotted path of the context returned as the run output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub query: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Response used when the invocation fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GraphqlConfig {
    pub endpoint: String,
    pub query: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TransformConfig {
    pub steps: Vec<PipelineStep>,
    /// Run over this context path instead of the whole context; the result is
    /// stored under the node id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Configuration of a filter, aggregate or condition node: one step without
/// the operation name, which the node kind supplies.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepNodeConfig {
    #[serde(default, alias = "target")]
    pub target_path: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<ErrorPolicy>,
}

impl StepNodeConfig {
    pub fn to_step(&self, operation: OperationKind) -> PipelineStep {
        PipelineStep {
            operation,
            target_path: Some(self.target_path.clone()),
            config: self.config.clone(),
            on_error: self.on_error,
            expected_type: None,
        }
    }
}

/// Strongly typed node configuration, one variant per [`NodeKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Start,
    End(EndConfig),
    Api(ApiConfig),
    Graphql(GraphqlConfig),
    Transform(TransformConfig),
    Filter(StepNodeConfig),
    Aggregate(StepNodeConfig),
    Condition(StepNodeConfig),
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Start => NodeKind::Start,
            NodeConfig::End(_) => NodeKind::End,
            NodeConfig::Api(_) => NodeKind::Api,
            NodeConfig::Graphql(_) => NodeKind::Graphql,
            NodeConfig::Transform(_) => NodeKind::Transform,
            NodeConfig::Filter(_) => NodeKind::Filter,
            NodeConfig::Aggregate(_) => NodeKind::Aggregate,
            NodeConfig::Condition(_) => NodeKind::Condition,
        }
    }

    fn parse(kind: NodeKind, data: Value) -> Result<Self, serde_json::Error> {
        let data = match data {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Ok(match kind {
            NodeKind::Start => NodeConfig::Start,
            NodeKind::End => NodeConfig::End(serde_json::from_value(data)?),
            NodeKind::Api => NodeConfig::Api(serde_json::from_value(data)?),
            NodeKind::Graphql => NodeConfig::Graphql(serde_json::from_value(data)?),
            NodeKind::Transform => NodeConfig::Transform(serde_json::from_value(data)?),
            NodeKind::Filter => NodeConfig::Filter(serde_json::from_value(data)?),
            NodeKind::Aggregate => NodeConfig::Aggregate(serde_json::from_value(data)?),
            NodeKind::Condition => NodeConfig::Condition(serde_json::from_value(data)?),
        })
    }

    fn to_data(&self) -> Result<Value, serde_json::Error> {
        match self {
            NodeConfig::Start => Ok(Value::Object(Map::new())),
            NodeConfig::End(config) => serde_json::to_value(config),
            NodeConfig::Api(config) => serde_json::to_value(config),
            NodeConfig::Graphql(config) => serde_json::to_value(config),
            NodeConfig::Transform(config) => serde_json::to_value(config),
            NodeConfig::Filter(config)
            | NodeConfig::Aggregate(config)
            | NodeConfig::Condition(config) => serde_json::to_value(config),
        }
    }
}

/// Serialized shape of a node: `{id, kind, data}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawNode {
    id: String,
    #[serde(alias = "type")]
    kind: NodeKind,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct WorkflowNode {
    pub id: String,
    pub config: NodeConfig,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            config,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }

    /// The single pipeline step run by filter, aggregate and condition nodes.
    pub fn step(&self) -> Option<PipelineStep> {
        match &self.config {
            NodeConfig::Filter(config) => Some(config.to_step(OperationKind::Filter)),
            NodeConfig::Aggregate(config) => Some(config.to_step(OperationKind::GroupBy)),
            NodeConfig::Condition(config) => Some(config.to_step(OperationKind::Condition)),
            _ => None,
        }
    }
}

impl TryFrom<RawNode> for WorkflowNode {
    type Error = String;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let config = NodeConfig::parse(raw.kind, raw.data)
            .map_err(|err| format!("node '{}' ({}): {}", raw.id, raw.kind, err))?;
        Ok(WorkflowNode { id: raw.id, config })
    }
}

impl From<WorkflowNode> for RawNode {
    fn from(node: WorkflowNode) -> Self {
        RawNode {
            kind: node.kind(),
            data: node.config.to_data().unwrap_or_default(),
            id: node.id,
        }
    }
}

impl WorkflowDefinition {
    /// Load and validate a workflow definition from a JSON or YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let definition: WorkflowDefinition = document::read_document(path).map_err(|err| {
            AppError::new(
                ErrorCategory::WorkflowDefinition,
                format!("failed to load workflow {}: {}", path.display(), err.message),
            )
            .with_code("PW-WF-006")
        })?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Per-node checks that do not need the graph structure.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.nodes.is_empty() {
            return Err(definition_error("workflow must define at least one node", "PW-WF-002"));
        }
        if self.settings.parallel_limit == Some(0) {
            return Err(definition_error("settings.parallel_limit must be >= 1", "PW-WF-006"));
        }
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(definition_error("node id must not be empty", "PW-WF-007"));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(definition_error(
                    format!("duplicate node id: {}", node.id),
                    "PW-WF-001",
                )
                .with_context("node", node.id.as_str()));
            }
            match &node.config {
                NodeConfig::Api(api) if api.url.trim().is_empty() => {
                    return Err(definition_error(
                        format!("api node '{}' has an empty url", node.id),
                        "PW-WF-006",
                    )
                    .with_context("node", node.id.as_str()));
                }
                NodeConfig::Graphql(graphql)
                    if graphql.endpoint.trim().is_empty() || graphql.query.trim().is_empty() =>
                {
                    return Err(definition_error(
                        format!("graphql node '{}' needs an endpoint and a query", node.id),
                        "PW-WF-006",
                    )
                    .with_context("node", node.id.as_str()));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

pub(crate) fn definition_error(message: impl Into<String>, code: &str) -> AppError {
    AppError::new(ErrorCategory::WorkflowDefinition, message).with_code(code)
}

pub fn load_workflow(path: &Path) -> Result<WorkflowDefinition, AppError> {
    WorkflowDefinition::load_from_file(path)
}
