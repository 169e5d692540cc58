use crate::core::transform::schema::ValueKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Operation performed by a pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationKind {
    Flatten,
    Unflatten,
    RenameFields,
    SelectFields,
    ComputeField,
    ArrayTake,
    Filter,
    PostLimit,
    GroupBy,
    Condition,
    /// Operation name not known to this build; handled by the step's error policy.
    Unknown(String),
}

impl OperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::Flatten => "flatten",
            OperationKind::Unflatten => "unflatten",
            OperationKind::RenameFields => "rename_fields",
            OperationKind::SelectFields => "select_fields",
            OperationKind::ComputeField => "compute_field",
            OperationKind::ArrayTake => "array_take",
            OperationKind::Filter => "filter",
            OperationKind::PostLimit => "post_limit",
            OperationKind::GroupBy => "group_by",
            OperationKind::Condition => "condition",
            OperationKind::Unknown(name) => name.as_str(),
        }
    }
}

impl From<String> for OperationKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "flatten" => OperationKind::Flatten,
            "unflatten" => OperationKind::Unflatten,
            "rename_fields" => OperationKind::RenameFields,
            "select_fields" => OperationKind::SelectFields,
            "compute_field" => OperationKind::ComputeField,
            "array_take" => OperationKind::ArrayTake,
            "filter" => OperationKind::Filter,
            "post_limit" => OperationKind::PostLimit,
            "group_by" | "aggregate" => OperationKind::GroupBy,
            "condition" => OperationKind::Condition,
            _ => OperationKind::Unknown(name),
        }
    }
}

impl From<&str> for OperationKind {
    fn from(name: &str) -> Self {
        OperationKind::from(name.to_string())
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a pipeline does when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Keep the pre-step document and proceed.
    #[default]
    Continue,
    /// Same runtime effect as `Continue`; logged at debug level.
    Skip,
    /// Abort the remaining pipeline.
    Stop,
}

/// One declarative transformation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    #[serde(alias = "op")]
    pub operation: OperationKind,
    /// `None` means the step never declared a target; `Some("")` is the whole document.
    #[serde(default, alias = "target", skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<ErrorPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<ValueKind>,
}

impl PipelineStep {
    pub fn new(operation: impl Into<OperationKind>, target_path: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            target_path: Some(target_path.into()),
            config: Map::new(),
            on_error: None,
            expected_type: None,
        }
    }

    /// Builder helper used by tests and node adapters.
    pub fn with_config(mut self, config: Value) -> Self {
        if let Value::Object(map) = config {
            self.config = map;
        }
        self
    }

    pub fn with_on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = Some(policy);
        self
    }

    pub fn with_expected_type(mut self, kind: ValueKind) -> Self {
        self.expected_type = Some(kind);
        self
    }

    /// Target path, treating an undeclared target as the whole document.
    pub fn target(&self) -> &str {
        self.target_path.as_deref().unwrap_or("")
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.on_error.unwrap_or_default()
    }

    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }
}

/// Nested branches of a `condition` step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(rename = "if", default)]
    pub guard: String,
    #[serde(rename = "then", default)]
    pub then_steps: Vec<PipelineStep>,
    #[serde(rename = "else", default)]
    pub else_steps: Vec<PipelineStep>,
    /// Let a `stop` failure inside a branch abort the enclosing pipeline.
    #[serde(default)]
    pub propagate: bool,
}

impl ConditionConfig {
    pub fn from_step(step: &PipelineStep) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(step.config.clone()))
    }
}
