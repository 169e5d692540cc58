use crate::core::transform::schema::ValueKind;
use crate::core::transform::step::{ConditionConfig, ErrorPolicy, OperationKind, PipelineStep};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Catalog entry describing one step operation.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub operation: OperationKind,
    pub label: &'static str,
    pub expected_value_kind: ValueKind,
    /// Whether the step may write a target path that does not exist yet.
    pub allow_path_creation: bool,
    pub default_config: Value,
    pub default_on_error: ErrorPolicy,
    pub required_config_keys: &'static [&'static str],
}

/// Immutable catalog of the step operations known to the interpreter.
///
/// `post_limit` and `condition` are executable but carry no catalog entry.
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    entries: HashMap<OperationKind, RegistryEntry>,
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TransformRegistry {
    /// Registry populated with the built-in operations.
    pub fn builtin() -> Self {
        let entries = [
            entry(
                OperationKind::Flatten,
                "Flatten",
                ValueKind::Object,
                false,
                json!({"delimiter": ".", "depth": 0, "preserveArrays": false}),
                &[],
            ),
            entry(
                OperationKind::Unflatten,
                "Unflatten",
                ValueKind::Object,
                false,
                json!({"delimiter": ".", "overwrite": false}),
                &[],
            ),
            entry(
                OperationKind::RenameFields,
                "Rename fields",
                ValueKind::Any,
                true,
                json!({"mappings": []}),
                &["mappings"],
            ),
            entry(
                OperationKind::SelectFields,
                "Select fields",
                ValueKind::Any,
                true,
                json!({"fields": []}),
                &["fields"],
            ),
            entry(
                OperationKind::ComputeField,
                "Compute field",
                ValueKind::Any,
                true,
                json!({"field": "", "expression": ""}),
                &["field", "expression"],
            ),
            entry(
                OperationKind::ArrayTake,
                "Take first items",
                ValueKind::Array,
                false,
                json!({"count": 10}),
                &["count"],
            ),
            entry(
                OperationKind::Filter,
                "Filter",
                ValueKind::Array,
                false,
                json!({"mode": "keep", "where": ""}),
                &["where"],
            ),
            entry(
                OperationKind::GroupBy,
                "Group and aggregate",
                ValueKind::Array,
                false,
                json!({"groupBy": [], "metrics": []}),
                &["metrics"],
            ),
        ];
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.operation.clone(), entry))
                .collect(),
        }
    }

    pub fn get(&self, operation: &OperationKind) -> Option<&RegistryEntry> {
        self.entries.get(operation)
    }

    /// Whether the interpreter can execute `operation` at all.
    pub fn is_known(&self, operation: &OperationKind) -> bool {
        matches!(
            operation,
            OperationKind::PostLimit | OperationKind::Condition
        ) || self.entries.contains_key(operation)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    /// Drop steps that are not runnable yet and fill in default error policies.
    ///
    /// A step is dropped when its config is empty or when a required key is
    /// missing, `null`, an empty string, or an empty sequence. Branches of
    /// `condition` steps are normalized the same way.
    pub fn normalize(&self, steps: &[PipelineStep]) -> Vec<PipelineStep> {
        steps
            .iter()
            .filter(|step| self.is_runnable(step))
            .map(|step| {
                let mut step = step.clone();
                if step.on_error.is_none() {
                    step.on_error = Some(
                        self.get(&step.operation)
                            .map(|entry| entry.default_on_error)
                            .unwrap_or_default(),
                    );
                }
                if step.operation == OperationKind::Condition {
                    self.normalize_branches(&mut step);
                }
                step
            })
            .collect()
    }

    fn is_runnable(&self, step: &PipelineStep) -> bool {
        if step.config.is_empty() {
            return false;
        }
        match self.get(&step.operation) {
            Some(entry) => entry
                .required_config_keys
                .iter()
                .all(|key| is_present(step.config.get(*key))),
            None => true,
        }
    }

    fn normalize_branches(&self, step: &mut PipelineStep) {
        let Ok(mut condition) = ConditionConfig::from_step(step) else {
            return;
        };
        condition.then_steps = self.normalize(&condition.then_steps);
        condition.else_steps = self.normalize(&condition.else_steps);
        let branches = [
            ("then", condition.then_steps),
            ("else", condition.else_steps),
        ];
        for (key, steps) in branches {
            if step.config.contains_key(key) {
                if let Ok(value) = serde_json::to_value(steps) {
                    step.config.insert(key.to_string(), value);
                }
            }
        }
    }
}

fn entry(
    operation: OperationKind,
    label: &'static str,
    expected_value_kind: ValueKind,
    allow_path_creation: bool,
    default_config: Value,
    required_config_keys: &'static [&'static str],
) -> RegistryEntry {
    RegistryEntry {
        operation,
        label,
        expected_value_kind,
        allow_path_creation,
        default_config,
        default_on_error: ErrorPolicy::Continue,
        required_config_keys,
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

/// Merge a step's config over the registry defaults for its operation.
pub fn effective_config(registry: &TransformRegistry, step: &PipelineStep) -> Map<String, Value> {
    let mut merged = registry
        .get(&step.operation)
        .and_then(|entry| entry.default_config.as_object().cloned())
        .unwrap_or_default();
    for (key, value) in &step.config {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
