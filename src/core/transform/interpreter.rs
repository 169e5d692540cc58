#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::expression::{is_truthy, ExpressionEngine};
use crate::core::path;
use crate::core::transform::aggregate::{self, GroupByConfig};
use crate::core::transform::filter::{self, FilterConfig, PostLimitConfig};
use crate::core::transform::pipeline::PipelineRunner;
use crate::core::transform::registry::{effective_config, RegistryEntry, TransformRegistry};
use crate::core::transform::reshape::{self, ComputeConfig, FlattenConfig, RenameConfig};
use crate::core::transform::reshape::{SelectConfig, TakeConfig, UnflattenConfig};
use crate::core::transform::schema::ValueKind;
use crate::core::transform::step::{ConditionConfig, OperationKind, PipelineStep};
use crate::core::types::ErrorCategory;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Executes a single [`PipelineStep`] against a document.
///
/// Every operation reads the value at the step's target (the whole document
/// for `""`), transforms it and writes the result back at the same location.
/// The input document is never mutated.
#[derive(Clone)]
pub struct StepInterpreter {
    registry: Arc<TransformRegistry>,
    engine: Arc<ExpressionEngine>,
}

impl StepInterpreter {
    pub fn new(registry: Arc<TransformRegistry>, engine: Arc<ExpressionEngine>) -> Self {
        Self { registry, engine }
    }

    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &ExpressionEngine {
        &self.engine
    }

    /// Apply `step` on its own. `post_limit` always fails here since it has no
    /// preceding filter.
    pub fn apply(&self, document: &Value, step: &PipelineStep) -> Result<Value, AppError> {
        self.apply_after(document, step, None)
    }

    /// Apply `step` given the step that ran immediately before it.
    pub fn apply_after(
        &self,
        document: &Value,
        step: &PipelineStep,
        previous: Option<&PipelineStep>,
    ) -> Result<Value, AppError> {
        self.dispatch(document, step, previous).map_err(|mut err| {
            if !err.context.contains_key("operation") {
                err.add_context("operation", step.operation.as_str());
            }
            if !err.context.contains_key("path") && !err.context.contains_key("expression") {
                err.add_context("path", step.target());
            }
            err
        })
    }

    fn dispatch(
        &self,
        document: &Value,
        step: &PipelineStep,
        previous: Option<&PipelineStep>,
    ) -> Result<Value, AppError> {
        match &step.operation {
            OperationKind::Unknown(name) => Err(AppError::new(
                ErrorCategory::StepExecutionFailure,
                format!("unknown operation '{}'", name),
            )
            .with_code("PW-STEP-006")),
            OperationKind::RenameFields => {
                self.resolve_target(document, step)?;
                let config: RenameConfig = self.config(step)?;
                Ok(reshape::rename_fields(document, &config))
            }
            OperationKind::PostLimit => {
                let follows_filter = previous.is_some_and(|prev| {
                    prev.operation == OperationKind::Filter && prev.target() == step.target()
                });
                if !follows_filter {
                    return Err(AppError::new(
                        ErrorCategory::StepExecutionFailure,
                        "post_limit must directly follow a filter on the same target",
                    )
                    .with_code("PW-STEP-007"));
                }
                let config: PostLimitConfig = self.config(step)?;
                self.rewrite(document, step, |value| filter::post_limit(value, &config))
            }
            OperationKind::Condition => self.rewrite(document, step, |value| {
                self.apply_condition(value, step)
            }),
            OperationKind::Flatten => {
                let config: FlattenConfig = self.config(step)?;
                self.rewrite(document, step, |value| reshape::flatten(value, &config))
            }
            OperationKind::Unflatten => {
                let config: UnflattenConfig = self.config(step)?;
                self.rewrite(document, step, |value| reshape::unflatten(value, &config))
            }
            OperationKind::SelectFields => {
                let config: SelectConfig = self.config(step)?;
                self.rewrite(document, step, |value| {
                    Ok(reshape::select_fields(value, &config))
                })
            }
            OperationKind::ComputeField => {
                let config: ComputeConfig = self.config(step)?;
                self.rewrite(document, step, |value| {
                    reshape::compute_field(value, &config, &self.engine)
                })
            }
            OperationKind::ArrayTake => {
                let config: TakeConfig = self.config(step)?;
                self.rewrite(document, step, |value| reshape::array_take(value, &config))
            }
            OperationKind::Filter => {
                let config: FilterConfig = self.config(step)?;
                self.rewrite(document, step, |value| {
                    filter::filter(value, &config, &self.engine)
                })
            }
            OperationKind::GroupBy => {
                let config: GroupByConfig = self.config(step)?;
                self.rewrite(document, step, |value| {
                    aggregate::group_by(value, &config, &self.engine)
                })
            }
        }
    }

    /// Read the target value, transform it and write the result back.
    fn rewrite<F>(&self, document: &Value, step: &PipelineStep, op: F) -> Result<Value, AppError>
    where
        F: FnOnce(&Value) -> Result<Value, AppError>,
    {
        let target = self.resolve_target(document, step)?;
        let result = op(&target)?;
        let mut out = document.clone();
        path::set(&mut out, step.target(), result);
        Ok(out)
    }

    /// Value at the step's target, checked against the registry entry.
    fn resolve_target(&self, document: &Value, step: &PipelineStep) -> Result<Value, AppError> {
        let target = step.target();
        let entry = self.registry.get(&step.operation);
        match path::get(document, target) {
            Some(value) => {
                if let Some(entry) = entry {
                    check_kind(entry, value, target)?;
                }
                Ok(value.clone())
            }
            None if entry.map(|e| e.allow_path_creation).unwrap_or(false) => Ok(Value::Null),
            None => Err(AppError::new(
                ErrorCategory::StepExecutionFailure,
                format!("target path '{}' does not exist", target),
            )
            .with_code("PW-STEP-008")
            .with_context("path", target)),
        }
    }

    fn config<T: DeserializeOwned>(&self, step: &PipelineStep) -> Result<T, AppError> {
        let merged = effective_config(&self.registry, step);
        serde_json::from_value(Value::Object(merged)).map_err(|err| {
            AppError::new(
                ErrorCategory::StepExecutionFailure,
                format!("invalid {} config: {}", step.operation, err),
            )
            .with_code("PW-STEP-002")
        })
    }

    fn apply_condition(&self, value: &Value, step: &PipelineStep) -> Result<Value, AppError> {
        let condition = ConditionConfig::from_step(step).map_err(|err| {
            AppError::new(
                ErrorCategory::StepExecutionFailure,
                format!("invalid condition config: {}", err),
            )
            .with_code("PW-STEP-002")
        })?;
        let branch = if self.guard_holds(&condition.guard, value)? {
            &condition.then_steps
        } else {
            &condition.else_steps
        };
        PipelineRunner::from_interpreter(self.clone()).run_branch(
            value,
            branch,
            condition.propagate,
        )
    }

    /// A plain dotted path tests the truthiness of the value it names; anything
    /// else is evaluated as an expression over the document's fields.
    fn guard_holds(&self, guard: &str, value: &Value) -> Result<bool, AppError> {
        let guard = guard.trim();
        if path::is_plain_path(guard) {
            return Ok(path::get(value, guard).map(is_truthy).unwrap_or(false));
        }
        self.engine.evaluate_truthy(guard, value, &[])
    }
}

fn check_kind(entry: &RegistryEntry, value: &Value, target: &str) -> Result<(), AppError> {
    let actual = ValueKind::of(value);
    if actual.is_compatible_with(entry.expected_value_kind) {
        return Ok(());
    }
    Err(AppError::new(
        ErrorCategory::StepExecutionFailure,
        format!(
            "{} expects {} at '{}', found {}",
            entry.operation, entry.expected_value_kind, target, actual
        ),
    )
    .with_code("PW-STEP-004")
    .with_context("path", target))
}
