#![allow(clippy::result_large_err)] // Validation errors carry the offending path or expression in AppError context.

//! Static validation of finished pipelines against a target [`Schema`], and
//! the persistence boundary that depends on it.

use crate::core::config::document::DocumentFormat;
use crate::core::error::AppError;
use crate::core::expression::ExpressionEngine;
use crate::core::path;
use crate::core::transform::predicate::Condition;
use crate::core::transform::schema::Schema;
use crate::core::transform::step::{ConditionConfig, OperationKind, PipelineStep};
use crate::core::types::ErrorCategory;
use serde_json::Value;
use std::collections::HashSet;

/// Target paths claimed so far in one validation pass, branches included.
#[derive(Debug, Default)]
struct ValidationState {
    claimed: HashSet<String>,
}

/// Proves a pipeline only writes schema-known paths, each at most once, with
/// resolvable condition guards.
pub struct ConfigValidator<'a> {
    schema: &'a Schema,
    engine: &'a ExpressionEngine,
}

impl<'a> ConfigValidator<'a> {
    pub fn new(schema: &'a Schema, engine: &'a ExpressionEngine) -> Self {
        Self { schema, engine }
    }

    /// Validate `steps`, stopping at the first violation.
    pub fn validate(&self, steps: &[PipelineStep]) -> Result<(), AppError> {
        let mut state = ValidationState::default();
        self.validate_steps(steps, "", "", &mut state)?;
        tracing::debug!(
            steps = steps.len(),
            claimed = state.claimed.len(),
            "pipeline validated"
        );
        Ok(())
    }

    /// Validate, then hand back an independent copy of the steps.
    pub fn persist(&self, steps: &[PipelineStep]) -> Result<Vec<PipelineStep>, AppError> {
        self.validate(steps)?;
        Ok(steps.to_vec())
    }

    /// Validate, then serialize the steps.
    pub fn export(&self, steps: &[PipelineStep], format: DocumentFormat) -> Result<String, AppError> {
        self.validate(steps)?;
        format.render(&steps)
    }

    /// `scope` is the absolute path branch steps run against; empty at top level.
    fn validate_steps(
        &self,
        steps: &[PipelineStep],
        scope: &str,
        location: &str,
        state: &mut ValidationState,
    ) -> Result<(), AppError> {
        for (index, step) in steps.iter().enumerate() {
            let location = if location.is_empty() {
                index.to_string()
            } else {
                format!("{}.{}", location, index)
            };
            self.validate_step(step, scope, &location, state).map_err(|err| {
                if err.context.contains_key("step") {
                    err
                } else {
                    err.with_context("step", location.as_str())
                }
            })?;
        }
        Ok(())
    }

    fn validate_step(
        &self,
        step: &PipelineStep,
        scope: &str,
        location: &str,
        state: &mut ValidationState,
    ) -> Result<(), AppError> {
        let Some(relative) = step.target_path.as_deref() else {
            return Err(AppError::new(
                ErrorCategory::MissingTarget,
                format!("{} step at {} has no target path", step.operation, location),
            )
            .with_context("operation", step.operation.as_str()));
        };
        // A branch step with an empty target rewrites the whole branch value,
        // like a whole-document step at the top level.
        let target = if relative.is_empty() {
            String::new()
        } else {
            scoped(scope, relative)
        };
        let target = target.as_str();

        if !target.is_empty() {
            let Some(descriptor) = self.schema.get(target) else {
                return Err(AppError::new(
                    ErrorCategory::UnknownPath,
                    format!("target path '{}' is not in the schema", target),
                )
                .with_context("path", target));
            };
            if let Some(expected) = step.expected_type {
                if !descriptor.value_kind.is_compatible_with(expected) {
                    return Err(AppError::new(
                        ErrorCategory::TypeMismatch,
                        format!(
                            "step expects {} at '{}' but the schema declares {}",
                            expected, target, descriptor.value_kind
                        ),
                    )
                    .with_context("path", target));
                }
            }
        }

        match step.operation {
            OperationKind::Condition => {
                let branch_scope = if relative.is_empty() {
                    scope.to_string()
                } else {
                    target.to_string()
                };
                self.validate_condition(step, &branch_scope, location, state)
            }
            OperationKind::ComputeField => {
                if let Some(expression) = step.config_value("expression").and_then(|v| v.as_str()) {
                    self.check_syntax(expression)?;
                }
                self.claim(target, state)
            }
            OperationKind::Filter => {
                self.check_clause(step.config_value("where"))?;
                self.claim(target, state)
            }
            OperationKind::GroupBy => {
                self.check_clause(step.config_value("having"))?;
                self.claim(target, state)
            }
            _ => self.claim(target, state),
        }
    }

    fn validate_condition(
        &self,
        step: &PipelineStep,
        target: &str,
        location: &str,
        state: &mut ValidationState,
    ) -> Result<(), AppError> {
        let condition = ConditionConfig::from_step(step)?;
        let guard = condition.guard.trim();
        if path::is_plain_path(guard) {
            let absolute = scoped(target, guard);
            if !self.schema.contains(&absolute) {
                return Err(AppError::new(
                    ErrorCategory::UnresolvedBinding,
                    format!("condition guard '{}' does not name a schema path", guard),
                )
                .with_context("expression", guard)
                .with_context("path", absolute));
            }
        } else {
            self.check_syntax(guard)?;
        }

        self.validate_steps(
            &condition.then_steps,
            target,
            &format!("{}.then", location),
            state,
        )?;
        self.validate_steps(
            &condition.else_steps,
            target,
            &format!("{}.else", location),
            state,
        )
    }

    /// Expression clauses are parsed; predicate trees are checked at run time.
    fn check_clause(&self, clause: Option<&Value>) -> Result<(), AppError> {
        match clause.map(Condition::parse) {
            Some(Ok(Condition::Expression(expression))) => self.check_syntax(&expression),
            _ => Ok(()),
        }
    }

    fn check_syntax(&self, expression: &str) -> Result<(), AppError> {
        self.engine.compile(expression).map(|_| ()).map_err(|err| {
            AppError::new(ErrorCategory::InvalidExpressionSyntax, err.message)
                .with_context("expression", expression)
        })
    }

    /// Only non-empty targets are claimed; whole-document steps may repeat.
    fn claim(&self, target: &str, state: &mut ValidationState) -> Result<(), AppError> {
        if target.is_empty() {
            return Ok(());
        }
        if !state.claimed.insert(target.to_string()) {
            return Err(AppError::new(
                ErrorCategory::DuplicateWrite,
                format!("target path '{}' is written more than once", target),
            )
            .with_context("path", target));
        }
        Ok(())
    }
}

fn scoped(scope: &str, path: &str) -> String {
    if scope.is_empty() {
        path.to_string()
    } else {
        format!("{}.{}", scope, path)
    }
}

pub fn validate(
    steps: &[PipelineStep],
    schema: &Schema,
    engine: &ExpressionEngine,
) -> Result<(), AppError> {
    ConfigValidator::new(schema, engine).validate(steps)
}
