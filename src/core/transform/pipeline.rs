#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::expression::ExpressionEngine;
use crate::core::transform::interpreter::StepInterpreter;
use crate::core::transform::registry::TransformRegistry;
use crate::core::transform::step::{ErrorPolicy, OperationKind, PipelineStep};
use crate::core::types::ErrorCategory;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Context key marking a branch failure that must abort the enclosing pipeline.
const PROPAGATE_MARKER: &str = "propagate";

/// A step failure recovered by its `continue`/`skip` policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    pub index: usize,
    pub operation: OperationKind,
    pub policy: ErrorPolicy,
    pub message: String,
}

/// Result of a pipeline run, including the failures that were recovered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub document: Value,
    pub recovered: Vec<StepFailure>,
}

/// Folds an ordered step list over a document.
#[derive(Clone)]
pub struct PipelineRunner {
    interpreter: StepInterpreter,
}

impl PipelineRunner {
    pub fn new(registry: Arc<TransformRegistry>, engine: Arc<ExpressionEngine>) -> Self {
        Self::from_interpreter(StepInterpreter::new(registry, engine))
    }

    pub fn from_interpreter(interpreter: StepInterpreter) -> Self {
        Self { interpreter }
    }

    pub fn interpreter(&self) -> &StepInterpreter {
        &self.interpreter
    }

    pub fn normalize(&self, steps: &[PipelineStep]) -> Vec<PipelineStep> {
        self.interpreter.registry().normalize(steps)
    }

    /// Run `steps` over `document` and return the transformed document.
    ///
    /// A `stop` failure returns a `StepExecutionFailure` whose `document` is the
    /// last good document before the failing step.
    pub fn run(&self, document: &Value, steps: &[PipelineStep]) -> Result<Value, AppError> {
        self.run_with_report(document, steps)
            .map(|report| report.document)
    }

    pub fn run_with_report(
        &self,
        document: &Value,
        steps: &[PipelineStep],
    ) -> Result<PipelineReport, AppError> {
        let steps = self.normalize(steps);
        tracing::debug!(steps = steps.len(), "running pipeline");
        self.fold(document, &steps)
    }

    /// Run one `condition` branch. A `stop` failure ends the branch and keeps
    /// the partially transformed branch document unless `propagate` is set.
    pub(crate) fn run_branch(
        &self,
        document: &Value,
        steps: &[PipelineStep],
        propagate: bool,
    ) -> Result<Value, AppError> {
        let steps = self.normalize(steps);
        match self.fold(document, &steps) {
            Ok(report) => Ok(report.document),
            Err(err) if propagate => Err(err.with_context(PROPAGATE_MARKER, "true")),
            Err(err) => {
                tracing::warn!(error = %err, "condition branch stopped early");
                Ok(err.document.map(|doc| *doc).unwrap_or_else(|| document.clone()))
            }
        }
    }

    fn fold(&self, document: &Value, steps: &[PipelineStep]) -> Result<PipelineReport, AppError> {
        let mut current = document.clone();
        let mut recovered = Vec::new();

        for (index, step) in steps.iter().enumerate() {
            let previous = index.checked_sub(1).and_then(|i| steps.get(i));
            let err = match self.interpreter.apply_after(&current, step, previous) {
                Ok(next) => {
                    current = next;
                    continue;
                }
                Err(err) => err,
            };

            if err.context.contains_key(PROPAGATE_MARKER) {
                let mut err = into_step_failure(err, index);
                err.context.remove(PROPAGATE_MARKER);
                return Err(err.with_document(current));
            }

            let policy = step.policy();
            match policy {
                ErrorPolicy::Stop => {
                    tracing::error!(
                        step = index,
                        operation = %step.operation,
                        error = %err,
                        "step failed, stopping pipeline"
                    );
                    return Err(into_step_failure(err, index).with_document(current));
                }
                ErrorPolicy::Skip => {
                    tracing::debug!(step = index, operation = %step.operation, error = %err, "step skipped");
                }
                ErrorPolicy::Continue => {
                    tracing::warn!(step = index, operation = %step.operation, error = %err, "step failed, continuing");
                }
            }
            recovered.push(StepFailure {
                index,
                operation: step.operation.clone(),
                policy,
                message: err.message,
            });
        }

        Ok(PipelineReport {
            document: current,
            recovered,
        })
    }
}

fn into_step_failure(err: AppError, index: usize) -> AppError {
    let err = if err.category == ErrorCategory::StepExecutionFailure {
        err
    } else {
        let context = err.context.clone();
        let mut wrapped =
            AppError::new(ErrorCategory::StepExecutionFailure, err.message.clone()).caused_by(err);
        wrapped.context.extend(context);
        wrapped
    };
    if err.context.contains_key("step") {
        err
    } else {
        err.with_context("step", index.to_string())
    }
}
