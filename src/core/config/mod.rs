use crate::core::expression::ExpressionLimits;
use crate::core::workflow_graph::executor::{
    ExecutorSettings, DEFAULT_INPUT_KEY, DEFAULT_PARALLEL_LIMIT,
};
use serde::{Deserialize, Serialize};

/// Main pipewright configuration loaded from pipewright.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipewrightConfig {
    /// Workflow executor configuration
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Expression engine limits
    #[serde(default)]
    pub expression: ExpressionConfig,
}

/// Executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of concurrent api/graphql invocations per wave
    #[serde(default = "default_parallel_limit")]
    pub parallel_limit: usize,

    /// Context key the run input is stored under
    #[serde(default = "default_input_key")]
    pub input_key: String,
}

/// Expression engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionConfig {
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    #[serde(default = "default_max_expr_depth")]
    pub max_expr_depth: usize,
}

fn default_parallel_limit() -> usize {
    DEFAULT_PARALLEL_LIMIT
}

fn default_input_key() -> String {
    DEFAULT_INPUT_KEY.to_string()
}

fn default_max_operations() -> u64 {
    ExpressionLimits::default().max_operations
}

fn default_max_expr_depth() -> usize {
    ExpressionLimits::default().max_expr_depth
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            parallel_limit: default_parallel_limit(),
            input_key: default_input_key(),
        }
    }
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        ExpressionConfig {
            max_operations: default_max_operations(),
            max_expr_depth: default_max_expr_depth(),
        }
    }
}

impl PipewrightConfig {
    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            parallel_limit: self.executor.parallel_limit,
            input_key: self.executor.input_key.clone(),
        }
    }

    pub fn expression_limits(&self) -> ExpressionLimits {
        ExpressionLimits {
            max_operations: self.expression.max_operations,
            max_expr_depth: self.expression.max_expr_depth,
        }
    }
}


pub mod document;
pub mod loader;

pub use document::DocumentFormat;
pub use loader::ConfigLoader;
