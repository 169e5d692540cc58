pub mod config;
pub mod error;
pub mod expression;
pub mod path;
pub mod transform;
pub mod types;
pub mod validation;
pub mod workflow_graph;

pub use config::{ConfigLoader, DocumentFormat, PipewrightConfig};
pub use error::AppError;
pub use expression::{ExpressionEngine, ExpressionLimits};
pub use transform::{PipelineRunner, PipelineStep, Schema, TransformRegistry};
pub use types::*;
pub use validation::ConfigValidator;
pub use workflow_graph::{WorkflowDefinition, WorkflowExecutor, WorkflowRun};
