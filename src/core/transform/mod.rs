//! Declarative JSON transformation steps and the runner that folds them.

pub mod aggregate;
pub mod filter;
pub mod interpreter;
pub mod pipeline;
pub mod predicate;
pub mod registry;
pub mod reshape;
pub mod schema;
pub mod step;

pub use interpreter::StepInterpreter;
pub use pipeline::{PipelineReport, PipelineRunner, StepFailure};
pub use registry::{RegistryEntry, TransformRegistry};
pub use schema::{FieldDescriptor, Schema, ValueKind};
pub use step::{ConditionConfig, ErrorPolicy, OperationKind, PipelineStep};
