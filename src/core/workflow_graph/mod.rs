//! Workflow graphs: definitions, planning, invocation and execution.

pub mod executor;
pub mod graph;
pub mod invoker;
pub mod schema;
pub mod status;

pub use executor::{
    CancellationFlag, ExecutorSettings, NodeRunRecord, RunStatus, WorkflowExecutor, WorkflowRun,
};
pub use graph::{workflow_to_dot, WorkflowGraph};
pub use invoker::{InvokeError, Invoker, RecordedInvoker, ResolvedCall};
pub use schema::{load_workflow, NodeConfig, NodeKind, WorkflowDefinition, WorkflowNode};
pub use status::{NodeStatus, NodeStatusEvent, NullSink, StatusSink};
