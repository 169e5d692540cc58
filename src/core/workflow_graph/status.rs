use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Per-node lifecycle reported to a [`StatusSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Running,
    Success,
    Error,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Running => "running",
            NodeStatus::Success => "success",
            NodeStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusEvent {
    pub node_id: String,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NodeStatusEvent {
    pub fn new(node_id: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            node_id: node_id.into(),
            status,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(node_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(node_id, NodeStatus::Error)
        }
    }
}

/// Receives node status events in order for each node.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: NodeStatusEvent);
}

impl<F> StatusSink for F
where
    F: Fn(NodeStatusEvent) + Send + Sync,
{
    fn emit(&self, event: NodeStatusEvent) {
        self(event)
    }
}

impl StatusSink for UnboundedSender<NodeStatusEvent> {
    fn emit(&self, event: NodeStatusEvent) {
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.send(event);
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn emit(&self, _event: NodeStatusEvent) {}
}
