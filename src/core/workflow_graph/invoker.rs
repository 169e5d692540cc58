#![allow(clippy::result_large_err)]

use crate::core::config::document;
use crate::core::error::AppError;
use crate::core::workflow_graph::schema::WorkflowNode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Node configuration after template substitution, handed to the [`Invoker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResolvedCall {
    Api {
        method: String,
        url: String,
        headers: Map<String, Value>,
        query: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    Graphql {
        endpoint: String,
        query: String,
        variables: Map<String, Value>,
        headers: Map<String, Value>,
    },
}

impl ResolvedCall {
    /// URL or endpoint the call is addressed to.
    pub fn target(&self) -> &str {
        match self {
            ResolvedCall::Api { url, .. } => url,
            ResolvedCall::Graphql { endpoint, .. } => endpoint,
        }
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("request to {target} failed: {message}")]
    Transport { target: String, message: String },
    #[error("{target} responded with status {status}")]
    Status {
        target: String,
        status: u16,
        body: Option<Value>,
    },
    #[error("no recorded response for node '{0}'")]
    NotRecorded(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Performs the external call behind an api or graphql node.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, node: &WorkflowNode, call: ResolvedCall) -> Result<Value, InvokeError>;
}

/// Canned outcome for one node.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RecordedResponse {
    Failure {
        #[serde(rename = "$error")]
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
    Success(Value),
}

/// Replays responses keyed by node id and remembers every call it received.
#[derive(Debug, Default)]
pub struct RecordedInvoker {
    responses: HashMap<String, RecordedResponse>,
    calls: Mutex<Vec<(String, ResolvedCall)>>,
}

impl RecordedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, node_id: impl Into<String>, response: Value) -> Self {
        self.responses
            .insert(node_id.into(), RecordedResponse::Success(response));
        self
    }

    pub fn with_failure(mut self, node_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses.insert(
            node_id.into(),
            RecordedResponse::Failure {
                error: message.into(),
                status: None,
            },
        );
        self
    }

    /// Load a `{node_id: response}` map from a JSON or YAML file. A response of
    /// the form `{"$error": "...", "status": 503}` replays a failure.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let responses: HashMap<String, RecordedResponse> = document::read_document(path)?;
        Ok(Self {
            responses,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<(String, ResolvedCall)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Invoker for RecordedInvoker {
    async fn invoke(&self, node: &WorkflowNode, call: ResolvedCall) -> Result<Value, InvokeError> {
        let target = call.target().to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((node.id.clone(), call));
        }
        match self.responses.get(&node.id) {
            Some(RecordedResponse::Success(value)) => Ok(value.clone()),
            Some(RecordedResponse::Failure {
                status: Some(status),
                ..
            }) => Err(InvokeError::Status {
                target,
                status: *status,
                body: None,
            }),
            Some(RecordedResponse::Failure { error, .. }) => Err(InvokeError::Transport {
                target,
                message: error.clone(),
            }),
            None => Err(InvokeError::NotRecorded(node.id.clone())),
        }
    }
}
