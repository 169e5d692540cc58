use crate::core::types::{ErrorCategory, ErrorSeverity};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Error carried through validation, pipeline runs and workflow runs.
#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub context: HashMap<String, String>,
    /// Last good document (pipeline) or partial execution context (workflow run).
    pub document: Option<Box<Value>>,
    pub occurred_at: DateTime<Utc>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        AppError {
            category,
            severity: category.severity(),
            code: category.default_code().to_string(),
            message: message.into(),
            context: HashMap::new(),
            document: None,
            occurred_at: Utc::now(),
            source: None,
        }
    }

    pub fn caused_by<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(anyhow::Error::new(source));
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_context(key, value);
        self
    }

    pub fn add_context(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.insert(key.into(), value.into());
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// Attach the document the failure happened against.
    pub fn with_document(mut self, document: Value) -> Self {
        self.document = Some(Box::new(document));
        self
    }

    /// Path or expression the error refers to, when one was recorded.
    pub fn offending(&self) -> Option<&str> {
        self.context
            .get("path")
            .or_else(|| self.context.get("expression"))
            .map(String::as_str)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.context.is_empty() {
            let mut entries: Vec<_> = self.context.iter().collect();
            entries.sort();
            write!(f, " (Context: {:?})", entries)?;
        }
        match &self.source {
            Some(source) => write!(f, "\nCaused by: {}", source),
            None => Ok(()),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::new(ErrorCategory::IoError, err.to_string()).caused_by(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::new(ErrorCategory::SerializationError, format!("invalid JSON: {}", err))
            .caused_by(err)
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::new(ErrorCategory::SerializationError, format!("invalid YAML: {}", err))
            .caused_by(err)
    }
}
