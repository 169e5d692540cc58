#![allow(clippy::result_large_err)]

//! Reading and writing definition documents (pipelines, schemas, workflows,
//! inputs) as JSON or YAML.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    #[default]
    Json,
    Yaml,
}

impl DocumentFormat {
    /// `.yaml` and `.yml` files are YAML, everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => DocumentFormat::Yaml,
            _ => DocumentFormat::Json,
        }
    }

    pub fn parse<T: DeserializeOwned>(&self, content: &str) -> Result<T, AppError> {
        match self {
            DocumentFormat::Json => Ok(serde_json::from_str(content)?),
            DocumentFormat::Yaml => Ok(serde_yaml::from_str(content)?),
        }
    }

    pub fn render<T: Serialize>(&self, value: &T) -> Result<String, AppError> {
        match self {
            DocumentFormat::Json => Ok(serde_json::to_string_pretty(value)?),
            DocumentFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        }
    }
}

impl FromStr for DocumentFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(DocumentFormat::Json),
            "yaml" | "yml" => Ok(DocumentFormat::Yaml),
            other => Err(AppError::new(
                ErrorCategory::ConfigError,
                format!("unsupported document format '{}'", other),
            )),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Json => f.write_str("json"),
            DocumentFormat::Yaml => f.write_str("yaml"),
        }
    }
}

/// Read and deserialize a document, choosing the format by file extension.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::new(
            ErrorCategory::IoError,
            format!("Failed to read {}: {}", path.display(), e),
        )
        .with_context("file", path.display().to_string())
    })?;
    DocumentFormat::from_path(path)
        .parse(&content)
        .map_err(|err| err.with_context("file", path.display().to_string()))
}

/// Serialize `value` in the format implied by `path` and write it out.
pub fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let rendered = DocumentFormat::from_path(path).render(value)?;
    std::fs::write(path, rendered)?;
    Ok(())
}
