use crate::logging::layers::console::ConsoleOutput;
use crate::Result;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::filter::Directive;

pub const LOG_LEVEL_ENV: &str = "PIPEWRIGHT_LOG_LEVEL";

/// `[logging]` table of `.pipewright/config/logging.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub default_level: String,
    pub enable_file: bool,
    pub console_output: Option<ConsoleOutput>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            default_level: "info".to_string(),
            enable_file: true,
            console_output: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LoggingFile {
    #[serde(default)]
    logging: LoggingConfig,
}

impl LoggingConfig {
    pub fn config_path(workspace_root: &Path) -> PathBuf {
        workspace_root
            .join(".pipewright")
            .join("config")
            .join("logging.toml")
    }

    /// Defaults, then the workspace file, then `PIPEWRIGHT_LOG_LEVEL`.
    pub fn load(workspace_root: Option<&Path>) -> Result<Self> {
        let mut config = match workspace_root.map(Self::config_path) {
            Some(path) if path.is_file() => Self::read(&path)?,
            _ => Self::default(),
        };

        let level = env::var(LOG_LEVEL_ENV).unwrap_or_default();
        if !level.trim().is_empty() {
            config.default_level = level.trim().to_string();
        }

        config.level_directive()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read logging config {}", path.display()))?;
        let file: LoggingFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse logging config {}", path.display()))?;
        Ok(file.logging)
    }

    pub fn level_directive(&self) -> Result<Directive> {
        Directive::from_str(&self.default_level).map_err(|err| {
            anyhow!(
                "invalid logging.default_level '{}': {}",
                self.default_level,
                err
            )
        })
    }
}
