#![allow(clippy::result_large_err)]

use super::PipewrightConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "pipewright.toml";

const PARALLEL_LIMIT_ENV: &str = "PIPEWRIGHT_PARALLEL_LIMIT";
const INPUT_KEY_ENV: &str = "PIPEWRIGHT_INPUT_KEY";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then `<workspace>/pipewright.toml`, then `PIPEWRIGHT_*`
    /// variables. The merged result is validated before it is returned.
    pub fn load_from_workspace(workspace: &Path) -> Result<PipewrightConfig, AppError> {
        let mut config = Self::load_from_file(&workspace.join(CONFIG_FILE_NAME))?
            .unwrap_or_default();
        Self::apply_env(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    /// `Ok(None)` when `path` does not exist.
    pub fn load_from_file(path: &Path) -> Result<Option<PipewrightConfig>, AppError> {
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("cannot read {}: {}", path.display(), err),
            )
            .caused_by(err)
        })?;
        toml::from_str(&content).map(Some).map_err(|err| {
            AppError::new(
                ErrorCategory::ConfigError,
                format!("cannot parse {}: {}", path.display(), err.message()),
            )
            .with_context("file", path.display().to_string())
        })
    }

    // An unparseable limit leaves the file value in place.
    fn apply_env(config: &mut PipewrightConfig) {
        if let Some(limit) = env::var(PARALLEL_LIMIT_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
        {
            config.executor.parallel_limit = limit;
        }
        if let Ok(key) = env::var(INPUT_KEY_ENV) {
            config.executor.input_key = key;
        }
    }

    fn validate(config: &PipewrightConfig) -> Result<(), AppError> {
        let key = config.executor.input_key.trim();
        let problem = if config.executor.parallel_limit == 0 {
            Some("executor.parallel_limit must be at least 1")
        } else if key.is_empty() {
            Some("executor.input_key cannot be empty")
        } else if key.contains('.') {
            Some("executor.input_key must be a single path segment")
        } else if config.expression.max_expr_depth == 0 {
            Some("expression.max_expr_depth must be at least 1")
        } else {
            None
        };
        match problem {
            Some(message) => Err(AppError::new(ErrorCategory::ConfigError, message)),
            None => Ok(()),
        }
    }
}
