use crate::logging::config::LoggingConfig;
use crate::Result;
use anyhow::{anyhow, bail, Context};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self as tracing_fmt, format, writer::BoxMakeWriter};
use tracing_subscriber::registry::LookupSpan;

pub const LOG_FILE_NAME: &str = "pipewright.log";

/// File sink: one JSON object per event.
pub type FileFmtLayer<S> =
    tracing_fmt::Layer<S, format::JsonFields, format::Format<format::Json>, BoxMakeWriter>;

pub type FileLayerStack<S> = tracing_subscriber::layer::Layered<FileFmtLayer<S>, S>;

pub fn log_file_path(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    Ok(log_dir(config, workspace_root)?.join(LOG_FILE_NAME))
}

/// Absolute overrides are used as is. Relative overrides resolve against the
/// workspace (or the home directory) and may not climb out of it.
fn log_dir(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    let anchor = match workspace_root {
        Some(workspace) => workspace.to_path_buf(),
        None => dirs_next::home_dir()
            .ok_or_else(|| anyhow!("no workspace given and no home directory for logs"))?,
    };
    let Some(custom) = &config.log_dir else {
        return Ok(anchor.join(".pipewright").join("logs"));
    };
    if custom.is_absolute() {
        return Ok(custom.clone());
    }
    if custom
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
    {
        bail!(
            "logging.log_dir '{}' must stay inside {}",
            custom.display(),
            anchor.display()
        );
    }
    Ok(anchor.join(custom))
}

/// Non-blocking JSON file layer. A disabled sink still yields a layer, backed
/// by `io::sink`.
pub fn file_layer<S>(
    log_file: &Path,
    enabled: bool,
) -> Result<(FileFmtLayer<S>, Option<WorkerGuard>)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if !enabled {
        return Ok((json_layer(BoxMakeWriter::new(io::sink)), None));
    }

    let directory = log_file
        .parent()
        .ok_or_else(|| anyhow!("log file {} has no parent directory", log_file.display()))?;
    fs::create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    Ok((json_layer(BoxMakeWriter::new(writer)), Some(guard)))
}

fn json_layer<S>(writer: BoxMakeWriter) -> FileFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
}
