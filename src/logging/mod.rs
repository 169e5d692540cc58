pub mod config;
pub mod layers;

pub use layers::console::ConsoleOutput;

use crate::cli::Args;
use crate::logging::config::LoggingConfig;
use crate::logging::layers::{console, file};
use crate::Result;
use anyhow::{bail, Context};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Holds the file writer open until the command finishes.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber for one CLI invocation.
///
/// `RUST_LOG` wins over the configured level, which itself comes from
/// `PIPEWRIGHT_LOG_LEVEL` or `.pipewright/config/logging.toml`.
pub fn init(args: &Args) -> Result<LoggingGuard> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        bail!("logging already initialized");
    }

    let workspace = args.workspace.clone().or_else(|| env::current_dir().ok());
    let config = LoggingConfig::load(workspace.as_deref())?;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::default().add_directive(
            config
                .level_directive()
                .context("failed to configure tracing level")?,
        ),
    };

    type FileSubscriber = file::FileLayerStack<Registry>;
    let log_file = file::log_file_path(&config, workspace.as_deref())?;
    let (file_layer, file_guard) = file::file_layer::<Registry>(&log_file, config.enable_file)?;
    let console_output =
        console::select_console_output(args.command.writes_documents(), config.console_output);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console::console_layer::<FileSubscriber>(console_output))
        .with(env_filter)
        .init();

    tracing::debug!(
        log_file = %log_file.display(),
        file_enabled = config.enable_file,
        console = %console_output,
        "logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
