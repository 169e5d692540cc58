use crate::{
    cli::args::{ExportArgs, ExportFormat, GraphArgs, RunArgs, TransformArgs, ValidateArgs},
    core::{
        config::{document, ConfigLoader, DocumentFormat, PipewrightConfig},
        error::AppError,
        expression::ExpressionEngine,
        transform::{PipelineRunner, PipelineStep, Schema, TransformRegistry},
        types::ErrorCategory,
        validation::ConfigValidator,
        workflow_graph::{
            workflow_to_dot, CancellationFlag, NodeStatusEvent, RecordedInvoker, RunStatus,
            WorkflowDefinition, WorkflowExecutor,
        },
    },
    Result,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A steps file is either a bare list or an object with a `steps` list.
#[derive(Deserialize)]
#[serde(untagged)]
enum StepsDocument {
    List(Vec<PipelineStep>),
    Wrapped { steps: Vec<PipelineStep> },
}

impl From<StepsDocument> for Vec<PipelineStep> {
    fn from(doc: StepsDocument) -> Self {
        match doc {
            StepsDocument::List(steps) | StepsDocument::Wrapped { steps } => steps,
        }
    }
}

pub fn workspace_root(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => env::current_dir().context("failed to resolve current directory"),
    }
}

fn load_config(workspace: &Path) -> Result<PipewrightConfig> {
    let config = ConfigLoader::load_from_workspace(workspace)?;
    tracing::debug!(
        parallel_limit = config.executor.parallel_limit,
        input_key = %config.executor.input_key,
        "configuration loaded"
    );
    Ok(config)
}

fn load_steps(path: &Path) -> Result<Vec<PipelineStep>> {
    let doc: StepsDocument = document::read_document(path)
        .with_context(|| format!("failed to load pipeline steps from {}", path.display()))?;
    Ok(doc.into())
}

fn runner(config: &PipewrightConfig) -> PipelineRunner {
    PipelineRunner::new(
        Arc::new(TransformRegistry::builtin()),
        Arc::new(ExpressionEngine::with_limits(config.expression_limits())),
    )
}

/// Print `value` as pretty JSON on stdout, or write it to `output` in the
/// format implied by its extension.
fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            document::write_document(path, value)?;
            tracing::info!(path = %path.display(), "output written");
        }
        None => println!("{}", DocumentFormat::Json.render(value)?),
    }
    Ok(())
}

pub fn validate(args: ValidateArgs, workspace: &Path) -> Result<()> {
    let config = load_config(workspace)?;
    let steps = load_steps(&args.steps)?;
    let schema: Schema = document::read_document(&args.schema)?;
    let engine = ExpressionEngine::with_limits(config.expression_limits());

    ConfigValidator::new(&schema, &engine).validate(&steps)?;
    println!(
        "{}: {} steps valid against {} schema paths",
        args.steps.display(),
        steps.len(),
        schema.len()
    );
    Ok(())
}

pub fn transform(args: TransformArgs, workspace: &Path) -> Result<()> {
    let config = load_config(workspace)?;
    let steps = load_steps(&args.steps)?;
    let input: Value = document::read_document(&args.input)?;

    let report = runner(&config).run_with_report(&input, &steps)?;
    if args.report {
        for failure in &report.recovered {
            eprintln!(
                "recovered step {} ({}, {:?}): {}",
                failure.index, failure.operation, failure.policy, failure.message
            );
        }
    }
    emit(&report.document, args.output.as_deref())
}

pub async fn run(args: RunArgs, workspace: &Path) -> Result<()> {
    let config = load_config(workspace)?;
    let workflow = WorkflowDefinition::load_from_file(&args.workflow)?;
    let input: Value = match &args.input {
        Some(path) => document::read_document(path)?,
        None => Value::Object(Map::new()),
    };
    let invoker = match &args.responses {
        Some(path) => RecordedInvoker::from_file(path)?,
        None => RecordedInvoker::new(),
    };

    let cancel = CancellationFlag::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling after the current wave");
                cancel.cancel();
            }
        })
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<NodeStatusEvent>();
    let print_events = args.events;
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if print_events {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{}", line);
                }
            }
        }
    });

    let executor = WorkflowExecutor::new(runner(&config), config.executor_settings());
    let result = executor
        .run_with_cancellation(&workflow, input, &invoker, &tx, &cancel)
        .await;
    drop(tx);
    join_printer(printer).await;
    interrupt.abort();

    let run = result?;
    if run.status == RunStatus::Cancelled {
        return Err(AppError::new(
            ErrorCategory::Cancelled,
            format!("workflow run {} cancelled", run.execution_id),
        )
        .with_document(run.context)
        .into());
    }

    if args.full {
        emit(&run, args.output.as_deref())
    } else {
        emit(&run.output, args.output.as_deref())
    }
}

pub fn export(args: ExportArgs, workspace: &Path) -> Result<()> {
    let config = load_config(workspace)?;
    let steps = load_steps(&args.steps)?;
    let schema: Schema = document::read_document(&args.schema)?;
    let engine = ExpressionEngine::with_limits(config.expression_limits());
    let format = match args.format {
        ExportFormat::Json => DocumentFormat::Json,
        ExportFormat::Yaml => DocumentFormat::Yaml,
    };

    let rendered = ConfigValidator::new(&schema, &engine).export(&steps, format)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => print!("{}", ensure_trailing_newline(rendered)),
    }
    Ok(())
}

pub fn graph(args: GraphArgs) -> Result<()> {
    let workflow: WorkflowDefinition = document::read_document(&args.workflow)?;
    print!("{}", ensure_trailing_newline(workflow_to_dot(&workflow)));
    Ok(())
}

fn ensure_trailing_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Wait for the event printer; a panicked or aborted printer is logged, not fatal.
async fn join_printer(printer: tokio::task::JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "status event printer stopped abnormally");
            false
        }
    }
}
