pub mod args;
pub mod commands;

pub use args::{ExportArgs, ExportFormat, GraphArgs, RunArgs, TransformArgs, ValidateArgs};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
PIPELINE COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "pipewright")]
#[command(version = crate::VERSION)]
#[command(about = "Workflow engine for API call graphs and JSON transformation pipelines")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: validate a pipeline against its schema, try it with transform, export it, then wire it into a workflow and run it."
)]
pub struct Args {
    /// Workspace holding pipewright.toml and .pipewright/ (default: current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Check a pipeline against a schema",
        long_about = "Validate proves every step targets a schema path, at most once, with matching types and resolvable condition guards.",
        after_help = "Example:\n    pipewright validate --steps pipeline.yaml --schema schema.json"
    )]
    Validate(ValidateArgs),
    #[command(
        about = "Apply a pipeline to a document",
        long_about = "Transform normalizes the steps, folds them over the input document and prints the result.",
        after_help = "Example:\n    pipewright transform --steps pipeline.yaml --input weather.json"
    )]
    Transform(TransformArgs),
    #[command(
        about = "Execute a workflow graph",
        long_about = "Run plans the workflow from its edges, executes reachable nodes in waves and prints the output. External calls are answered from recorded responses.",
        after_help = "Example:\n    pipewright run --workflow flow.yaml --input request.json --responses recorded.json"
    )]
    Run(RunArgs),
    #[command(
        about = "Validate and serialize a pipeline",
        long_about = "Export validates the steps against the schema and only then writes them as JSON or YAML.",
        after_help = "Example:\n    pipewright export --steps pipeline.json --schema schema.json --format yaml"
    )]
    Export(ExportArgs),
    #[command(
        about = "Render a workflow as Graphviz DOT",
        after_help = "Example:\n    pipewright graph --workflow flow.yaml | dot -Tsvg > flow.svg"
    )]
    Graph(GraphArgs),
}

impl Command {
    /// Whether the command prints documents on stdout.
    pub fn writes_documents(&self) -> bool {
        !matches!(self, Command::Validate(_))
    }
}

pub async fn run(args: Args) -> crate::Result<()> {
    let workspace = commands::workspace_root(args.workspace.as_deref())?;
    match args.command {
        Command::Validate(validate_args) => commands::validate(validate_args, &workspace),
        Command::Transform(transform_args) => commands::transform(transform_args, &workspace),
        Command::Run(run_args) => commands::run(run_args, &workspace).await,
        Command::Export(export_args) => commands::export(export_args, &workspace),
        Command::Graph(graph_args) => commands::graph(graph_args),
    }
}
