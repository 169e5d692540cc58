use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(Args)]
pub struct ValidateArgs {
    /// Pipeline steps file (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub steps: PathBuf,

    /// Target schema file mapping dotted paths to descriptors
    #[arg(long, value_name = "FILE")]
    pub schema: PathBuf,
}

#[derive(Args)]
pub struct TransformArgs {
    /// Pipeline steps file (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub steps: PathBuf,

    /// Document to transform (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Write the result here instead of stdout; format follows the extension
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Print steps recovered by their error policy to stderr
    #[arg(long)]
    pub report: bool,
}

#[derive(Args)]
pub struct RunArgs {
    /// Workflow definition file (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub workflow: PathBuf,

    /// Run input document (default: empty object)
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Recorded responses keyed by node id, replayed for api/graphql nodes
    #[arg(long, value_name = "FILE")]
    pub responses: Option<PathBuf>,

    /// Write the run output here instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Emit the full run record (context, node records, hashes) instead of the output
    #[arg(long)]
    pub full: bool,

    /// Stream node status events to stderr as JSON lines
    #[arg(long)]
    pub events: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Yaml,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Pipeline steps file (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub steps: PathBuf,

    /// Target schema file mapping dotted paths to descriptors
    #[arg(long, value_name = "FILE")]
    pub schema: PathBuf,

    /// Serialization format of the exported pipeline
    #[arg(long, value_enum, default_value = "json")]
    pub format: ExportFormat,

    /// Write the export here instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct GraphArgs {
    /// Workflow definition file (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub workflow: PathBuf,
}
