use clap::Parser;
use pipewright::{cli, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    let _logging = logging::init(&args)?;
    cli::run(args).await
}
