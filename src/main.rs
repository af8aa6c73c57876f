use clap::Parser;
use uiscout_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    uiscout_cli::cli::run(Cli::parse()).await
}
