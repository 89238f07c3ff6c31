use anyhow::Result;
use clap::Parser;
use dealflow_cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dealflow_cli::execute(cli).await
}
