use anyhow::Result;
use clap::Parser;
use wallet_ledger::cli::Cli;
use wallet_ledger::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    cli.run().await
}
