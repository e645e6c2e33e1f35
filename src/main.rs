mod aggregator;
mod cli;
mod error;
mod fetcher;
mod models;
mod ordering;
mod recoder;
mod store;
mod timestamp;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use env_logger::Env;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("Starting ghactivity - GitHub archive activity tool");
    cli.execute().await?;

    Ok(())
}
