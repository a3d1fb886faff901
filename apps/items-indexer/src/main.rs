//! Items Indexer - Entry Point
//!
//! Background process that mirrors marketplace items into the search index.

use clap::Parser;
use items_indexer::Cli;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    items_indexer::run(Cli::parse()).await
}
