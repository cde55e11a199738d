use clap::Parser;
use std::path::PathBuf;

use ragkit_cli::{App, IndexChoice};
use ragkit_core::telemetry::init_tracing;
use ragkit_query::QueryEngine;

/// Answer a question from a persisted index.
#[derive(Parser, Debug)]
#[command(name = "ragkit-query", version, about)]
struct Cli {
    /// Question to answer
    query: String,

    #[arg(short, long, value_enum, default_value = "sentence-window")]
    kind: IndexChoice,

    /// Build the index from this directory if it is not persisted yet
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Print this many characters of each source node
    #[arg(long, default_value_t = 100)]
    source_chars: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("warn");
    let cli = Cli::parse();
    let app = App::init().await?;

    let index = app.open_index(cli.kind, cli.data_dir.as_deref()).await?;
    let engine = app.query_engine(cli.kind, index);
    let response = engine.query(&cli.query).await?;

    println!("{}", response);
    if !response.source_nodes.is_empty() {
        println!("\nSources:\n{}", response.formatted_sources(cli.source_chars));
    }
    Ok(())
}
