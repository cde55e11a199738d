use clap::Parser;
use std::path::PathBuf;

use ragkit_cli::{load_documents, App, IndexChoice};
use ragkit_core::telemetry::init_tracing;

/// Build (or load) the persisted sentence-window and auto-merging indexes.
#[derive(Parser, Debug)]
#[command(name = "ragkit-indexer", version, about)]
struct Cli {
    /// Directory of .txt / .md files to index
    data_dir: PathBuf,

    /// Index flavor; both are built when omitted
    #[arg(short, long, value_enum)]
    kind: Option<IndexChoice>,

    /// Only index the first N files
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let cli = Cli::parse();
    let app = App::init().await?;

    println!("Data directory: {}", cli.data_dir.display());
    let documents = load_documents(&cli.data_dir, cli.limit)?;
    let kinds = match cli.kind {
        Some(kind) => vec![kind],
        None => vec![IndexChoice::SentenceWindow, IndexChoice::AutoMerging],
    };
    for kind in kinds {
        let index = app.build_index(kind, &documents).await?;
        let info = index.index_struct();
        println!(
            "✅ {:?}: {} embedded nodes, {} nodes stored at {}",
            kind,
            info.node_ids.len(),
            index.docstore().len(),
            app.index_dir(kind).display()
        );
    }
    Ok(())
}
