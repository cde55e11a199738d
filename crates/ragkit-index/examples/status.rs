use std::path::PathBuf;

use ragkit_index::storage::{missing_pieces, IndexStruct, INDEX_STORE_FILE, VECTOR_STORE_DIR};
use ragkit_index::LanceVectorStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dir = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("sentence_index"));
    let missing = missing_pieces(&dir);
    if !missing.is_empty() {
        println!("{}: incomplete, missing {:?}", dir.display(), missing);
        return Ok(());
    }
    let info = IndexStruct::load(&dir.join(INDEX_STORE_FILE))?;
    let store = LanceVectorStore::open(&dir.join(VECTOR_STORE_DIR), info.dim).await?;
    println!("index:       {}", info.index_id);
    println!("kind:        {:?}", info.kind);
    println!("embed model: {} (dim {})", info.embed_model, info.dim);
    println!("vectors:     {} (recorded {})", store.count().await?, info.node_ids.len());
    println!("created:     {}", info.created_at);
    Ok(())
}
