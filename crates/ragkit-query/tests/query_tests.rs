use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ragkit_core::node_parser::{ORIGINAL_TEXT_METADATA_KEY, WINDOW_METADATA_KEY};
use ragkit_core::traits::{LanguageModel, Reranker};
use ragkit_core::types::{Document, NodeWithScore};
use ragkit_embed::{HashingEmbedder, LexicalReranker};
use ragkit_index::{AutoMergingIndexBuilder, SentenceWindowIndexBuilder, VectorStoreIndex};
use ragkit_query::{
    get_automerging_query_engine, get_sentence_window_query_engine, AutoMergingParams, AutoMergingRetriever,
    QueryEngine, Retriever, SentenceWindowParams,
};

struct StubLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl LanguageModel for StubLlm {
    fn model_name(&self) -> &str { "stub" }
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("stub answer ({} chars of prompt)", prompt.len()))
    }
}

fn stub_llm() -> Arc<StubLlm> {
    Arc::new(StubLlm { calls: AtomicUsize::new(0) })
}

fn reranker() -> Arc<dyn Reranker> {
    Arc::new(LexicalReranker)
}

fn garden_doc(sentences: usize) -> Document {
    let topics = ["soil", "water", "seeds", "compost", "sunlight", "pests", "harvest", "storage"];
    let text = (0..sentences)
        .map(|i| format!("Sentence {i} explains how {} affects the garden over time.", topics[i % topics.len()]))
        .collect::<Vec<_>>()
        .join(" ");
    Document::new("garden.txt", text)
}

async fn sentence_index(dir: &std::path::Path, llm: Arc<StubLlm>) -> anyhow::Result<Arc<VectorStoreIndex>> {
    let index = SentenceWindowIndexBuilder::new(dir.join("sentence_index"))
        .embedder(Arc::new(HashingEmbedder::new(64)))
        .build(&garden_doc(20), llm)
        .await?;
    Ok(Arc::new(index))
}

async fn merging_index(dir: &std::path::Path, sizes: Vec<usize>, llm: Arc<StubLlm>) -> anyhow::Result<Arc<VectorStoreIndex>> {
    let index = AutoMergingIndexBuilder::new(dir.join("merging_index"))
        .embedder(Arc::new(HashingEmbedder::new(64)))
        .chunk_sizes(sizes)?
        .build(&[garden_doc(60)], llm)
        .await?;
    Ok(Arc::new(index))
}

/// Returns a fixed node list, standing in for vector retrieval.
struct FixedRetriever(Vec<NodeWithScore>);

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve(&self, _query: &str) -> anyhow::Result<Vec<NodeWithScore>> {
        Ok(self.0.clone())
    }
}

fn children_of(index: &VectorStoreIndex, parent_id: &str) -> Vec<NodeWithScore> {
    let parent = index.docstore().get(parent_id).expect("parent");
    parent
        .relationships
        .children
        .iter()
        .enumerate()
        .map(|(i, id)| NodeWithScore::new(index.docstore().get(id).expect("child").clone(), 0.5 + i as f32 * 0.1))
        .collect()
}

#[tokio::test]
async fn factory_defaults() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let llm = stub_llm();
    let sw = sentence_index(tmp.path(), llm.clone()).await?;
    let engine = get_sentence_window_query_engine(llm.clone(), sw, reranker(), SentenceWindowParams::default());
    assert_eq!(engine.similarity_top_k(), 6);
    assert_eq!(engine.rerank_top_n(), 2);
    assert_eq!(engine.postprocessor_count(), 2);

    let am = merging_index(tmp.path(), vec![2048, 512, 128], llm.clone()).await?;
    let engine = get_automerging_query_engine(llm, am, reranker(), AutoMergingParams::default());
    assert_eq!(engine.similarity_top_k(), 12);
    assert_eq!(engine.rerank_top_n(), 2);
    assert_eq!(engine.postprocessor_count(), 1);
    Ok(())
}

#[tokio::test]
async fn sentence_window_engine_answers_from_windows() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let llm = stub_llm();
    let index = sentence_index(tmp.path(), llm.clone()).await?;
    let engine = get_sentence_window_query_engine(llm.clone(), index, reranker(), SentenceWindowParams::default());

    let response = engine.query("How does compost affect the garden?").await?;
    assert!(response.response.starts_with("stub answer"));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.source_nodes.len(), 2);
    for n in &response.source_nodes {
        assert_eq!(n.node.text, n.node.metadata[WINDOW_METADATA_KEY]);
        assert_ne!(n.node.text, n.node.metadata[ORIGINAL_TEXT_METADATA_KEY]);
    }
    assert!(response.source_nodes[0].score >= response.source_nodes[1].score);
    Ok(())
}

#[tokio::test]
async fn majority_of_siblings_merge_into_parent() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index = merging_index(tmp.path(), vec![80, 16], stub_llm()).await?;
    let parent = index
        .docstore()
        .nodes()
        .find(|n| n.relationships.children.len() >= 3)
        .expect("a parent with at least three children")
        .clone();

    let children = children_of(&index, &parent.id);
    let mean = children.iter().map(|c| c.score).sum::<f32>() / children.len() as f32;
    let merger = AutoMergingRetriever::new(Arc::new(FixedRetriever(children)), Arc::clone(&index), false);
    let merged = merger.retrieve("q").await?;
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].node.id, parent.id);
    assert!((merged[0].score - mean).abs() < 1e-6);

    let one_child = children_of(&index, &parent.id).into_iter().take(1).collect::<Vec<_>>();
    let merger = AutoMergingRetriever::new(Arc::new(FixedRetriever(one_child.clone())), Arc::clone(&index), false);
    let unmerged = merger.retrieve("q").await?;
    assert_eq!(unmerged.len(), 1);
    assert_eq!(unmerged[0].node.id, one_child[0].node.id);
    Ok(())
}

#[tokio::test]
async fn merging_recurses_up_the_hierarchy() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index = merging_index(tmp.path(), vec![300, 80, 16], stub_llm()).await?;
    let root = index
        .docstore()
        .nodes()
        .find(|n| n.parent_id().is_none() && n.relationships.children.len() >= 2)
        .expect("root with several children")
        .clone();
    let leaves: Vec<NodeWithScore> = root
        .relationships
        .children
        .iter()
        .flat_map(|mid| children_of(&index, mid))
        .collect();

    let merger = AutoMergingRetriever::new(Arc::new(FixedRetriever(leaves)), Arc::clone(&index), true);
    let merged = merger.retrieve("q").await?;
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].node.id, root.id);
    Ok(())
}

#[tokio::test]
async fn automerging_engine_returns_top_n_sources() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let llm = stub_llm();
    let index = merging_index(tmp.path(), vec![2048, 512, 128], llm.clone()).await?;
    let engine = get_automerging_query_engine(llm.clone(), index, reranker(), AutoMergingParams::default());
    let response = engine.query("What about pests and harvest?").await?;
    assert!(response.source_nodes.len() <= 2);
    assert!(!response.source_nodes.is_empty());
    assert!(llm.calls.load(Ordering::SeqCst) >= 1);
    assert!(response.formatted_sources(40).starts_with("> Source (score"));
    Ok(())
}
