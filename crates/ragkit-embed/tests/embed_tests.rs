use ragkit_core::model::{EmbedModel, RerankModel};
use ragkit_embed::{get_embedder, get_reranker, hub, HashingEmbedder};
use ragkit_core::traits::Embedder;

#[test]
fn hashing_embedder_shapes_and_determinism() {
    let embedder = get_embedder(&EmbedModel::Hashed { dim: 384 }, std::path::Path::new("models"), None).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 384);
    assert_eq!(embedder.model_id(), "hash:384");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn hashing_embedder_ignores_case_and_punctuation() {
    let e = HashingEmbedder::new(64);
    assert_eq!(e.embed_text("Hello, World!"), e.embed_text("hello world"));
}

#[test]
fn lexical_reranker_needs_no_model_files() {
    let tmp = tempfile::tempdir().unwrap();
    let reranker = get_reranker(&RerankModel::Lexical, tmp.path()).expect("reranker");
    assert_eq!(reranker.model_id(), "lexical");
}

#[test]
fn missing_model_files_are_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let err = hub::resolve_model_dir(tmp.path(), "BAAI/bge-small-en-v1.5").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("config.json"), "{msg}");
    assert!(msg.contains("tokenizer.json"), "{msg}");
}

#[test]
fn pytorch_weights_substitute_for_safetensors() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("BAAI/bge-small-en-v1.5");
    std::fs::create_dir_all(&dir).unwrap();
    for f in ["config.json", "tokenizer.json", "pytorch_model.bin"] {
        std::fs::write(dir.join(f), b"{}").unwrap();
    }
    assert!(hub::missing_files(&dir).is_empty());
}

#[test]
fn downloads_land_under_final_name_only_when_complete() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("BAAI/bge-small-en-v1.5");
    std::fs::create_dir_all(&dir).unwrap();

    // an interrupted download leaves only the partial file behind
    std::fs::write(dir.join("config.json.part"), b"{\"hidden").unwrap();
    assert!(hub::missing_files(&dir).contains(&"config.json"));

    let path = hub::store_file(&dir, "config.json", b"{}").unwrap();
    assert_eq!(path, dir.join("config.json"));
    assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    assert!(!dir.join("config.json.part").exists());
    assert!(!hub::missing_files(&dir).contains(&"config.json"));
}
