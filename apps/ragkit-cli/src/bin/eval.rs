use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use ragkit_cli::{read_questions, App, IndexChoice};
use ragkit_core::config::resolve_with_base;
use ragkit_core::telemetry::init_tracing;
use ragkit_eval::{get_prebuilt_recorder, LlmFeedbackProvider, RecordStore};
use ragkit_llm::OpenAiChat;

/// Run a list of questions through a query engine, score every answer with
/// the feedback functions and print the leaderboard.
#[derive(Parser, Debug)]
#[command(name = "ragkit-eval", version, about)]
struct Cli {
    /// File with one question per line
    questions: PathBuf,

    #[arg(short, long, value_enum, default_value = "sentence-window")]
    kind: IndexChoice,

    /// Application id the records are stored under
    #[arg(long)]
    app_id: Option<String>,

    /// Build the index from this directory if it is not persisted yet
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let cli = Cli::parse();
    let app = App::init().await?;
    let questions = read_questions(&cli.questions)?;
    let app_id = cli.app_id.unwrap_or_else(|| cli.kind.app_id().to_string());

    let index = app.open_index(cli.kind, cli.data_dir.as_deref()).await?;
    let engine = Arc::new(app.query_engine(cli.kind, index));
    let grader = OpenAiChat::from_settings(&app.settings.llm)?.with_model(&app.settings.eval.feedback_model);
    let provider = Arc::new(LlmFeedbackProvider::new(Arc::new(grader)));
    let store = match &app.settings.eval.records_path {
        Some(path) => RecordStore::with_jsonl(resolve_with_base(&app.base, path))?,
        None => RecordStore::in_memory(),
    };
    let recorder = get_prebuilt_recorder(engine, &app_id, provider).with_store(store.clone());

    let mut pending = Vec::with_capacity(questions.len());
    for question in &questions {
        let (response, handle) = recorder.query(question).await?;
        println!("Q: {}\nA: {}\n", question, response);
        pending.push(handle);
    }
    for handle in pending {
        let record = handle.wait().await?;
        let scores: Vec<String> = record
            .feedback_results
            .iter()
            .map(|r| format!("{}={}", r.name, r.score.map_or("n/a".to_string(), |s| format!("{s:.2}"))))
            .collect();
        println!("{} [{}] {}", record.record_id, record.input, scores.join(" "));
    }

    println!("\nLeaderboard");
    println!("===========");
    for row in store.leaderboard()? {
        let means: Vec<String> = row.feedback_means.iter().map(|(k, v)| format!("{k}={v:.2}")).collect();
        println!(
            "{:<20} records={:<4} latency={:>8.1}ms {}",
            row.app_id,
            row.records,
            row.mean_latency_ms,
            means.join(" ")
        );
    }
    Ok(())
}
