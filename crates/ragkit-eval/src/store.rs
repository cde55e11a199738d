use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::feedback::FeedbackCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResult {
    pub name: String,
    pub status: FeedbackStatus,
    /// Aggregated score; `None` when failed or nothing was scored.
    pub score: Option<f32>,
    #[serde(default)]
    pub calls: Vec<FeedbackCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One answered query with its feedback results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: String,
    pub app_id: String,
    pub input: String,
    pub output: String,
    pub source_texts: Vec<String>,
    pub latency_ms: u64,
    pub ts: DateTime<Utc>,
    pub feedback_results: Vec<FeedbackResult>,
}

impl Record {
    pub fn feedback_score(&self, name: &str) -> Option<f32> {
        self.feedback_results.iter().find(|r| r.name == name).and_then(|r| r.score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub app_id: String,
    pub records: usize,
    pub mean_latency_ms: f64,
    pub feedback_means: BTreeMap<String, f32>,
}

/// Shared record log: always in memory, optionally mirrored to a JSON-lines
/// file.
#[derive(Clone, Default)]
pub struct RecordStore {
    records: Arc<Mutex<Vec<Record>>>,
    path: Option<PathBuf>,
}

impl RecordStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store appending to `path`, preloaded with the records already there.
    pub fn with_jsonl(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let existing = if path.exists() { Self::read_jsonl(&path)? } else { Vec::new() };
        Ok(Self { records: Arc::new(Mutex::new(existing)), path: Some(path) })
    }

    pub fn read_jsonl(path: &Path) -> Result<Vec<Record>> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, l)| serde_json::from_str(l).with_context(|| format!("{}:{}", path.display(), i + 1)))
            .collect()
    }

    pub fn insert(&self, record: Record) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            writeln!(file, "{}", serde_json::to_string(&record)?)?;
        }
        debug!(record_id = %record.record_id, app_id = %record.app_id, "record stored");
        self.lock()?.push(record);
        Ok(())
    }

    pub fn records(&self) -> Result<Vec<Record>> {
        Ok(self.lock()?.clone())
    }

    pub fn records_for(&self, app_id: &str) -> Result<Vec<Record>> {
        Ok(self.lock()?.iter().filter(|r| r.app_id == app_id).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per app id: record count, mean latency and the mean of each
    /// feedback's scored results. Sorted by app id.
    pub fn leaderboard(&self) -> Result<Vec<LeaderboardRow>> {
        let records = self.lock()?;
        let mut by_app: BTreeMap<&str, Vec<&Record>> = BTreeMap::new();
        for r in records.iter() {
            by_app.entry(r.app_id.as_str()).or_default().push(r);
        }
        Ok(by_app
            .into_iter()
            .map(|(app_id, rs)| {
                let mut sums: BTreeMap<String, (f32, usize)> = BTreeMap::new();
                for fr in rs.iter().flat_map(|r| r.feedback_results.iter()) {
                    if let Some(score) = fr.score {
                        let e = sums.entry(fr.name.clone()).or_insert((0.0, 0));
                        e.0 += score;
                        e.1 += 1;
                    }
                }
                LeaderboardRow {
                    app_id: app_id.to_string(),
                    records: rs.len(),
                    mean_latency_ms: rs.iter().map(|r| r.latency_ms as f64).sum::<f64>() / rs.len() as f64,
                    feedback_means: sums.into_iter().map(|(k, (sum, n))| (k, sum / n as f32)).collect(),
                }
            })
            .collect())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Record>>> {
        self.records.lock().map_err(|_| anyhow!("record store lock poisoned"))
    }
}
