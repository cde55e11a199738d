//! LanceDB-backed vector store holding one `(id, vector)` row per embedded node.
//!
//! A fresh store lives in a staging directory until `persist_to` copies it
//! under the index save directory; a loaded store opens that copy directly.

use anyhow::{anyhow, Context, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::ArrowError;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use ragkit_core::types::NodeId;

use crate::schema::{build_vector_schema, VECTOR_TABLE};

pub struct LanceVectorStore {
    db: Connection,
    table: Table,
    dim: usize,
    location: PathBuf,
    staging: Option<TempDir>,
}

impl LanceVectorStore {
    /// Empty store in a new staging directory.
    pub async fn create_staged(dim: usize) -> Result<Self> {
        let staging = tempfile::Builder::new().prefix("ragkit-stage").tempdir()?;
        let location = staging.path().join("vector_store");
        let db = connect(location.to_string_lossy().as_ref()).execute().await?;
        let schema = build_vector_schema(dim);
        let empty = RecordBatchIterator::new(Vec::<Result<RecordBatch, ArrowError>>::new().into_iter(), schema);
        let table = db.create_table(VECTOR_TABLE, Box::new(empty)).execute().await?;
        Ok(Self { db, table, dim, location, staging: Some(staging) })
    }

    /// Open a persisted store at `location` (an index's `vector_store/`).
    pub async fn open(location: &Path, dim: usize) -> Result<Self> {
        let db = connect(location.to_string_lossy().as_ref()).execute().await?;
        let table = db
            .open_table(VECTOR_TABLE)
            .execute()
            .await
            .with_context(|| format!("opening vector table at {}", location.display()))?;
        Ok(Self { db, table, dim, location: location.to_path_buf(), staging: None })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.table.count_rows(None).await?)
    }

    pub async fn add(&self, ids: &[NodeId], vectors: &[Vec<f32>]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        if ids.len() != vectors.len() {
            return Err(anyhow!("ids and vectors length mismatch: {} vs {}", ids.len(), vectors.len()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(anyhow!("vector dim mismatch: got {} expected {}", bad.len(), self.dim));
        }
        let schema = build_vector_schema(self.dim);
        let rows: Vec<Option<Vec<Option<f32>>>> = vectors.iter().map(|v| Some(v.iter().copied().map(Some).collect())).collect();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids.to_vec())),
                Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(rows.into_iter(), self.dim as i32)),
            ],
        )?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        self.table.add(reader).execute().await?;
        Ok(())
    }

    /// Cosine top-k; score is `1 - distance`, highest first.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(NodeId, f32)>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }
        let mut stream = self
            .table
            .vector_search(vector.to_vec())?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow!("vectors.id column missing"))?;
            let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
            for i in 0..batch.num_rows() {
                let score = distances.filter(|d| d.is_valid(i)).map(|d| 1.0 - d.value(i)).unwrap_or(0.0);
                hits.push((ids.value(i).to_string(), score));
            }
        }
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        debug!(k, returned = hits.len(), "vector query");
        Ok(hits)
    }

    /// Copy the store under `dest` and reopen it there.
    pub async fn persist_to(self, dest: &Path) -> Result<Self> {
        if self.staging.is_none() && self.location == dest {
            return Ok(self);
        }
        copy_tree(&self.location, dest)?;
        drop(self.db);
        Self::open(dest, self.dim).await
    }
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).into_iter() {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| format!("copying {}", entry.path().display()))?;
        }
    }
    Ok(())
}
