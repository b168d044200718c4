// Copyright 2026 Gazette Contributors
// SPDX-License-Identifier: MIT

//! Hand-off of chunk artifacts to an external embedding model and vector
//! store.
//!
//! Neither collaborator is implemented here; callers plug in their own
//! `EmbeddingProvider` and `VectorIndex`.

use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gazette::{ArtifactStore, Chunk, ChunkMetadata};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::progress::{Progress, ProgressEventKind, Stage};

/// Chunks embedded and added per call.
pub const INDEX_BATCH_SIZE: usize = 100;

/// Maps a batch of strings to vectors of a fixed dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// One `add` call worth of entries.
#[derive(Debug, Clone, Default)]
pub struct IndexBatch {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
    pub metadatas: Vec<ChunkMetadata>,
    pub embeddings: Vec<Vec<f32>>,
}

impl IndexBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A logical vector collection.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Drop every entry of the collection.
    async fn reset(&self) -> Result<()>;

    async fn add(&self, batch: IndexBatch) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding provider returned {got} vectors for {expected} texts")]
    LengthMismatch { expected: usize, got: usize },

    #[error("embedding {position} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        got: usize,
    },
}

/// Outcome of a reindex run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    /// `(category, chunks indexed)` in processing order.
    pub categories: Vec<(String, usize)>,
    /// Categories requested but without a chunk artifact.
    pub missing: Vec<String>,
    pub total_indexed: usize,
}

/// Rebuild the collection from chunk artifacts.
///
/// The collection is reset first. With no explicit categories, every
/// `*_chunks.json` in the processed directory is indexed. Entry ids are
/// `<category>_<position>` where position counts chunks within the category.
pub async fn reindex(
    store: &ArtifactStore,
    categories: Option<&[String]>,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    progress: &Progress,
) -> Result<IndexReport> {
    let started = Instant::now();
    progress.emit(ProgressEventKind::StageStarted {
        stage: Stage::Index,
        message: "resetting collection".into(),
    });
    index.reset().await.context("resetting vector collection")?;

    let categories = match categories {
        Some(list) => list.to_vec(),
        None => store.chunk_categories()?,
    };
    info!("indexing categories: {}", categories.join(", "));

    let mut report = IndexReport::default();
    for category in categories {
        let path = store.chunks_path(&category);
        if !path.exists() {
            warn!("chunk file not found: {}", path.display());
            progress.warn(format!("no chunks for {category}"));
            report.missing.push(category);
            continue;
        }

        let chunks = store
            .load_chunks(&category)
            .with_context(|| format!("loading {}", path.display()))?;
        info!("indexing {} chunks from {category}", chunks.len());

        for (batch_no, batch) in chunks.chunks(INDEX_BATCH_SIZE).enumerate() {
            let offset = batch_no * INDEX_BATCH_SIZE;
            let prepared = prepare_batch(&category, offset, batch, embedder).await?;
            let added = prepared.len();
            index.add(prepared).await.context("adding batch to collection")?;
            report.total_indexed += added;
            info!("indexed {} chunks so far", report.total_indexed);
        }
        report.categories.push((category, chunks.len()));
    }

    progress.emit(ProgressEventKind::StageCompleted {
        stage: Stage::Index,
        message: format!("{} chunks indexed", report.total_indexed),
        duration_ms: started.elapsed().as_millis() as u64,
    });
    info!("indexing complete: {} chunks", report.total_indexed);
    Ok(report)
}

async fn prepare_batch(
    category: &str,
    offset: usize,
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
) -> Result<IndexBatch> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed(&texts).await.context("embedding batch")?;

    if embeddings.len() != texts.len() {
        return Err(IndexError::LengthMismatch {
            expected: texts.len(),
            got: embeddings.len(),
        }
        .into());
    }
    let dimension = embedder.dimension();
    if let Some((position, v)) = embeddings
        .iter()
        .enumerate()
        .find(|(_, v)| v.len() != dimension)
    {
        return Err(IndexError::DimensionMismatch {
            position: offset + position,
            expected: dimension,
            got: v.len(),
        }
        .into());
    }

    Ok(IndexBatch {
        ids: (offset..offset + chunks.len())
            .map(|j| format!("{category}_{j}"))
            .collect(),
        texts,
        metadatas: chunks.iter().map(|c| c.metadata.clone()).collect(),
        embeddings,
    })
}
