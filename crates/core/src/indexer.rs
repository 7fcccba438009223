use crate::chunking::{chunk_table, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{IndexError, ModelError, QueryError};
use crate::models::{IndexEntry, RetrievedChunk, TextChunk};
use crate::preprocess::load_complaints;
use crate::store::{DistanceMetric, IndexManifest, VectorStore};
use std::path::Path;
use tracing::info;

pub fn embed_and_store<E: Embedder + ?Sized>(
    chunks: &[TextChunk],
    embedder: &E,
    dest: &Path,
) -> Result<IndexManifest, IndexError> {
    embed_and_store_with_metric(chunks, embedder, dest, DistanceMetric::default())
}

pub fn embed_and_store_with_metric<E: Embedder + ?Sized>(
    chunks: &[TextChunk],
    embedder: &E,
    dest: &Path,
    metric: DistanceMetric,
) -> Result<IndexManifest, IndexError> {
    let store = build_store(chunks, embedder, metric)?;
    store.save(dest)
}

pub fn build_store<E: Embedder + ?Sized>(
    chunks: &[TextChunk],
    embedder: &E,
    metric: DistanceMetric,
) -> Result<VectorStore, IndexError> {
    if chunks.is_empty() {
        return Err(IndexError::EmptyChunks);
    }

    info!(
        chunks = chunks.len(),
        model = %embedder.model_id(),
        "embedding chunks"
    );
    let texts = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>();
    let embeddings = embedder.embed_batch(&texts)?;

    if embeddings.len() != chunks.len() {
        return Err(IndexError::Model(ModelError::BackendResponse {
            backend: embedder.model_id().to_string(),
            details: format!(
                "returned {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            ),
        }));
    }

    let entries = chunks
        .iter()
        .cloned()
        .zip(embeddings)
        .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
        .collect();

    VectorStore::build(embedder.model_id(), embedder.dimensions(), metric, entries)
}

/// Loads the cleaned table, chunks every narrative and persists the index.
pub fn index_cleaned_file<E: Embedder + ?Sized>(
    input: &Path,
    dest: &Path,
    config: &ChunkingConfig,
    embedder: &E,
    metric: DistanceMetric,
) -> Result<IndexManifest, IndexError> {
    let table = load_complaints(input)?;
    let chunks = chunk_table(&table, config)?;
    embed_and_store_with_metric(&chunks, embedder, dest, metric)
}

/// A persisted index bound to the embedder that must be used to query it.
#[derive(Debug)]
pub struct IndexHandle<E> {
    store: VectorStore,
    embedder: E,
}

impl<E: Embedder> IndexHandle<E> {
    pub fn new(store: VectorStore, embedder: E) -> Result<Self, IndexError> {
        if store.embedding_model() != embedder.model_id() {
            return Err(IndexError::ModelMismatch {
                stored: store.embedding_model().to_string(),
                supplied: embedder.model_id().to_string(),
            });
        }
        if store.dimensions() != embedder.dimensions() {
            return Err(IndexError::DimensionMismatch {
                stored: store.dimensions(),
                supplied: embedder.dimensions(),
            });
        }
        Ok(Self { store, embedder })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, QueryError> {
        if top_k == 0 {
            return Err(QueryError::InvalidTopK);
        }

        let vector = self.embedder.embed(query)?;
        Ok(self.store.search(&vector, top_k)?)
    }
}

pub fn load_index<E: Embedder>(dest: &Path, embedder: E) -> Result<IndexHandle<E>, IndexError> {
    let (store, manifest) = VectorStore::load(dest)?;
    info!(
        dir = %dest.display(),
        entries = manifest.entry_count,
        built_at = %manifest.built_at.to_rfc3339(),
        "index loaded"
    );
    IndexHandle::new(store, embedder)
}
