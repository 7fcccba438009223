use crate::error::IndexError;
use crate::models::{IndexEntry, RetrievedChunk, TextChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub const VECTORS_FILE: &str = "index.vectors";
pub const MANIFEST_FILE: &str = "index.json";

const FORMAT_VERSION: u32 = 1;
const F32_BYTES: usize = std::mem::size_of::<f32>();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Squared Euclidean distance, as a flat L2 index ranks.
    #[default]
    L2,
    /// One minus cosine similarity.
    Cosine,
}

impl DistanceMetric {
    pub fn distance(self, left: &[f32], right: &[f32]) -> f32 {
        match self {
            Self::L2 => left
                .iter()
                .zip(right)
                .map(|(a, b)| (a - b) * (a - b))
                .sum(),
            Self::Cosine => {
                let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
                let left_norm = left.iter().map(|a| a * a).sum::<f32>().sqrt();
                let right_norm = right.iter().map(|b| b * b).sum::<f32>().sqrt();
                if left_norm == 0.0 || right_norm == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (left_norm * right_norm)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimensions: usize,
    pub metric: DistanceMetric,
    pub entry_count: usize,
    pub vectors_sha256: String,
    pub built_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct Sidecar {
    #[serde(flatten)]
    manifest: IndexManifest,
    chunks: Vec<TextChunk>,
}

/// Exact nearest-neighbour store over every (vector, chunk) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStore {
    embedding_model: String,
    dimensions: usize,
    metric: DistanceMetric,
    entries: Vec<IndexEntry>,
}

impl VectorStore {
    pub fn build(
        embedding_model: impl Into<String>,
        dimensions: usize,
        metric: DistanceMetric,
        entries: Vec<IndexEntry>,
    ) -> Result<Self, IndexError> {
        if entries.is_empty() {
            return Err(IndexError::EmptyChunks);
        }

        if let Some(entry) = entries
            .iter()
            .find(|entry| entry.embedding.len() != dimensions)
        {
            return Err(IndexError::DimensionMismatch {
                stored: dimensions,
                supplied: entry.embedding.len(),
            });
        }

        Ok(Self {
            embedding_model: embedding_model.into(),
            dimensions,
            metric,
            entries,
        })
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nearest entries first; equal distances keep insertion order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                stored: self.dimensions,
                supplied: query.len(),
            });
        }

        let mut scored = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, self.metric.distance(query, &entry.embedding)))
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| left.1.total_cmp(&right.1).then(left.0.cmp(&right.0)));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(position, distance)| RetrievedChunk {
                chunk: self.entries[position].chunk.clone(),
                distance,
            })
            .collect())
    }

    pub fn save(&self, dir: &Path) -> Result<IndexManifest, IndexError> {
        fs::create_dir_all(dir)?;

        let mut bytes = Vec::with_capacity(self.entries.len() * self.dimensions * F32_BYTES);
        for entry in &self.entries {
            for value in &entry.embedding {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dimensions: self.dimensions,
            metric: self.metric,
            entry_count: self.entries.len(),
            vectors_sha256: digest(&bytes),
            built_at: Utc::now(),
        };
        let sidecar = Sidecar {
            manifest,
            chunks: self.entries.iter().map(|entry| entry.chunk.clone()).collect(),
        };

        fs::write(dir.join(VECTORS_FILE), &bytes)?;
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&sidecar)?)?;

        info!(
            dir = %dir.display(),
            entries = sidecar.manifest.entry_count,
            model = %sidecar.manifest.embedding_model,
            "vector store saved"
        );
        Ok(sidecar.manifest)
    }

    pub fn load(dir: &Path) -> Result<(Self, IndexManifest), IndexError> {
        let sidecar: Sidecar = serde_json::from_slice(&fs::read(dir.join(MANIFEST_FILE))?)?;
        let manifest = sidecar.manifest;

        if manifest.format_version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {}",
                manifest.format_version
            )));
        }
        if manifest.dimensions == 0 {
            return Err(IndexError::Corrupt("manifest declares zero dimensions".to_string()));
        }
        if sidecar.chunks.len() != manifest.entry_count {
            return Err(IndexError::Corrupt(format!(
                "manifest lists {} chunks but declares {} entries",
                sidecar.chunks.len(),
                manifest.entry_count
            )));
        }

        let bytes = fs::read(dir.join(VECTORS_FILE))?;
        if digest(&bytes) != manifest.vectors_sha256 {
            return Err(IndexError::Corrupt(format!(
                "{VECTORS_FILE} checksum does not match manifest"
            )));
        }

        let (row_bytes, expected_bytes) = manifest
            .dimensions
            .checked_mul(F32_BYTES)
            .and_then(|row| Some((row, row.checked_mul(manifest.entry_count)?)))
            .ok_or_else(|| {
                IndexError::Corrupt(format!(
                    "manifest sizes overflow: {} entries of {} dimensions",
                    manifest.entry_count, manifest.dimensions
                ))
            })?;
        if bytes.len() != expected_bytes {
            return Err(IndexError::Corrupt(format!(
                "{VECTORS_FILE} holds {} bytes, expected {expected_bytes}",
                bytes.len()
            )));
        }

        let entries = sidecar
            .chunks
            .into_iter()
            .zip(bytes.chunks_exact(row_bytes))
            .map(|(chunk, row)| IndexEntry {
                chunk,
                embedding: row
                    .chunks_exact(F32_BYTES)
                    .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
                    .collect(),
            })
            .collect::<Vec<_>>();

        debug!(dir = %dir.display(), entries = entries.len(), "vector store loaded");
        let store = Self::build(
            manifest.embedding_model.clone(),
            manifest.dimensions,
            manifest.metric,
            entries,
        )?;
        Ok((store, manifest))
    }
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use tempfile::tempdir;

    fn entry(id: &str, text: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: TextChunk {
                chunk_id: id.to_string(),
                chunk_index: 0,
                text: text.to_string(),
                metadata: ChunkMetadata {
                    complaint_id: id.to_string(),
                    product: "Credit card".to_string(),
                    original_narrative: text.to_string(),
                },
            },
            embedding,
        }
    }

    fn sample_store(metric: DistanceMetric) -> Result<VectorStore, IndexError> {
        VectorStore::build(
            "test-model",
            2,
            metric,
            vec![
                entry("far", "far away", vec![10.0, 10.0]),
                entry("near", "close by", vec![1.0, 0.0]),
                entry("middle", "in between", vec![3.0, 3.0]),
                entry("near-twin", "also close", vec![1.0, 0.0]),
            ],
        )
    }

    #[test]
    fn empty_store_cannot_be_built() {
        let result = VectorStore::build("test-model", 2, DistanceMetric::L2, Vec::new());
        assert!(matches!(result, Err(IndexError::EmptyChunks)));
    }

    #[test]
    fn mismatched_entry_dimension_is_rejected() {
        let result = VectorStore::build(
            "test-model",
            3,
            DistanceMetric::L2,
            vec![entry("a", "a", vec![1.0, 2.0])],
        );
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch {
                stored: 3,
                supplied: 2
            })
        ));
    }

    #[test]
    fn search_orders_by_increasing_distance() -> Result<(), IndexError> {
        let store = sample_store(DistanceMetric::L2)?;
        let hits = store.search(&[1.0, 0.0], 3)?;

        let ids = hits
            .iter()
            .map(|hit| hit.chunk.chunk_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["near", "near-twin", "middle"]);
        assert!(hits.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
        assert_eq!(hits[0].distance, 0.0);
        Ok(())
    }

    #[test]
    fn search_returns_everything_when_top_k_exceeds_size() -> Result<(), IndexError> {
        let store = sample_store(DistanceMetric::Cosine)?;
        assert_eq!(store.search(&[0.5, 0.5], 50)?.len(), store.len());
        Ok(())
    }

    #[test]
    fn cosine_distance_ignores_magnitude() {
        let metric = DistanceMetric::Cosine;
        assert!(metric.distance(&[2.0, 0.0], &[5.0, 0.0]).abs() < 1e-6);
        assert!((metric.distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(metric.distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn query_dimension_is_checked() -> Result<(), IndexError> {
        let store = sample_store(DistanceMetric::L2)?;
        assert!(matches!(
            store.search(&[1.0, 0.0, 0.0], 1),
            Err(IndexError::DimensionMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn save_and_load_preserve_entries() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = sample_store(DistanceMetric::Cosine)?;

        let manifest = store.save(dir.path())?;
        assert!(dir.path().join(VECTORS_FILE).exists());
        assert!(dir.path().join(MANIFEST_FILE).exists());
        assert_eq!(manifest.entry_count, 4);

        let (loaded, loaded_manifest) = VectorStore::load(dir.path())?;
        assert_eq!(loaded, store);
        assert_eq!(loaded_manifest, manifest);
        Ok(())
    }

    #[test]
    fn tampered_vectors_are_reported_as_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        sample_store(DistanceMetric::L2)?.save(dir.path())?;
        fs::write(dir.path().join(VECTORS_FILE), [0u8; 4])?;

        assert!(matches!(
            VectorStore::load(dir.path()),
            Err(IndexError::Corrupt(_))
        ));
        Ok(())
    }

    #[test]
    fn oversized_manifest_dimensions_are_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        sample_store(DistanceMetric::L2)?.save(dir.path())?;

        let manifest_path = dir.path().join(MANIFEST_FILE);
        let mut sidecar: serde_json::Value = serde_json::from_slice(&fs::read(&manifest_path)?)?;
        sidecar["dimensions"] = serde_json::json!(usize::MAX / 2);
        fs::write(&manifest_path, serde_json::to_vec(&sidecar)?)?;

        assert!(matches!(
            VectorStore::load(dir.path()),
            Err(IndexError::Corrupt(_))
        ));
        Ok(())
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let result = VectorStore::load(Path::new("/definitely/not/an/index"));
        assert!(matches!(result, Err(IndexError::Io(_))));
    }
}
