//! Per-subject vector storage.
//!
//! Each subject owns a [`SubjectVectorStore`]: a flat L2 index plus a
//! parallel metadata sequence where index row `i` describes metadata entry
//! `i`. The two are persisted side by side and always loaded together.

mod index;
mod manager;

pub use index::FlatL2Index;
pub use manager::{LoadReport, SharedStore, VectorStoreManager, validate_subject};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::error::VectorStoreError;
use crate::models::{ChunkMetadata, EmbeddedChunk, RetrievalResult, StoreStats};

/// One metadata entry, persisted in row order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Vectors and metadata for a single subject.
#[derive(Debug)]
pub struct SubjectVectorStore {
    subject: String,
    index: FlatL2Index,
    metadata: Vec<StoredChunk>,
    index_dir: PathBuf,
}

impl SubjectVectorStore {
    /// Empty in-memory store. Nothing is read from `index_dir`.
    pub fn new(subject: impl Into<String>, dim: usize, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            subject: subject.into(),
            index: FlatL2Index::new(dim),
            metadata: Vec::new(),
            index_dir: index_dir.into(),
        }
    }

    /// Create the store and reload any state persisted under `index_dir`.
    pub fn open(
        subject: impl Into<String>,
        dim: usize,
        index_dir: impl Into<PathBuf>,
    ) -> Result<Self, VectorStoreError> {
        let mut store = Self::new(subject, dim, index_dir);
        store.reload()?;
        Ok(store)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn embedding_dim(&self) -> usize {
        self.index.dim()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_dir.join(format!("{}.index", self.subject))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.index_dir.join(format!("{}_metadata.json", self.subject))
    }

    /// Append chunks and their vectors. Nothing is added if any vector has the wrong dimension.
    pub fn add(&mut self, chunks: &[EmbeddedChunk]) -> Result<usize, VectorStoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let dim = self.index.dim();
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dim) {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dim,
                actual: bad.embedding.len(),
            });
        }

        let vectors: Vec<Vec<f32>> = chunks.iter().map(|c| c.embedding.clone()).collect();
        self.index.add(&vectors)?;
        self.metadata.extend(chunks.iter().map(|c| StoredChunk {
            content: c.chunk.content.clone(),
            metadata: c.chunk.metadata.clone(),
        }));

        info!("Added {} chunks to subject '{}'", chunks.len(), self.subject);
        Ok(chunks.len())
    }

    /// Nearest chunks by squared L2 distance, nearest first, `k` clamped to the store size.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>, VectorStoreError> {
        if self.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let hits = self.index.search(query, k)?;
        let mut results = Vec::with_capacity(hits.len());

        for (row, distance) in hits {
            let Some(entry) = self.metadata.get(row) else {
                error!(
                    "Index row {} has no metadata in subject '{}' ({} entries); skipping",
                    row,
                    self.subject,
                    self.metadata.len()
                );
                continue;
            };

            results.push(RetrievalResult {
                content: entry.content.clone(),
                metadata: entry.metadata.clone(),
                score: distance,
                rank: results.len() as u32 + 1,
            });
        }

        Ok(results)
    }

    /// Write index and metadata. Each file is written to its own uniquely named
    /// temporary in `index_dir` and renamed into place.
    pub fn persist(&self) -> Result<(), VectorStoreError> {
        fs::create_dir_all(&self.index_dir)
            .map_err(|e| VectorStoreError::io(&self.index_dir, e))?;

        let metadata = serde_json::to_vec(&self.metadata)?;
        write_atomic(&self.index_dir, &self.metadata_path(), &metadata)?;
        write_atomic(&self.index_dir, &self.index_path(), &self.index.to_bytes()?)?;

        debug!(
            "Persisted {} vectors for subject '{}' to {}",
            self.len(),
            self.subject,
            self.index_dir.display()
        );
        Ok(())
    }

    /// Replace in-memory state with what is on disk.
    ///
    /// With neither file present the store becomes empty. A lone file, an
    /// unreadable or corrupt file, a dimension other than the configured one,
    /// or a row count that differs from the metadata length is an error and
    /// leaves the in-memory state untouched.
    pub fn reload(&mut self) -> Result<(), VectorStoreError> {
        let index_path = self.index_path();
        let metadata_path = self.metadata_path();

        match (index_path.exists(), metadata_path.exists()) {
            (false, false) => {
                self.index.reset();
                self.metadata.clear();
                return Ok(());
            }
            (true, false) => {
                return Err(VectorStoreError::IncompletePersistence {
                    subject: self.subject.clone(),
                    present: index_path,
                    missing: metadata_path,
                });
            }
            (false, true) => {
                return Err(VectorStoreError::IncompletePersistence {
                    subject: self.subject.clone(),
                    present: metadata_path,
                    missing: index_path,
                });
            }
            (true, true) => {}
        }

        let bytes = fs::read(&index_path).map_err(|e| VectorStoreError::io(&index_path, e))?;
        let index = FlatL2Index::from_bytes(&bytes, &index_path)?;
        if index.dim() != self.index.dim() {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.index.dim(),
                actual: index.dim(),
            });
        }

        let raw = fs::read(&metadata_path).map_err(|e| VectorStoreError::io(&metadata_path, e))?;
        let metadata: Vec<StoredChunk> = serde_json::from_slice(&raw)
            .map_err(|e| VectorStoreError::corrupt(&metadata_path, e.to_string()))?;

        if metadata.len() != index.len() {
            return Err(VectorStoreError::corrupt(
                &metadata_path,
                format!(
                    "{} metadata entries for {} index rows",
                    metadata.len(),
                    index.len()
                ),
            ));
        }

        info!(
            "Loaded {} vectors for subject '{}'",
            index.len(),
            self.subject
        );
        self.index = index;
        self.metadata = metadata;
        Ok(())
    }

    /// Keep only the first `rows` entries. Used to undo an append that could not be persisted.
    pub fn truncate(&mut self, rows: usize) {
        self.index.truncate(rows);
        self.metadata.truncate(rows);
    }

    /// Drop every vector and metadata entry. Call [`persist`](Self::persist) to write it.
    pub fn clear(&mut self) {
        self.index.reset();
        self.metadata.clear();
        info!("Cleared subject '{}'", self.subject);
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            subject: self.subject.clone(),
            total_vectors: self.index.len(),
            embedding_dim: self.index.dim(),
            total_metadata: self.metadata.len(),
        }
    }

    pub fn entries(&self) -> &[StoredChunk] {
        &self.metadata
    }

    pub fn vector(&self, row: usize) -> Option<&[f32]> {
        self.index.row(row)
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), VectorStoreError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| VectorStoreError::io(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| VectorStoreError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| VectorStoreError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, DocumentMetadata};
    use tempfile::TempDir;

    fn embedded(content: &str, subject: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk::new(
            Chunk {
                content: content.to_string(),
                metadata: ChunkMetadata {
                    document: DocumentMetadata::new("notes.txt", subject, "txt"),
                    chunk_id: 0,
                    total_chunks: 1,
                    tokens: 2,
                },
            },
            embedding,
        )
    }

    fn store(dir: &TempDir) -> SubjectVectorStore {
        let mut store = SubjectVectorStore::new("math", 2, dir.path().join("math/index"));
        store
            .add(&[
                embedded("origin", "math", vec![0.0, 0.0]),
                embedded("far", "math", vec![3.0, 4.0]),
                embedded("near", "math", vec![1.0, 0.0]),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_search_ranks_and_clamps() {
        let dir = TempDir::new().unwrap();
        let results = store(&dir).search(&[0.0, 0.0], 10).unwrap();

        assert_eq!(results.len(), 3);
        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["origin", "near", "far"]);
        let ranks: Vec<u32> = results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert!(results.windows(2).all(|w| w[0].score <= w[1].score));
    }

    #[test]
    fn test_empty_store_search() {
        let dir = TempDir::new().unwrap();
        let store = SubjectVectorStore::new("math", 2, dir.path());
        assert!(store.search(&[0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_add_dimension_mismatch_adds_nothing() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        let err = store
            .add(&[
                embedded("ok", "math", vec![1.0, 1.0]),
                embedded("bad", "math", vec![1.0]),
            ])
            .unwrap_err();

        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
        let stats = store.stats();
        assert_eq!(stats.total_vectors, 3);
        assert_eq!(stats.total_metadata, 3);
        assert_eq!(store.add(&[]).unwrap(), 0);
    }

    #[test]
    fn test_search_skips_desynced_rows() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.metadata.truncate(2);

        let results = store.search(&[3.0, 4.0], 3).unwrap();
        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["far", "origin"]);
        assert_eq!(results[1].rank, 2);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let original = store(&dir);
        original.persist().unwrap();

        let reloaded = SubjectVectorStore::open("math", 2, dir.path().join("math/index")).unwrap();
        assert_eq!(reloaded.entries(), original.entries());
        assert_eq!(reloaded.index, original.index);
        assert!(original.index_path().ends_with("math/index/math.index"));
        assert!(original
            .metadata_path()
            .ends_with("math/index/math_metadata.json"));
    }

    #[test]
    fn test_open_without_files_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = SubjectVectorStore::open("physics", 2, dir.path()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_reload_rejects_lone_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.persist().unwrap();
        fs::remove_file(store.metadata_path()).unwrap();

        let err = SubjectVectorStore::open("math", 2, dir.path().join("math/index")).unwrap_err();
        assert!(matches!(err, VectorStoreError::IncompletePersistence { .. }));
    }

    #[test]
    fn test_reload_rejects_corrupt_metadata() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.persist().unwrap();
        fs::write(store.metadata_path(), b"{not json").unwrap();

        let err = SubjectVectorStore::open("math", 2, dir.path().join("math/index")).unwrap_err();
        assert!(matches!(err, VectorStoreError::Corrupt { .. }));
    }

    #[test]
    fn test_reload_rejects_other_dimension() {
        let dir = TempDir::new().unwrap();
        store(&dir).persist().unwrap();

        let err = SubjectVectorStore::open("math", 3, dir.path().join("math/index")).unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_clear_requires_persist() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.persist().unwrap();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.stats().embedding_dim, 2);

        let on_disk = SubjectVectorStore::open("math", 2, dir.path().join("math/index")).unwrap();
        assert_eq!(on_disk.len(), 3);

        store.persist().unwrap();
        let on_disk = SubjectVectorStore::open("math", 2, dir.path().join("math/index")).unwrap();
        assert!(on_disk.is_empty());
    }

    #[test]
    fn test_persist_leaves_only_store_files() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.persist().unwrap();
        store.persist().unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path().join("math/index"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["math.index", "math_metadata.json"]);
    }

    #[test]
    fn test_truncate_keeps_rows_aligned() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.truncate(1);

        let stats = store.stats();
        assert_eq!(stats.total_vectors, 1);
        assert_eq!(stats.total_metadata, 1);
        assert_eq!(store.entries()[0].content, "origin");
    }
}
