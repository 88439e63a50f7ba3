use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, error, info, warn};

use super::SubjectVectorStore;
use crate::error::VectorStoreError;
use crate::models::{EmbeddedChunk, RetrievalResult, StoreStats};

pub type SharedStore = Arc<RwLock<SubjectVectorStore>>;

/// Subject names become directory names under the base path.
pub fn validate_subject(subject: &str) -> Result<(), VectorStoreError> {
    let invalid = subject.trim().is_empty()
        || subject != subject.trim()
        || subject == "."
        || subject == ".."
        || subject.contains(['/', '\\', '\0']);

    if invalid {
        return Err(VectorStoreError::InvalidSubject(subject.to_string()));
    }
    Ok(())
}

/// Lazily opens and caches one [`SubjectVectorStore`] per subject.
///
/// Aggregates (`save_all`, `stats_all`, `subjects`) only see stores opened
/// since this manager was created. Call [`load_persisted`](Self::load_persisted)
/// first to include subjects that exist only on disk.
#[derive(Debug)]
pub struct VectorStoreManager {
    base_path: PathBuf,
    embedding_dim: usize,
    stores: RwLock<HashMap<String, SharedStore>>,
}

impl VectorStoreManager {
    pub fn new(base_path: impl Into<PathBuf>, embedding_dim: usize) -> Result<Self, VectorStoreError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).map_err(|e| VectorStoreError::io(&base_path, e))?;

        Ok(Self {
            base_path,
            embedding_dim,
            stores: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn index_dir(&self, subject: &str) -> PathBuf {
        self.base_path.join(subject).join("index")
    }

    fn cached(&self, subject: &str) -> Result<Option<SharedStore>, VectorStoreError> {
        let stores = self
            .stores
            .read()
            .map_err(|_| VectorStoreError::LockPoisoned(subject.to_string()))?;
        Ok(stores.get(subject).cloned())
    }

    fn all_stores(&self) -> Result<Vec<SharedStore>, VectorStoreError> {
        let stores = self
            .stores
            .read()
            .map_err(|_| VectorStoreError::LockPoisoned("<manager>".to_string()))?;
        Ok(stores.values().cloned().collect())
    }

    /// Return the cached store for `subject`, opening it from disk on first access.
    pub fn get_or_create_store(&self, subject: &str) -> Result<SharedStore, VectorStoreError> {
        validate_subject(subject)?;

        if let Some(store) = self.cached(subject)? {
            return Ok(store);
        }

        let mut stores = self
            .stores
            .write()
            .map_err(|_| VectorStoreError::LockPoisoned(subject.to_string()))?;

        if let Some(store) = stores.get(subject) {
            return Ok(Arc::clone(store));
        }

        let store = SubjectVectorStore::open(subject, self.embedding_dim, self.index_dir(subject))?;
        debug!("Opened store for subject '{}' ({} vectors)", subject, store.len());
        let store = Arc::new(RwLock::new(store));
        stores.insert(subject.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Add the chunks tagged with `subject` and persist the store.
    ///
    /// Chunks tagged with any other subject are dropped. Returns the number
    /// added. If persisting fails the appended rows are removed again, so
    /// memory matches disk.
    pub fn add_chunks_to_subject(
        &self,
        subject: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize, VectorStoreError> {
        validate_subject(subject)?;

        let matching = matching_chunks(subject, chunks);
        if matching.is_empty() {
            warn!("No chunks to add for subject '{}'", subject);
            return Ok(0);
        }

        let store = self.get_or_create_store(subject)?;
        let mut store = store
            .write()
            .map_err(|_| VectorStoreError::LockPoisoned(subject.to_string()))?;

        let previous_len = store.len();
        let added = store.add(&matching)?;
        if let Err(e) = store.persist() {
            store.truncate(previous_len);
            return Err(e);
        }
        Ok(added)
    }

    /// Swap the contents of `subject` for the chunks tagged with it, in one step.
    ///
    /// The old vectors stay in memory and on disk unless the new ones were
    /// added and persisted. With no matching chunks nothing changes.
    pub fn replace_subject(
        &self,
        subject: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize, VectorStoreError> {
        validate_subject(subject)?;

        let matching = matching_chunks(subject, chunks);
        if matching.is_empty() {
            warn!("No chunks to replace subject '{}' with", subject);
            return Ok(0);
        }

        let store = self.get_or_create_store(subject)?;
        let mut store = store
            .write()
            .map_err(|_| VectorStoreError::LockPoisoned(subject.to_string()))?;

        let fresh = SubjectVectorStore::new(subject, self.embedding_dim, self.index_dir(subject));
        let previous = std::mem::replace(&mut *store, fresh);

        let result = store.add(&matching).and_then(|added| {
            store.persist()?;
            Ok(added)
        });
        if result.is_err() {
            *store = previous;
        } else {
            info!("Replaced subject '{}' ({} vectors before)", subject, previous.len());
        }
        result
    }

    /// Search one subject. A subject with no open store yields no results.
    pub fn search(
        &self,
        subject: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievalResult>, VectorStoreError> {
        let Some(store) = self.cached(subject)? else {
            warn!("No vector store for subject '{}'", subject);
            return Ok(Vec::new());
        };

        let store = store
            .read()
            .map_err(|_| VectorStoreError::LockPoisoned(subject.to_string()))?;
        store.search(query, k)
    }

    /// Search every open store independently. Results are never merged.
    pub fn search_all_subjects(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<BTreeMap<String, Vec<RetrievalResult>>, VectorStoreError> {
        let mut results = BTreeMap::new();
        for subject in self.subjects()? {
            results.insert(subject.clone(), self.search(&subject, query, k)?);
        }
        Ok(results)
    }

    /// Persist every open store. Returns how many were written.
    pub fn save_all(&self) -> Result<usize, VectorStoreError> {
        let stores = self.all_stores()?;
        for store in &stores {
            let store = store
                .read()
                .map_err(|_| VectorStoreError::LockPoisoned("<store>".to_string()))?;
            store.persist()?;
        }
        info!("Saved {} subject stores", stores.len());
        Ok(stores.len())
    }

    /// Statistics for every open store, ordered by subject.
    pub fn stats_all(&self) -> Result<Vec<StoreStats>, VectorStoreError> {
        let mut stats = Vec::new();
        for store in self.all_stores()? {
            let store = store
                .read()
                .map_err(|_| VectorStoreError::LockPoisoned("<store>".to_string()))?;
            stats.push(store.stats());
        }
        stats.sort_by(|a, b| a.subject.cmp(&b.subject));
        Ok(stats)
    }

    /// Empty an open store and persist the empty state. Returns false if the subject is not open.
    pub fn clear_subject(&self, subject: &str) -> Result<bool, VectorStoreError> {
        let Some(store) = self.cached(subject)? else {
            warn!("No vector store for subject '{}' to clear", subject);
            return Ok(false);
        };

        let mut store = store
            .write()
            .map_err(|_| VectorStoreError::LockPoisoned(subject.to_string()))?;
        store.clear();
        store.persist()?;
        Ok(true)
    }

    /// Names of the open stores, sorted.
    pub fn subjects(&self) -> Result<Vec<String>, VectorStoreError> {
        let stores = self
            .stores
            .read()
            .map_err(|_| VectorStoreError::LockPoisoned("<manager>".to_string()))?;
        let mut subjects: Vec<String> = stores.keys().cloned().collect();
        subjects.sort();
        Ok(subjects)
    }

    /// Whether `subject` has an index directory on disk, loaded or not.
    pub fn has_persisted(&self, subject: &str) -> bool {
        validate_subject(subject).is_ok() && self.index_dir(subject).is_dir()
    }

    /// Overwrite `subject` with an empty store without reading what is on disk.
    ///
    /// Unlike [`clear_subject`](Self::clear_subject) this works for a subject
    /// whose persisted files cannot be loaded.
    pub fn reset_subject(&self, subject: &str) -> Result<(), VectorStoreError> {
        validate_subject(subject)?;

        let empty = SubjectVectorStore::new(subject, self.embedding_dim, self.index_dir(subject));
        empty.persist()?;

        let mut stores = self
            .stores
            .write()
            .map_err(|_| VectorStoreError::LockPoisoned(subject.to_string()))?;
        stores.insert(subject.to_string(), Arc::new(RwLock::new(empty)));
        info!("Reset subject '{}'", subject);
        Ok(())
    }

    /// Open every subject that has an index directory under the base path.
    ///
    /// A subject that fails to load is logged and reported in
    /// [`LoadReport::failed`]; the remaining subjects are still opened.
    pub fn load_persisted(&self) -> Result<LoadReport, VectorStoreError> {
        let entries =
            fs::read_dir(&self.base_path).map_err(|e| VectorStoreError::io(&self.base_path, e))?;

        let mut report = LoadReport::default();
        for entry in entries {
            let entry = entry.map_err(|e| VectorStoreError::io(&self.base_path, e))?;
            let Some(subject) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !self.has_persisted(&subject) {
                continue;
            }
            match self.get_or_create_store(&subject) {
                Ok(_) => report.loaded.push(subject),
                Err(e) => {
                    error!("Failed to load subject '{}': {}", subject, e);
                    report.failed.push((subject, e));
                }
            }
        }

        report.loaded.sort();
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));
        info!(
            "Loaded {} persisted subjects ({} failed)",
            report.loaded.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

/// Outcome of [`VectorStoreManager::load_persisted`].
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, VectorStoreError)>,
}

fn matching_chunks(subject: &str, chunks: &[EmbeddedChunk]) -> Vec<EmbeddedChunk> {
    let matching: Vec<EmbeddedChunk> = chunks
        .iter()
        .filter(|c| c.subject() == subject)
        .cloned()
        .collect();

    if matching.len() < chunks.len() {
        warn!(
            "Dropped {} chunks not tagged with subject '{}'",
            chunks.len() - matching.len(),
            subject
        );
    }
    matching
}
