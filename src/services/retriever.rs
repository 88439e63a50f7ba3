//! Query-time retrieval over subject stores.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::embedding::SharedEmbeddingProvider;
use super::vector_store::VectorStoreManager;
use crate::error::RetrievalError;
use crate::models::{RetrievalResult, RetrievedContext, SourceInfo};

/// Embeds queries and searches subject-scoped stores.
///
/// Provider failures are returned as [`RetrievalError::Embedding`]; retry
/// policy belongs to the caller.
#[derive(Clone)]
pub struct Retriever {
    manager: Arc<VectorStoreManager>,
    embedder: SharedEmbeddingProvider,
}

impl Retriever {
    pub fn new(manager: Arc<VectorStoreManager>, embedder: SharedEmbeddingProvider) -> Self {
        Self { manager, embedder }
    }

    pub fn manager(&self) -> &Arc<VectorStoreManager> {
        &self.manager
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "query text is empty".to_string(),
            ));
        }
        Ok(self.embedder.embed(query).await?)
    }

    /// Top `k` chunks of `subject`, nearest first.
    ///
    /// `score_threshold` is a maximum distance: results with
    /// `score > score_threshold` are dropped.
    pub async fn retrieve(
        &self,
        query: &str,
        subject: &str,
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RetrievalResult>, RetrievalError> {
        let query_embedding = self.embed_query(query).await?;
        let mut results = self.manager.search(subject, &query_embedding, k)?;

        if let Some(threshold) = score_threshold {
            results.retain(|r| r.score <= threshold);
        }

        info!("Retrieved {} chunks for query in '{}'", results.len(), subject);
        Ok(results)
    }

    /// Retrieve and render the results as a numbered context block.
    pub async fn retrieve_with_context(
        &self,
        query: &str,
        subject: &str,
        k: usize,
        score_threshold: Option<f32>,
        include_sources: bool,
    ) -> Result<RetrievedContext, RetrievalError> {
        let chunks = self.retrieve(query, subject, k, score_threshold).await?;
        if chunks.is_empty() {
            return Ok(RetrievedContext::default());
        }

        let sources = if include_sources {
            chunks
                .iter()
                .map(|chunk| SourceInfo::from_result(chunk, subject))
                .collect()
        } else {
            Vec::new()
        };

        Ok(RetrievedContext {
            context: format_context(&chunks),
            sources,
            chunks,
        })
    }

    /// Search each subject independently with one query embedding.
    pub async fn retrieve_multi_subject(
        &self,
        query: &str,
        subjects: &[String],
        k_per_subject: usize,
    ) -> Result<BTreeMap<String, Vec<RetrievalResult>>, RetrievalError> {
        let query_embedding = self.embed_query(query).await?;

        let mut results = BTreeMap::new();
        for subject in subjects {
            let subject_results = self.manager.search(subject, &query_embedding, k_per_subject)?;
            results.insert(subject.clone(), subject_results);
        }
        Ok(results)
    }

    /// Chunks near `content` in `subject`.
    ///
    /// Searches `2 * k` candidates. With `exclude_self`, candidates whose text
    /// equals `content` are dropped. At most `k` results are returned, re-ranked
    /// from 1.
    pub async fn get_similar_chunks(
        &self,
        content: &str,
        subject: &str,
        k: usize,
        exclude_self: bool,
    ) -> Result<Vec<RetrievalResult>, RetrievalError> {
        let embedding = self.embed_query(content).await?;
        let candidates = self
            .manager
            .search(subject, &embedding, k.saturating_mul(2))?;

        Ok(candidates
            .into_iter()
            .filter(|r| !exclude_self || r.content != content)
            .take(k)
            .enumerate()
            .map(|(i, mut r)| {
                r.rank = i as u32 + 1;
                r
            })
            .collect())
    }
}

/// `[Document N]` header, content, then a blank line, for each result.
pub fn format_context(results: &[RetrievalResult]) -> String {
    let mut parts = Vec::with_capacity(results.len() * 3);
    for (i, result) in results.iter().enumerate() {
        parts.push(format!("[Document {}]", i + 1));
        parts.push(result.content.clone());
        parts.push(String::new());
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use crate::models::{Chunk, ChunkMetadata, DocumentMetadata, EmbeddedChunk};
    use crate::services::embedding::EmbeddingProvider;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Maps known words to fixed points; anything else lands at the origin.
    struct KeywordProvider;

    #[async_trait]
    impl EmbeddingProvider for KeywordProvider {
        fn dimension(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.iter().any(|t| t.trim().is_empty()) {
                return Err(EmbeddingError::EmptyInput);
            }
            Ok(texts
                .iter()
                .map(|t| match t.as_str() {
                    t if t.contains("algebra") => vec![1.0, 0.0],
                    t if t.contains("geometry") => vec![0.0, 1.0],
                    t if t.contains("calculus") => vec![2.0, 0.0],
                    _ => vec![0.0, 0.0],
                })
                .collect())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn dimension(&self) -> usize {
            2
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Timeout)
        }
    }

    fn embedded(content: &str, embedding: Vec<f32>, source: &str) -> EmbeddedChunk {
        EmbeddedChunk::new(
            Chunk {
                content: content.to_string(),
                metadata: ChunkMetadata {
                    document: DocumentMetadata::new(source, "math", "txt"),
                    chunk_id: 0,
                    total_chunks: 1,
                    tokens: 1,
                },
            },
            embedding,
        )
    }

    fn retriever(dir: &TempDir) -> Retriever {
        let manager = Arc::new(VectorStoreManager::new(dir.path(), 2).unwrap());
        manager
            .add_chunks_to_subject(
                "math",
                &[
                    embedded("algebra basics", vec![1.0, 0.0], "algebra.txt"),
                    embedded("geometry basics", vec![0.0, 1.0], ""),
                    embedded("calculus basics", vec![2.0, 0.0], "calculus.txt"),
                ],
            )
            .unwrap();
        Retriever::new(manager, Arc::new(KeywordProvider))
    }

    #[tokio::test]
    async fn test_retrieve_orders_by_distance() {
        let dir = TempDir::new().unwrap();
        let results = retriever(&dir).retrieve("algebra", "math", 3, None).await.unwrap();

        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["algebra basics", "calculus basics", "geometry basics"]);
        assert_eq!(results[0].score, 0.0);
        assert_eq!(results[1].score, 1.0);
        assert_eq!(results[2].score, 2.0);
    }

    #[tokio::test]
    async fn test_threshold_is_max_distance() {
        let dir = TempDir::new().unwrap();
        let results = retriever(&dir)
            .retrieve("algebra", "math", 3, Some(1.0))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score <= 1.0));
    }

    #[tokio::test]
    async fn test_retrieve_with_context_format() {
        let dir = TempDir::new().unwrap();
        let context = retriever(&dir)
            .retrieve_with_context("geometry", "math", 2, None, true)
            .await
            .unwrap();

        assert_eq!(
            context.context,
            "[Document 1]\ngeometry basics\n\n[Document 2]\nalgebra basics\n"
        );
        assert_eq!(context.sources.len(), 2);
        assert_eq!(context.sources[0].source, "Unknown");
        assert_eq!(context.sources[1].source, "algebra.txt");
        assert_eq!(context.sources[1].rank, 2);
        assert_eq!(context.chunks.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_results_give_empty_context() {
        let dir = TempDir::new().unwrap();
        let context = retriever(&dir)
            .retrieve_with_context("algebra", "physics", 5, None, true)
            .await
            .unwrap();
        assert!(context.is_empty());
        assert!(context.context.is_empty());
        assert!(context.sources.is_empty());
    }

    #[tokio::test]
    async fn test_sources_can_be_omitted() {
        let dir = TempDir::new().unwrap();
        let context = retriever(&dir)
            .retrieve_with_context("algebra", "math", 1, None, false)
            .await
            .unwrap();
        assert!(context.sources.is_empty());
        assert_eq!(context.chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_multi_subject_keeps_subjects_apart() {
        let dir = TempDir::new().unwrap();
        let subjects = vec!["math".to_string(), "physics".to_string()];
        let results = retriever(&dir)
            .retrieve_multi_subject("algebra", &subjects, 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results["math"].len(), 2);
        assert!(results["physics"].is_empty());
    }

    #[tokio::test]
    async fn test_similar_chunks_exclude_self() {
        let dir = TempDir::new().unwrap();
        let retriever = retriever(&dir);

        let similar = retriever
            .get_similar_chunks("algebra basics", "math", 1, true)
            .await
            .unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].content, "calculus basics");
        assert_eq!(similar[0].rank, 1);

        let with_self = retriever
            .get_similar_chunks("algebra basics", "math", 1, false)
            .await
            .unwrap();
        assert_eq!(with_self[0].content, "algebra basics");
    }

    #[tokio::test]
    async fn test_empty_query_is_invalid() {
        let dir = TempDir::new().unwrap();
        let err = retriever(&dir).retrieve("  ", "math", 3, None).await.unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(VectorStoreManager::new(dir.path(), 2).unwrap());
        let retriever = Retriever::new(manager, Arc::new(FailingProvider));

        let err = retriever.retrieve("algebra", "math", 3, None).await.unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Embedding(EmbeddingError::Timeout)
        ));
    }
}
