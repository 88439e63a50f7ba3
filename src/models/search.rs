//! Retrieval-related models: ranked results, formatted context and store statistics.

use serde::{Deserialize, Serialize};

use super::document::ChunkMetadata;

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
    /// Documentation-friendly Markdown format
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// A single ranked chunk returned by a subject store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Chunk text
    pub content: String,

    /// Chunk metadata (content is not repeated here)
    pub metadata: ChunkMetadata,

    /// Squared L2 distance to the query. Lower is more similar.
    pub score: f32,

    /// 1-based position in the result list
    pub rank: u32,
}

/// Citation entry accompanying a formatted context block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub rank: u32,
    pub score: f32,
    pub source: String,
    pub subject: String,
    pub chunk_id: u32,
}

impl SourceInfo {
    pub fn from_result(result: &RetrievalResult, fallback_subject: &str) -> Self {
        let document = &result.metadata.document;
        let source = if document.source.is_empty() {
            "Unknown".to_string()
        } else {
            document.source.clone()
        };
        let subject = if document.subject.is_empty() {
            fallback_subject.to_string()
        } else {
            document.subject.clone()
        };
        Self {
            rank: result.rank,
            score: result.score,
            source,
            subject,
            chunk_id: result.metadata.chunk_id,
        }
    }
}

/// Grounding material for a generation call.
///
/// An empty context means no answer can be grounded; it is not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub context: String,
    pub sources: Vec<SourceInfo>,
    pub chunks: Vec<RetrievalResult>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Per-subject store statistics. `total_vectors` and `total_metadata` are always equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub subject: String,
    pub total_vectors: usize,
    pub embedding_dim: usize,
    pub total_metadata: usize,
}
