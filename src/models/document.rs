use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Plain-text document produced by a loader, consumed only by the chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Originating document name, e.g. `calculus.txt`.
    pub source: String,
    pub subject: String,
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Loader-specific keys carried through to every chunk.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A bounded slice of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(flatten)]
    pub document: DocumentMetadata,
    /// 0-based position of the chunk within its document.
    pub chunk_id: u32,
    pub total_chunks: u32,
    pub tokens: u32,
}

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

impl DocumentMetadata {
    pub fn new(
        source: impl Into<String>,
        subject: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            subject: subject.into(),
            file_type: file_type.into(),
            file_path: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl Chunk {
    pub fn subject(&self) -> &str {
        &self.metadata.document.subject
    }

    pub fn source(&self) -> &str {
        &self.metadata.document.source
    }
}

impl EmbeddedChunk {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self { chunk, embedding }
    }

    pub fn subject(&self) -> &str {
        self.chunk.subject()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_metadata_round_trips_flat() {
        let meta = DocumentMetadata::new("notes.txt", "math", "txt")
            .with_extra("author", serde_json::json!("Ada"));
        let chunk_meta = ChunkMetadata {
            document: meta,
            chunk_id: 2,
            total_chunks: 5,
            tokens: 42,
        };

        let value = serde_json::to_value(&chunk_meta).unwrap();
        assert_eq!(value["source"], "notes.txt");
        assert_eq!(value["author"], "Ada");
        assert_eq!(value["chunk_id"], 2);

        let back: ChunkMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, chunk_meta);
    }

    #[test]
    fn test_subject_accessors() {
        let chunk = Chunk {
            content: "text".to_string(),
            metadata: ChunkMetadata {
                document: DocumentMetadata::new("a.txt", "physics", "txt"),
                chunk_id: 0,
                total_chunks: 1,
                tokens: 1,
            },
        };
        assert_eq!(chunk.subject(), "physics");
        assert_eq!(chunk.source(), "a.txt");
        assert_eq!(EmbeddedChunk::new(chunk, vec![0.0]).subject(), "physics");
    }
}
