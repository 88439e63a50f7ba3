mod config;
mod document;
mod search;

pub use config::{
    ChunkingConfig, Config, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
    DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_URL, DEFAULT_TOP_K, EmbeddingBackend,
    EmbeddingConfig, RetrievalConfig, TokenizerConfig, VectorStoreConfig,
};
pub use document::{Chunk, ChunkMetadata, Document, DocumentMetadata, EmbeddedChunk};
pub use search::{OutputFormat, RetrievalResult, RetrievedContext, SourceInfo, StoreStats};
