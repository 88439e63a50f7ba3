pub mod chunker;
pub mod embedding;
pub mod generation;
pub mod retriever;
pub mod tokenizer;
pub mod vector_store;

pub use chunker::TextChunker;
pub use embedding::{
    EmbeddingProvider, HttpEmbeddingClient, OnnxEmbedder, RetryingProvider, SharedEmbeddingProvider,
    create_provider, embed_chunks, embed_chunks_with_progress,
};
pub use generation::{
    GenerationProvider, GenerationRequest, GenerationResponse, TokenUsage, build_rag_prompt,
    default_system_prompt,
};
pub use retriever::Retriever;
pub use tokenizer::{HfTokenizer, SimpleTokenizer, TokenCounter, load_tokenizer};
pub use vector_store::{FlatL2Index, SubjectVectorStore, VectorStoreManager};
