//! Subject-isolated retrieval-augmented generation core.
//!
//! Documents are chunked by token count, embedded, and stored in one flat L2
//! index per subject. Retrieval never crosses subject boundaries unless the
//! caller asks for several subjects explicitly.

pub mod cli;
pub mod error;
pub mod models;
pub mod services;
pub mod sources;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::AppError;
pub use models::{Config, OutputFormat};
pub use services::{Retriever, SubjectVectorStore, TextChunker, VectorStoreManager};
