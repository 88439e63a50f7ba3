//! Document loaders feeding the chunker.

mod local;

pub use local::{LocalSource, SUPPORTED_EXTENSIONS};
