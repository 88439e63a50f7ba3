//! Local file system document loader.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::SourceError;
use crate::models::{Document, DocumentMetadata};

/// File extensions loaded as plain text.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Loads plain-text course material from a file or directory tree.
#[derive(Debug)]
pub struct LocalSource {
    /// File or directory to scan
    root: PathBuf,

    /// Glob patterns matched against full paths
    exclude_patterns: Vec<glob::Pattern>,

    max_file_size: u64,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>, exclude_patterns: &[String]) -> Result<Self, SourceError> {
        let root = root.into();
        if !root.exists() {
            return Err(SourceError::NotFound(root));
        }

        let exclude_patterns = exclude_patterns
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|e| SourceError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root,
            exclude_patterns,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        })
    }

    #[must_use]
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Supported, non-excluded files under the root, sorted by path.
    pub fn collect_files(&self) -> Result<Vec<PathBuf>, SourceError> {
        if self.root.is_file() {
            return Ok(if is_supported(&self.root) {
                vec![self.root.clone()]
            } else {
                Vec::new()
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| SourceError::WalkError(e.to_string()))?;
            let path = entry.path();

            if !entry.file_type().is_file() || !is_supported(path) {
                continue;
            }

            let path_str = path.to_string_lossy();
            if self.exclude_patterns.iter().any(|p| p.matches(&path_str)) {
                debug!("Excluded {}", path.display());
                continue;
            }

            files.push(path.to_path_buf());
        }

        files.sort();
        Ok(files)
    }

    /// Read one file as a document tagged with `subject`.
    pub fn read_document(&self, path: &Path, subject: &str) -> Result<Document, SourceError> {
        let size = fs::metadata(path)
            .map_err(|e| SourceError::WalkError(format!("{}: {}", path.display(), e)))?
            .len();
        if size > self.max_file_size {
            return Err(SourceError::WalkError(format!(
                "{} exceeds maximum size: {} > {}",
                path.display(),
                size,
                self.max_file_size
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SourceError::WalkError(format!("{}: {}", path.display(), e)))?;

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let file_type = extension(path).unwrap_or_default();

        let metadata = DocumentMetadata::new(source, subject, file_type)
            .with_file_path(path.to_string_lossy())
            .with_extra("size_bytes", serde_json::json!(size));

        Ok(Document::new(content, metadata))
    }

    /// Load every supported file. Unreadable files are logged and skipped.
    pub fn load(&self, subject: &str) -> Result<Vec<Document>, SourceError> {
        let mut documents = Vec::new();

        for path in self.collect_files()? {
            match self.read_document(&path, subject) {
                Ok(document) => {
                    debug!("Loaded {}", path.display());
                    documents.push(document);
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        info!(
            "Loaded {} documents for subject '{}' from {}",
            documents.len(),
            subject,
            self.root.display()
        );
        Ok(documents)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}
