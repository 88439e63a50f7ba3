//! Tokenizer adapters used by the chunker to measure text and cut overlap tails.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokenizers::Tokenizer;
use tracing::info;

use crate::error::TokenizerError;
use crate::models::TokenizerConfig;

static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|[^\w\s]").expect("word pattern is valid"));

/// A token and the byte span of source text it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub id: u32,
    pub start: usize,
    pub end: usize,
}

/// Counts text in units of a fixed vocabulary.
pub trait TokenCounter: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<Token>, TokenizerError>;

    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(self.encode(text)?.len())
    }
}

/// Text covered by the last `n` of `tokens`, the encoding of `text`.
///
/// The text is sliced from the first kept token's start offset, so the result
/// re-encodes to the same trailing tokens. Text with at most `n` tokens is
/// returned whole.
pub fn token_tail<'a>(text: &'a str, tokens: &[Token], n: usize) -> &'a str {
    if tokens.len() <= n {
        return text;
    }
    if n == 0 {
        return "";
    }
    let start = tokens[tokens.len() - n].start;
    text.get(start..).unwrap_or(text)
}

/// Offline tokenizer: every word and every punctuation mark is one token.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleTokenizer;

impl SimpleTokenizer {
    pub fn new() -> Self {
        Self
    }
}

impl TokenCounter for SimpleTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<Token>, TokenizerError> {
        Ok(WORD_PATTERN
            .find_iter(text)
            .map(|m| Token {
                id: piece_id(m.as_str()),
                start: m.start(),
                end: m.end(),
            })
            .collect())
    }

    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(WORD_PATTERN.find_iter(text).count())
    }
}

/// FNV-1a over the token text; stable across runs.
fn piece_id(piece: &str) -> u32 {
    piece.bytes().fold(0x811c_9dc5_u32, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}

/// Adapter over a HuggingFace `tokenizer.json` vocabulary.
pub struct HfTokenizer {
    inner: Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, TokenizerError> {
        let load_error = |reason: String| TokenizerError::LoadError {
            path: path.to_path_buf(),
            reason,
        };

        let mut inner = Tokenizer::from_file(path).map_err(|e| load_error(e.to_string()))?;

        // Counting must see the whole text, so strip any baked-in limits.
        inner
            .with_truncation(None)
            .map_err(|e| load_error(e.to_string()))?;
        inner.with_padding(None);

        Ok(Self { inner })
    }
}

impl TokenCounter for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<Token>, TokenizerError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TokenizerError::EncodeError(e.to_string()))?;

        Ok(encoding
            .get_ids()
            .iter()
            .zip(encoding.get_offsets())
            .map(|(&id, &(start, end))| Token { id, start, end })
            .collect())
    }
}

impl std::fmt::Debug for HfTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenizer")
            .field("vocab_size", &self.inner.get_vocab_size(true))
            .finish()
    }
}

/// Build the tokenizer named by the configuration.
pub fn load_tokenizer(config: &TokenizerConfig) -> Result<Arc<dyn TokenCounter>, TokenizerError> {
    match config.path {
        Some(ref path) => {
            info!("Loading tokenizer from {}", path.display());
            Ok(Arc::new(HfTokenizer::from_file(path)?))
        }
        None => Ok(Arc::new(SimpleTokenizer::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tokenizer_counts_words_and_punctuation() {
        let tok = SimpleTokenizer::new();
        assert_eq!(tok.count_tokens("Hello, world!").unwrap(), 4);
        assert_eq!(tok.count_tokens("").unwrap(), 0);
        assert_eq!(tok.count_tokens("   \n\n ").unwrap(), 0);
        assert_eq!(tok.encode("a b").unwrap()[1].start, 2);
    }

    #[test]
    fn test_piece_id_is_stable() {
        let tok = SimpleTokenizer::new();
        let a = tok.encode("force").unwrap();
        let b = tok.encode("net force").unwrap();
        assert_eq!(a[0].id, b[1].id);
        assert_ne!(b[0].id, b[1].id);
    }

    fn tail(text: &str, n: usize) -> String {
        let tokens = SimpleTokenizer::new().encode(text).unwrap();
        token_tail(text, &tokens, n).to_string()
    }

    #[test]
    fn test_tail_returns_last_tokens() {
        assert_eq!(tail("one two three four", 2), "three four");
        assert_eq!(tail("end of line.", 1), ".");
    }

    #[test]
    fn test_tail_short_text_is_verbatim() {
        assert_eq!(tail("  short text ", 5), "  short text ");
        assert_eq!(tail("two words", 0), "");
    }

    #[test]
    fn test_tail_reencodes_to_same_tokens() {
        let tok = SimpleTokenizer::new();
        let text = "Momentum is conserved. Energy, too!";
        let kept = tail(text, 4);
        let original: Vec<u32> = tok.encode(text).unwrap().iter().map(|t| t.id).collect();
        let reencoded: Vec<u32> = tok.encode(&kept).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(reencoded, original[original.len() - 4..]);
    }

    #[test]
    fn test_load_tokenizer_default_is_simple() {
        let tok = load_tokenizer(&TokenizerConfig::default()).unwrap();
        assert_eq!(tok.count_tokens("x y z").unwrap(), 3);
    }

    #[test]
    fn test_hf_tokenizer_missing_file() {
        let err = HfTokenizer::from_file(Path::new("/nonexistent/tokenizer.json")).unwrap_err();
        assert!(matches!(err, TokenizerError::LoadError { .. }));
    }
}
