//! Token-bounded document chunking with deterministic overlap.
//!
//! Documents are split on paragraph boundaries and greedily packed into
//! chunks of at most `chunk_size` tokens. Each chunk after the first is
//! seeded with the trailing `chunk_overlap` tokens of the previous one.
//! Paragraphs that do not fit on their own fall back to sentence packing,
//! and sentences that do not fit fall back to word packing.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info};

use crate::error::{ChunkError, ConfigError, TokenizerError};
use crate::models::{Chunk, ChunkMetadata, ChunkingConfig, Document};
use crate::services::tokenizer::{SimpleTokenizer, TokenCounter, token_tail};

/// Words carried into the next chunk when a sentence has to be split by words.
pub const WORD_OVERLAP: usize = 20;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SENTENCE_SEPARATOR: &str = " ";

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph pattern is valid"));

/// Splits documents into overlapping, token-bounded chunks.
#[derive(Clone)]
pub struct TextChunker {
    /// Maximum tokens per chunk
    chunk_size: usize,
    /// Tokens repeated from the previous chunk
    chunk_overlap: usize,
    tokenizer: Arc<dyn TokenCounter>,
}

impl TextChunker {
    /// Create a chunker, rejecting `chunk_overlap >= chunk_size`.
    pub fn new(
        config: &ChunkingConfig,
        tokenizer: Arc<dyn TokenCounter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            chunk_size: config.chunk_size as usize,
            chunk_overlap: config.chunk_overlap as usize,
            tokenizer,
        })
    }

    /// Create a chunker with default sizes and the built-in word tokenizer.
    pub fn with_defaults() -> Self {
        let config = ChunkingConfig::default();
        Self {
            chunk_size: config.chunk_size as usize,
            chunk_overlap: config.chunk_overlap as usize,
            tokenizer: Arc::new(SimpleTokenizer::new()),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
        self.tokenizer.count_tokens(text)
    }

    /// Chunk one document. Empty or whitespace-only content yields no chunks.
    pub fn chunk(&self, document: &Document) -> Result<Vec<Chunk>, ChunkError> {
        let pieces = self.split_text(&document.content)?;
        let total_chunks = pieces.len() as u32;

        let chunks = pieces
            .into_iter()
            .enumerate()
            .map(|(idx, content)| {
                let tokens = self.count_tokens(&content)? as u32;
                Ok(Chunk {
                    content,
                    metadata: ChunkMetadata {
                        document: document.metadata.clone(),
                        chunk_id: idx as u32,
                        total_chunks,
                        tokens,
                    },
                })
            })
            .collect::<Result<Vec<_>, TokenizerError>>()?;

        info!(
            "Split {} into {} chunks",
            display_source(document),
            chunks.len()
        );
        Ok(chunks)
    }

    /// Chunk several documents, concatenating their chunks in input order.
    pub fn chunk_all(&self, documents: &[Document]) -> Result<Vec<Chunk>, ChunkError> {
        let mut all_chunks = Vec::new();
        for document in documents {
            all_chunks.extend(self.chunk(document)?);
        }
        Ok(all_chunks)
    }

    /// Paragraph-level greedy packing.
    fn split_text(&self, content: &str) -> Result<Vec<String>, TokenizerError> {
        let mut chunks = Vec::new();
        let mut buffer = String::new();

        for paragraph in split_paragraphs(content) {
            let paragraph_tokens = self.count_tokens(paragraph)?;

            if paragraph_tokens > self.chunk_size {
                flush(&mut chunks, &mut buffer);
                debug!(
                    "Paragraph of {} tokens exceeds chunk size, splitting by sentence",
                    paragraph_tokens
                );
                chunks.extend(self.split_sentences(paragraph)?);
                continue;
            }

            if buffer.is_empty() {
                buffer.push_str(paragraph);
                continue;
            }

            let candidate = format!("{buffer}{PARAGRAPH_SEPARATOR}{paragraph}");
            if self.count_tokens(&candidate)? > self.chunk_size {
                let seed = self.overlap_seed(&buffer, paragraph, PARAGRAPH_SEPARATOR)?;
                flush(&mut chunks, &mut buffer);
                buffer = seed;
            } else {
                buffer = candidate;
            }
        }

        flush(&mut chunks, &mut buffer);
        Ok(chunks)
    }

    /// Sentence-level packing for a paragraph larger than `chunk_size`.
    fn split_sentences(&self, paragraph: &str) -> Result<Vec<String>, TokenizerError> {
        let mut chunks = Vec::new();
        let mut buffer = String::new();

        for sentence in split_sentences(paragraph) {
            if self.count_tokens(sentence)? > self.chunk_size {
                flush(&mut chunks, &mut buffer);
                chunks.extend(self.split_words(sentence)?);
                continue;
            }

            if buffer.is_empty() {
                buffer.push_str(sentence);
                continue;
            }

            let candidate = format!("{buffer}{SENTENCE_SEPARATOR}{sentence}");
            if self.count_tokens(&candidate)? > self.chunk_size {
                let seed = self.overlap_seed(&buffer, sentence, SENTENCE_SEPARATOR)?;
                flush(&mut chunks, &mut buffer);
                buffer = seed;
            } else {
                buffer = candidate;
            }
        }

        flush(&mut chunks, &mut buffer);
        Ok(chunks)
    }

    /// Word-level packing for a single sentence larger than `chunk_size`.
    ///
    /// Up to [`WORD_OVERLAP`] trailing words of each chunk, and no more than
    /// `chunk_overlap` tokens of them, start the next one. A single word
    /// longer than `chunk_size` becomes its own chunk.
    fn split_words(&self, sentence: &str) -> Result<Vec<String>, TokenizerError> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_tokens = 0;

        for word in sentence.split_whitespace() {
            let word_tokens = self.count_tokens(word)?;

            if current.is_empty() {
                current.push(word);
                current_tokens = word_tokens;
                continue;
            }

            current.push(word);
            current_tokens += word_tokens;
            if current_tokens <= self.chunk_size {
                continue;
            }

            // The running sum is an estimate; joined text decides.
            current_tokens = self.count_tokens(&current.join(" "))?;
            if current_tokens <= self.chunk_size {
                continue;
            }

            current.pop();
            chunks.push(current.join(" "));

            let keep = current.len().min(WORD_OVERLAP);
            let mut carried = current.split_off(current.len() - keep);
            while !carried.is_empty()
                && self.count_tokens(&carried.join(" "))? > self.chunk_overlap
            {
                carried.remove(0);
            }
            carried.push(word);
            current_tokens = self.count_tokens(&carried.join(" "))?;
            while carried.len() > 1 && current_tokens > self.chunk_size {
                carried.remove(0);
                current_tokens = self.count_tokens(&carried.join(" "))?;
            }
            current = carried;
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
        Ok(chunks)
    }

    /// Start of the next chunk: the previous chunk's trailing tokens, then `next`.
    ///
    /// Uses the last `chunk_overlap` tokens of `previous`, fewer if the seed
    /// would otherwise exceed `chunk_size`. `next` must fit on its own.
    fn overlap_seed(
        &self,
        previous: &str,
        next: &str,
        separator: &str,
    ) -> Result<String, TokenizerError> {
        let previous_tokens = self.tokenizer.encode(previous)?;
        let next_tokens = self.count_tokens(next)?;
        let mut keep = self
            .chunk_overlap
            .min(self.chunk_size.saturating_sub(next_tokens));

        while keep > 0 {
            let tail = token_tail(previous, &previous_tokens, keep);
            let seed = format!("{tail}{separator}{next}");
            if self.count_tokens(&seed)? <= self.chunk_size {
                return Ok(seed);
            }
            keep -= 1;
        }
        Ok(next.to_string())
    }
}

impl std::fmt::Debug for TextChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextChunker")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish_non_exhaustive()
    }
}

fn display_source(document: &Document) -> &str {
    if document.metadata.source.is_empty() {
        "document"
    } else {
        &document.metadata.source
    }
}

/// Move a non-empty buffer into `chunks`, trimmed.
fn flush(chunks: &mut Vec<String>, buffer: &mut String) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    buffer.clear();
}

/// Split on one or more blank lines, dropping empty paragraphs.
fn split_paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|(_, next)| next.is_whitespace());
        if !at_boundary {
            continue;
        }

        sentences.push(&text[start..idx + c.len_utf8()]);
        while chars.peek().is_some_and(|(_, next)| next.is_whitespace()) {
            chars.next();
        }
        start = chars.peek().map_or(text.len(), |(i, _)| *i);
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    fn chunker(size: u32, overlap: u32) -> TextChunker {
        TextChunker::new(
            &ChunkingConfig::new(size, overlap),
            Arc::new(SimpleTokenizer::new()),
        )
        .unwrap()
    }

    fn document(content: &str) -> Document {
        Document::new(content, DocumentMetadata::new("notes.txt", "math", "txt"))
    }

    /// `count` distinct words, `prefix0 prefix1 ...`.
    fn words(prefix: &str, count: usize) -> String {
        (0..count)
            .map(|i| format!("{prefix}{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn token_ids(text: &str) -> Vec<u32> {
        SimpleTokenizer::new()
            .encode(text)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect()
    }

    fn non_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        let tok: Arc<dyn TokenCounter> = Arc::new(SimpleTokenizer::new());
        assert!(TextChunker::new(&ChunkingConfig::new(100, 100), tok.clone()).is_err());
        assert!(TextChunker::new(&ChunkingConfig::new(100, 150), tok).is_err());
    }

    #[test]
    fn test_empty_and_whitespace_documents() {
        let chunker = TextChunker::with_defaults();
        assert!(chunker.chunk(&document("")).unwrap().is_empty());
        assert!(chunker.chunk(&document("  \n\n\t \n ")).unwrap().is_empty());
    }

    #[test]
    fn test_small_document_single_chunk() {
        let chunker = TextChunker::with_defaults();
        let chunks = chunker.chunk(&document("Hello, world!")).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello, world!");
        assert_eq!(chunks[0].metadata.chunk_id, 0);
        assert_eq!(chunks[0].metadata.total_chunks, 1);
        assert_eq!(chunks[0].metadata.tokens, 4);
        assert_eq!(chunks[0].metadata.document.subject, "math");
    }

    #[test]
    fn test_paragraphs_that_fit_are_joined() {
        let chunker = chunker(50, 5);
        let chunks = chunker
            .chunk(&document("First paragraph.\n\n\n   \nSecond paragraph."))
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn test_two_large_paragraphs_scenario() {
        let chunker = chunker(800, 100);
        let first = words("a", 500);
        let second = words("b", 500);
        let chunks = chunker
            .chunk(&document(&format!("{first}\n\n{second}")))
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.chunk_id, 0);
        assert_eq!(chunks[1].metadata.chunk_id, 1);
        assert!(chunks.iter().all(|c| c.metadata.total_chunks == 2));
        assert_eq!(chunks[0].metadata.tokens, 500);
        assert_eq!(chunks[1].metadata.tokens, 600);
        assert!(chunks[1].content.starts_with("a400 a401"));
        assert!(chunks[1].content.ends_with(&second));
    }

    #[test]
    fn test_overlap_matches_previous_tail_tokens() {
        let chunker = chunker(60, 10);
        let paragraphs: Vec<String> = (0..6).map(|i| words(&format!("p{i}w"), 30)).collect();
        let chunks = chunker.chunk(&document(&paragraphs.join("\n\n"))).unwrap();

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let previous = token_ids(&pair[0].content);
            let next = token_ids(&pair[1].content);
            assert_eq!(next[..10], previous[previous.len() - 10..]);
        }
    }

    #[test]
    fn test_chunks_never_exceed_size() {
        let chunker = chunker(40, 8);
        let mut text = String::new();
        for i in 0..12 {
            text.push_str(&words(&format!("x{i}_"), 7 + i * 3));
            text.push_str(". End of part.\n\n");
        }
        let chunks = chunker.chunk(&document(&text)).unwrap();
        for chunk in &chunks {
            assert!(chunk.metadata.tokens <= 40, "chunk too large: {}", chunk.content);
            assert_eq!(chunk.metadata.tokens as usize, chunker.count_tokens(&chunk.content).unwrap());
        }
    }

    #[test]
    fn test_overlap_shrinks_when_next_paragraph_is_large() {
        let chunker = chunker(20, 10);
        let text = format!("{}\n\n{}", words("a", 15), words("b", 15));
        let chunks = chunker.chunk(&document(&text)).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].metadata.tokens, 20);
        assert!(chunks[1].content.starts_with("a10 a11 a12 a13 a14\n\nb0"));
    }

    #[test]
    fn test_large_paragraph_splits_by_sentence() {
        let chunker = chunker(12, 3);
        let paragraph = "One two three four five. Six seven eight nine ten! \
                         Eleven twelve thirteen fourteen? Fifteen sixteen seventeen.";
        let chunks = chunker.chunk(&document(paragraph)).unwrap();

        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].content, "One two three four five. Six seven eight nine ten!");
        assert!(chunks[1].content.starts_with("nine ten!"));
        for chunk in &chunks {
            assert!(chunk.metadata.tokens <= 12);
        }
    }

    #[test]
    fn test_long_sentence_splits_by_words_with_overlap() {
        let chunker = chunker(30, 25);
        let sentence = words("w", 70);
        let chunks = chunker.chunk(&document(&sentence)).unwrap();

        assert!(chunks.len() >= 3);
        assert_eq!(chunks[0].content, words("w", 30));
        let second: Vec<&str> = chunks[1].content.split_whitespace().collect();
        assert_eq!(second[0], "w10");
        assert_eq!(second[WORD_OVERLAP], "w30");
        for chunk in &chunks {
            assert!(chunk.metadata.tokens <= 30);
        }
    }

    #[test]
    fn test_oversized_single_word_is_forced_chunk() {
        let chunker = chunker(3, 1);
        let chunks = chunker.chunk(&document("a-b-c-d-e tail")).unwrap();
        assert_eq!(chunks[0].content, "a-b-c-d-e");
        assert!(chunks[0].metadata.tokens > 3);
        assert_eq!(chunks.last().unwrap().content, "tail");
    }

    #[test]
    fn test_no_content_is_lost() {
        let chunker = chunker(25, 5);
        let text = format!(
            "{}\n\n{}. {}!\n\n\n{}\n\nShort closing line.",
            words("intro", 12),
            words("s", 20),
            words("t", 18),
            words("long", 60)
        );
        let chunks = chunker.chunk(&document(&text)).unwrap();

        let joined = non_whitespace(
            &chunks
                .iter()
                .map(|c| c.content.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        );
        for word in text.split_whitespace() {
            assert!(joined.contains(&non_whitespace(word)), "lost {word}");
        }
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let chunker = chunker(15, 4);
        let doc = document(&format!("{}\n\n{}", words("a", 12), words("b", 12)));
        assert_eq!(chunker.chunk(&doc).unwrap(), chunker.chunk(&doc).unwrap());
    }

    #[test]
    fn test_chunk_all_preserves_document_order() {
        let chunker = chunker(10, 2);
        let first = Document::new(words("a", 25), DocumentMetadata::new("a.txt", "math", "txt"));
        let second = Document::new("tiny", DocumentMetadata::new("b.txt", "math", "txt"));
        let chunks = chunker.chunk_all(&[first, second]).unwrap();

        let a_count = chunks.iter().filter(|c| c.source() == "a.txt").count();
        assert!(a_count > 1);
        assert_eq!(chunks.last().unwrap().source(), "b.txt");
        assert_eq!(chunks.last().unwrap().metadata.chunk_id, 0);
        for (i, chunk) in chunks[..a_count].iter().enumerate() {
            assert_eq!(chunk.metadata.chunk_id as usize, i);
            assert_eq!(chunk.metadata.total_chunks as usize, a_count);
        }
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("Hi there. How are you?  Fine!\nOk"),
            vec!["Hi there.", "How are you?", "Fine!", "Ok"]
        );
        assert_eq!(split_sentences("v1.2 is out."), vec!["v1.2 is out."]);
    }
}
