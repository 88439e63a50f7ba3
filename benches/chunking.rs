use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

use subject_rag::models::{ChunkingConfig, Document, DocumentMetadata};
use subject_rag::services::{SimpleTokenizer, TextChunker};

fn lecture_notes(paragraphs: usize) -> String {
    (0..paragraphs)
        .map(|i| {
            format!(
                "Section {i}. A derivative measures how a function changes as its input changes. \
                 The limit definition compares the change in output to a shrinking change in input. \
                 Worked example {i} applies the power rule, then the chain rule, to a composite polynomial."
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let document = Document::new(
        lecture_notes(400),
        DocumentMetadata::new("calculus.txt", "math", "txt"),
    );

    let defaults = TextChunker::with_defaults();
    c.bench_function("chunk_default", |b| {
        b.iter(|| defaults.chunk(black_box(&document)))
    });

    let small = TextChunker::new(
        &ChunkingConfig::new(64, 16),
        Arc::new(SimpleTokenizer::new()),
    )
    .expect("valid chunking config");
    c.bench_function("chunk_small_windows", |b| {
        b.iter(|| small.chunk(black_box(&document)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
