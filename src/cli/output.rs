use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{OutputFormat, RetrievalResult, RetrievedContext, StoreStats};

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_context(&self, query: &str, subject: &str, context: &RetrievedContext) -> String;
    fn format_results(&self, title: &str, subject: &str, results: &[RetrievalResult]) -> String;
    fn format_multi(&self, query: &str, results: &BTreeMap<String, Vec<RetrievalResult>>)
    -> String;
    fn format_stats(&self, stats: &[StoreStats]) -> String;
    fn format_ingest(&self, summary: &IngestSummary) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub subject: String,
    pub documents_loaded: u64,
    pub chunks_created: u64,
    pub chunks_added: u64,
    pub total_vectors: u64,
    pub duration_ms: u64,
}

fn preview(content: &str) -> String {
    let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

fn source_label(result: &RetrievalResult) -> String {
    let document = &result.metadata.document;
    let source = if document.source.is_empty() {
        "Unknown"
    } else {
        document.source.as_str()
    };
    format!("{} #{}", source, result.metadata.chunk_id)
}

pub struct TextFormatter;

impl TextFormatter {
    fn write_results(output: &mut String, results: &[RetrievalResult]) {
        for result in results {
            writeln!(
                output,
                "{}. [Distance: {:.4}] {}",
                result.rank,
                result.score,
                source_label(result)
            )
            .unwrap();
            writeln!(output, "   ---").unwrap();
            for line in preview(&result.content).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }
    }
}

impl Formatter for TextFormatter {
    fn format_context(&self, query: &str, subject: &str, context: &RetrievedContext) -> String {
        if context.is_empty() {
            return format!(
                "No grounding material in '{}' for: {}\n",
                subject, query
            );
        }

        let mut output = String::new();
        writeln!(output, "Context for: \"{}\" ({})", query, subject).unwrap();
        writeln!(output, "Found {} chunks\n", context.chunks.len()).unwrap();
        output.push_str(&context.context);
        writeln!(output).unwrap();

        if !context.sources.is_empty() {
            writeln!(output, "Sources").unwrap();
            writeln!(output, "-------").unwrap();
            for source in &context.sources {
                writeln!(
                    output,
                    "  [{}] {} (chunk {}, distance {:.4})",
                    source.rank, source.source, source.chunk_id, source.score
                )
                .unwrap();
            }
        }
        output
    }

    fn format_results(&self, title: &str, subject: &str, results: &[RetrievalResult]) -> String {
        if results.is_empty() {
            return format!("No results in '{}'\n", subject);
        }

        let mut output = String::new();
        writeln!(output, "{} ({})", title, subject).unwrap();
        writeln!(output, "Found {} results\n", results.len()).unwrap();
        Self::write_results(&mut output, results);
        output
    }

    fn format_multi(
        &self,
        query: &str,
        results: &BTreeMap<String, Vec<RetrievalResult>>,
    ) -> String {
        let mut output = String::new();
        writeln!(output, "Results for: \"{}\"\n", query).unwrap();
        for (subject, subject_results) in results {
            writeln!(output, "== {} ({} results) ==", subject, subject_results.len()).unwrap();
            Self::write_results(&mut output, subject_results);
        }
        output
    }

    fn format_stats(&self, stats: &[StoreStats]) -> String {
        if stats.is_empty() {
            return "No subject stores found.\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "Subject Stores").unwrap();
        writeln!(output, "--------------").unwrap();
        for s in stats {
            writeln!(
                output,
                "  {:<20} {:>8} vectors  dim {}",
                s.subject, s.total_vectors, s.embedding_dim
            )
            .unwrap();
        }
        output
    }

    fn format_ingest(&self, summary: &IngestSummary) -> String {
        let mut output = String::new();
        writeln!(output, "Ingest Complete ({})", summary.subject).unwrap();
        writeln!(output, "----------------").unwrap();
        writeln!(output, "Documents loaded: {}", summary.documents_loaded).unwrap();
        writeln!(output, "Chunks created: {}", summary.chunks_created).unwrap();
        writeln!(output, "Chunks added: {}", summary.chunks_added).unwrap();
        writeln!(output, "Total vectors: {}", summary.total_vectors).unwrap();
        writeln!(output, "Duration: {}ms", summary.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_context(&self, query: &str, subject: &str, context: &RetrievedContext) -> String {
        self.render(&serde_json::json!({
            "query": query,
            "subject": subject,
            "context": context.context,
            "sources": context.sources,
            "chunks": context.chunks,
        }))
    }

    fn format_results(&self, _title: &str, subject: &str, results: &[RetrievalResult]) -> String {
        self.render(&serde_json::json!({
            "subject": subject,
            "results": results,
        }))
    }

    fn format_multi(
        &self,
        query: &str,
        results: &BTreeMap<String, Vec<RetrievalResult>>,
    ) -> String {
        self.render(&serde_json::json!({
            "query": query,
            "subjects": results,
        }))
    }

    fn format_stats(&self, stats: &[StoreStats]) -> String {
        self.render(&serde_json::json!({ "subjects": stats }))
    }

    fn format_ingest(&self, summary: &IngestSummary) -> String {
        self.render(summary)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl MarkdownFormatter {
    fn write_results(output: &mut String, results: &[RetrievalResult]) {
        for result in results {
            writeln!(
                output,
                "### {}. Distance: {:.4}\n",
                result.rank, result.score
            )
            .unwrap();
            writeln!(output, "**Source:** `{}`\n", source_label(result)).unwrap();
            writeln!(output, "```").unwrap();
            writeln!(output, "{}", result.content).unwrap();
            writeln!(output, "```\n").unwrap();
        }
    }
}

impl Formatter for MarkdownFormatter {
    fn format_context(&self, query: &str, subject: &str, context: &RetrievedContext) -> String {
        if context.is_empty() {
            return format!(
                "## No grounding material\n\nSubject: `{}`\n\nQuery: `{}`\n",
                subject, query
            );
        }

        let mut output = String::new();
        writeln!(output, "## Context\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", query).unwrap();
        writeln!(output, "**Subject:** `{}`\n", subject).unwrap();
        Self::write_results(&mut output, &context.chunks);

        if !context.sources.is_empty() {
            writeln!(output, "## Sources\n").unwrap();
            writeln!(output, "| Rank | Source | Chunk | Distance |").unwrap();
            writeln!(output, "|------|--------|-------|----------|").unwrap();
            for source in &context.sources {
                writeln!(
                    output,
                    "| {} | `{}` | {} | {:.4} |",
                    source.rank, source.source, source.chunk_id, source.score
                )
                .unwrap();
            }
        }
        output
    }

    fn format_results(&self, title: &str, subject: &str, results: &[RetrievalResult]) -> String {
        if results.is_empty() {
            return format!("## No results\n\nSubject: `{}`\n", subject);
        }

        let mut output = String::new();
        writeln!(output, "## {}\n", title).unwrap();
        writeln!(output, "**Subject:** `{}`\n", subject).unwrap();
        Self::write_results(&mut output, results);
        output
    }

    fn format_multi(
        &self,
        query: &str,
        results: &BTreeMap<String, Vec<RetrievalResult>>,
    ) -> String {
        let mut output = String::new();
        writeln!(output, "## Results\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", query).unwrap();
        for (subject, subject_results) in results {
            writeln!(output, "## {}\n", subject).unwrap();
            if subject_results.is_empty() {
                writeln!(output, "*No results.*\n").unwrap();
            }
            Self::write_results(&mut output, subject_results);
        }
        output
    }

    fn format_stats(&self, stats: &[StoreStats]) -> String {
        if stats.is_empty() {
            return "## Subject Stores\n\n*No subject stores found.*\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "## Subject Stores\n").unwrap();
        writeln!(output, "| Subject | Vectors | Dimension |").unwrap();
        writeln!(output, "|---------|---------|-----------|").unwrap();
        for s in stats {
            writeln!(
                output,
                "| `{}` | {} | {} |",
                s.subject, s.total_vectors, s.embedding_dim
            )
            .unwrap();
        }
        output
    }

    fn format_ingest(&self, summary: &IngestSummary) -> String {
        let mut output = String::new();
        writeln!(output, "## Ingest Complete: `{}`\n", summary.subject).unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Documents loaded | {} |", summary.documents_loaded).unwrap();
        writeln!(output, "| Chunks created | {} |", summary.chunks_created).unwrap();
        writeln!(output, "| Chunks added | {} |", summary.chunks_added).unwrap();
        writeln!(output, "| Total vectors | {} |", summary.total_vectors).unwrap();
        writeln!(output, "| Duration | {}ms |", summary.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
