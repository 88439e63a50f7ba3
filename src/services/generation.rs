//! Contract for answer generation over retrieved context.
//!
//! Only prompt construction and the request/response shapes live here. A
//! concrete model client implements [`GenerationProvider`] elsewhere.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub query: String,
    pub context: String,
    pub subject: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Overrides [`default_system_prompt`] when set.
    pub system_prompt: Option<String>,
}

impl GenerationRequest {
    pub fn new(
        query: impl Into<String>,
        context: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            context: context.into(),
            subject: subject.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// System prompt to send: the override or the subject default.
    pub fn resolved_system_prompt(&self) -> String {
        self.system_prompt
            .clone()
            .unwrap_or_else(|| default_system_prompt(&self.subject))
    }

    /// User message combining the query with the retrieved context.
    pub fn user_prompt(&self) -> String {
        build_rag_prompt(&self.query, &self.context, &self.subject)
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.query.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("query is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(GenerationError::InvalidRequest(format!(
                "temperature {} is outside 0..=1",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(GenerationError::InvalidRequest(
                "max_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub answer: String,
    pub usage: TokenUsage,
}

/// Produces an answer for a grounded request.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError>;
}

pub fn default_system_prompt(subject: &str) -> String {
    format!(
        "You are an expert {subject} tutor who helps students understand {subject} concepts clearly.

Guidelines:
1. Answer only from the provided context documents.
2. Say so explicitly when the context is not enough to answer fully.
3. Explain step by step and use examples where they help.
4. Point out missing prerequisites gently.
5. Redirect questions outside {subject} back to {subject} topics.
6. Never invent information that is not in the context.

Start with a direct answer, then give the reasoning with any relevant formulas, \
definitions or principles from the context, and close with a short key takeaway."
    )
}

/// User message for a RAG call. Blank context yields the "no materials" variant.
pub fn build_rag_prompt(query: &str, context: &str, subject: &str) -> String {
    if context.trim().is_empty() {
        return format!(
            "Question about {subject}:
{query}

Note: no relevant context documents were found. Explain that specific {subject} \
materials are needed for an accurate answer, and ask the student to rephrase the \
question or check that the course materials have been uploaded."
        );
    }

    format!(
        "Using the following context from {subject} course materials, answer the student's question.

Context Documents:
{context}

Student's Question:
{query}

Give a clear, educational answer based on the context above."
    )
}

/// Prompt asking for `count` numbered follow-up questions.
pub fn build_follow_up_prompt(query: &str, answer: &str, subject: &str, count: usize) -> String {
    format!(
        "Based on this {subject} question and answer, write {count} follow-up questions \
that help the student deepen their understanding.

Original Question: {query}

Answer Given: {answer}

The questions should build on the concepts discussed and explore related topics \
at a level suitable for a {subject} student.

Return only the questions, one per line, numbered 1-{count}."
    )
}

/// Extract numbered questions from a follow-up response, without their numbers.
pub fn parse_follow_up_questions(text: &str, count: usize) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.chars().take(3).any(|c| c.is_ascii_digit()))
        .map(|line| match line.split_once('.') {
            Some((_, rest)) => rest.trim().to_string(),
            None => line.to_string(),
        })
        .take(count)
        .collect()
}
