/// LLM completion abstraction
///
/// Background tasks talk to an `LlmClient`; the concrete backend is chosen
/// once from configuration by [`build_llm_client`]. New backends implement
/// the trait and add a `LlmBackend` variant.
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

use crate::{
    config::{Config, LlmBackend},
    error::AppResult,
    models::Review,
};

pub mod ollama;

pub use ollama::OllamaClient;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the model's text completion for a system and user prompt
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> AppResult<String>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Resolves the configured backend
pub fn build_llm_client(config: &Config) -> AppResult<Arc<dyn LlmClient>> {
    match config.llm_backend {
        LlmBackend::Ollama => Ok(Arc::new(OllamaClient::new(
            config.ollama_base_url.clone(),
            config.ollama_model.clone(),
            std::time::Duration::from_secs(config.llm_timeout_secs),
        )?)),
    }
}

pub const BOOK_SUMMARY_SYSTEM: &str = "You are a professional librarian and literary analyst. \
    Your task is to produce concise, informative book summaries. \
    Focus on themes, writing style, and reader appeal. \
    Keep your summary under 300 words.";

pub const REVIEW_CONSENSUS_SYSTEM: &str = "You are a sentiment analyst for a library platform. \
    Given a list of reader reviews, synthesise a neutral, balanced consensus paragraph \
    that captures overall sentiment, recurring praise, and common criticisms. \
    Keep the consensus under 200 words.";

pub const SUMMARY_MAX_TOKENS: u32 = 400;
pub const CONSENSUS_MAX_TOKENS: u32 = 300;

const PROMPT_EXCERPT_CHARS: usize = 3000;
const PROMPT_MAX_REVIEWS: usize = 30;

pub fn build_summary_prompt(title: &str, author: &str, content_excerpt: &str) -> String {
    let excerpt: String = content_excerpt.chars().take(PROMPT_EXCERPT_CHARS).collect();
    format!(
        "Book: '{}' by {}\n\nContent excerpt:\n{}\n\nWrite an engaging summary of this book.",
        title, author, excerpt
    )
}

pub fn build_review_consensus_prompt(book_title: &str, reviews: &[Review]) -> String {
    let formatted = reviews
        .iter()
        .take(PROMPT_MAX_REVIEWS)
        .map(|r| format!("- Rating {}/5: {}", r.rating, r.body))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Book: {}\n\nReader reviews:\n{}\n\nWrite a consensus summary of reader sentiment.",
        book_title, formatted
    )
}
