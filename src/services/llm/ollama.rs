/// Ollama chat completion backend
///
/// Calls `POST {base_url}/api/chat` with streaming disabled and reads
/// `message.content` from the response.
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    services::llm::LlmClient,
};

#[derive(Clone)]
pub struct OllamaClient {
    http_client: HttpClient,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    options: ChatOptions,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn chat_request<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
        max_tokens: u32,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            stream: false,
            options: ChatOptions {
                num_predict: max_tokens,
            },
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> AppResult<String> {
        let url = format!("{}/api/chat", self.base_url);
        let request = self.chat_request(system_prompt, user_prompt, max_tokens);

        tracing::debug!(model = %self.model, max_tokens, "Requesting Ollama completion");

        let response = self.http_client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Ollama request failed");
            return Err(AppError::Llm(format!(
                "Ollama returned status {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response.json().await?;
        Ok(chat.message.content)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
