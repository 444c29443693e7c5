//! Ollama client implementation
//!
//! Async HTTP client for the Ollama chat API with image attachments and
//! streaming support.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::core::{Config, Message, PilotError, Result};
use crate::llm::traits::{GenerateOptions, LLMProvider, LLMResponse, StreamCallback, TokenUsage};

/// Ollama API client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    stream: bool,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama chat response (non-streaming)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: OllamaMessage,
    model: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Ollama streaming chunk response
#[derive(Debug, Deserialize)]
struct StreamChunkResponse {
    #[serde(default)]
    message: Option<StreamMessage>,
    model: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Message in streaming response
#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

/// Ollama models list response
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Model information
#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client with default configuration
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Create a new Ollama client from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::build(config.ollama_url(), config.ollama.timeout_secs)
    }

    /// Create a client with custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::build(base_url.into(), 120)
    }

    fn build(base_url: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, base_url }
    }

    /// Convert internal Message to Ollama format
    fn to_ollama_message(msg: &Message) -> OllamaMessage {
        OllamaMessage {
            role: msg.role.clone(),
            content: msg.content.clone(),
            images: msg.images.clone(),
        }
    }

    fn build_request<'a>(
        model: &'a str,
        messages: &[Message],
        options: Option<GenerateOptions>,
        stream: bool,
    ) -> ChatRequest<'a> {
        let json_mode = options.as_ref().map(|o| o.json_mode).unwrap_or(false);
        ChatRequest {
            model,
            messages: messages.iter().map(Self::to_ollama_message).collect(),
            format: json_mode.then_some("json"),
            options: options.map(|opts| OllamaOptions {
                temperature: opts.temperature,
                num_predict: opts.max_tokens,
            }),
            stream,
        }
    }

    fn usage(prompt: Option<u32>, completion: Option<u32>) -> Option<TokenUsage> {
        match (prompt, completion) {
            (Some(prompt), Some(completion)) => Some(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }),
            _ => None,
        }
    }

    /// POST a chat request and check the status code
    async fn send_chat(&self, model: &str, request: &ChatRequest<'_>) -> Result<reqwest::Response> {
        debug!(
            model,
            messages = request.messages.len(),
            stream = request.stream,
            "sending chat request"
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    PilotError::ollama(format!(
                        "Cannot connect to Ollama at {}. Is it running?",
                        self.base_url
                    ))
                } else {
                    PilotError::from(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 404 && error_text.contains("not found") {
                return Err(PilotError::ModelNotFound(model.to_string()));
            }

            return Err(PilotError::ollama(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let request = Self::build_request(model, messages, options, false);
        let response = self.send_chat(model, &request).await?;

        let response_text = response.text().await?;
        debug!(bytes = response_text.len(), "chat response received");

        let chat_response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| PilotError::ollama(format!("Failed to parse response: {}", e)))?;

        Ok(LLMResponse {
            content: chat_response.message.content,
            usage: Self::usage(chat_response.prompt_eval_count, chat_response.eval_count),
            model: chat_response.model,
        })
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
        on_token: StreamCallback,
    ) -> Result<LLMResponse> {
        let request = Self::build_request(model, messages, options, true);
        let response = self.send_chat(model, &request).await?;

        let mut full_content = String::new();
        let mut final_model = model.to_string();
        let mut prompt_tokens: Option<u32> = None;
        let mut completion_tokens: Option<u32> = None;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        let mut handle_line = |line: &str| match serde_json::from_str::<StreamChunkResponse>(line) {
            Ok(chunk_response) => {
                final_model = chunk_response.model;

                if let Some(msg) = chunk_response.message {
                    if !msg.content.is_empty() {
                        on_token(&msg.content);
                        full_content.push_str(&msg.content);
                    }
                }

                if chunk_response.done {
                    prompt_tokens = chunk_response.prompt_eval_count;
                    completion_tokens = chunk_response.eval_count;
                }
            }
            Err(e) => debug!("skipping unparseable stream line: {}", e),
        };

        while let Some(chunk_result) = stream.next().await {
            let chunk =
                chunk_result.map_err(|e| PilotError::ollama(format!("Stream error: {}", e)))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Process complete JSON lines from buffer
            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer[..newline_pos].trim().to_string();
                buffer.drain(..=newline_pos);

                if !line.is_empty() {
                    handle_line(&line);
                }
            }
        }

        if !buffer.trim().is_empty() {
            handle_line(buffer.trim());
        }

        Ok(LLMResponse {
            content: full_content,
            usage: Self::usage(prompt_tokens, completion_tokens),
            model: final_model,
        })
    }

    async fn is_model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|m| m == model || m.split(':').next() == model.split(':').next()))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    PilotError::ollama(format!(
                        "Cannot connect to Ollama at {}. Is it running?",
                        self.base_url
                    ))
                } else {
                    PilotError::from(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(PilotError::ollama("Failed to list models"));
        }

        let models_response: ModelsResponse = response.json().await?;
        Ok(models_response.models.into_iter().map(|m| m.name).collect())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
