//! Ollama Provider
//!
//! Local LLM server. Uses the chat endpoint with message history.
//!
//! # Ollama API
//!
//! - `/api/chat` - Chat completions with message history (streaming)
//! - `/api/tags` - List available models (used for health checks)
//!
//! Streaming responses are newline-delimited JSON objects carrying
//! `message.content` fragments and a final `done: true` object.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{chat_messages, ProviderClient, StreamToken};
use crate::config::GenerationParams;
use crate::conversation::Turn;

/// Ollama client.
pub struct OllamaClient {
    host: String,
    port: u16,
    model: String,
    params: GenerationParams,
    http_client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        model: impl Into<String>,
        params: GenerationParams,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            host: host.into(),
            port,
            model: model.into(),
            params,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?,
        })
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url())
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url())
    }

    fn request_body(&self, turns: &[Turn]) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": chat_messages(&self.params.system_prompt, turns),
            "stream": true,
            "options": {
                "temperature": self.params.temperature,
                "top_p": self.params.top_p,
                "repeat_penalty": self.params.repetition_penalty,
                "num_predict": self.params.max_tokens,
            },
        })
    }
}

#[async_trait]
impl ProviderClient for OllamaClient {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }

    async fn generate(&self, turns: &[Turn]) -> anyhow::Result<mpsc::Receiver<StreamToken>> {
        let (tx, rx) = mpsc::channel(100);

        let response = self
            .http_client
            .post(self.chat_url())
            .json(&self.request_body(turns))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {status}: {body}");
        }

        let mut stream = response.bytes_stream();

        // Spawn task to process the newline-delimited JSON stream
        tokio::spawn(async move {
            let mut buffer = String::new();
            let mut full_response = String::new();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim().to_string();
                            buffer = buffer[pos + 1..].to_string();
                            if line.is_empty() {
                                continue;
                            }

                            let Ok(data) = serde_json::from_str::<serde_json::Value>(&line)
                            else {
                                continue;
                            };

                            if let Some(token) = data
                                .get("message")
                                .and_then(|m| m.get("content"))
                                .and_then(|c| c.as_str())
                            {
                                if !token.is_empty() {
                                    full_response.push_str(token);
                                    if tx
                                        .send(StreamToken::Token(token.to_string()))
                                        .await
                                        .is_err()
                                    {
                                        // Receiver dropped, stop streaming
                                        return;
                                    }
                                }
                            }

                            if data
                                .get("done")
                                .and_then(serde_json::Value::as_bool)
                                .unwrap_or(false)
                            {
                                let _ = tx
                                    .send(StreamToken::Complete {
                                        message: full_response,
                                    })
                                    .await;
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamToken::Error(e.to_string())).await;
                        return;
                    }
                }
            }

            // Stream ended without done signal
            if !full_response.is_empty() {
                let _ = tx
                    .send(StreamToken::Complete {
                        message: full_response,
                    })
                    .await;
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client =
            OllamaClient::new("localhost", 11434, "llama3.2", GenerationParams::default())
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.chat_url(), "http://localhost:11434/api/chat");
        assert_eq!(client.tags_url(), "http://localhost:11434/api/tags");
    }

    #[test]
    fn test_request_body_carries_history() {
        let client =
            OllamaClient::new("localhost", 11434, "llama3.2", GenerationParams::default())
                .unwrap();

        let turns = vec![
            Turn::user("Hello"),
            Turn::assistant("Hi!"),
            Turn::user("Again"),
        ];
        let body = client.request_body(&turns);

        assert_eq!(body["model"], "llama3.2");
        // system prompt + 3 turns
        assert_eq!(body["messages"].as_array().unwrap().len(), 4);
        assert_eq!(body["options"]["num_predict"], 512);
    }
}
