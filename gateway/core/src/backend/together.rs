//! Together.AI Provider
//!
//! Hosted chat completions over the Together.AI OpenAI-compatible API.
//!
//! # Wire Format
//!
//! `POST /v1/chat/completions` with `stream: true` returns server-sent
//! events: each `data:` line carries a JSON chunk with
//! `choices[0].delta.content`, and the literal `data: [DONE]` terminates
//! the stream.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{chat_messages, ProviderClient, StreamToken};
use crate::config::GenerationParams;
use crate::conversation::Turn;

const CHAT_URL: &str = "https://api.together.xyz/v1/chat/completions";
const MODELS_URL: &str = "https://api.together.xyz/v1/models";

/// Together.AI client.
pub struct TogetherClient {
    api_key: String,
    model: String,
    params: GenerationParams,
    http_client: reqwest::Client,
}

impl TogetherClient {
    /// Create a new Together.AI client.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        params: GenerationParams,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            params,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?,
        })
    }

    fn request_body(&self, turns: &[Turn]) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": chat_messages(&self.params.system_prompt, turns),
            "stream": true,
            "max_tokens": self.params.max_tokens,
            "temperature": self.params.temperature,
            "top_p": self.params.top_p,
            "repetition_penalty": self.params.repetition_penalty,
        })
    }
}

#[async_trait]
impl ProviderClient for TogetherClient {
    fn name(&self) -> &'static str {
        "Together.AI"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(MODELS_URL)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn generate(&self, turns: &[Turn]) -> anyhow::Result<mpsc::Receiver<StreamToken>> {
        let (tx, rx) = mpsc::channel(100);

        let response = self
            .http_client
            .post(CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(turns))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Together.AI returned {status}: {body}");
        }

        let mut stream = response.bytes_stream();

        // Spawn task to process the SSE stream
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

                            let Some(data) = line.strip_prefix("data: ") else {
                                continue;
                            };

                            if data == "[DONE]" {
                                let _ = tx
                                    .send(StreamToken::Complete {
                                        message: full_response,
                                    })
                                    .await;
                                return;
                            }

                            if let Some(token) = delta_content(data) {
                                if token.is_empty() {
                                    continue;
                                }
                                full_response.push_str(&token);
                                if tx.send(StreamToken::Token(token)).await.is_err() {
                                    // Receiver dropped, stop streaming
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamToken::Error(e.to_string())).await;
                        return;
                    }
                }
            }

            // Stream ended without [DONE]
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

/// Extract `choices[0].delta.content` from one SSE data payload.
fn delta_content(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_includes_sampling_params() {
        let client = TogetherClient::new(
            "key",
            "meta-llama/Llama-2-7b-chat-hf",
            GenerationParams::default(),
        )
        .unwrap();

        let body = client.request_body(&[Turn::user("Hello")]);
        assert_eq!(body["model"], "meta-llama/Llama-2-7b-chat-hf");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert!(body.get("repetition_penalty").is_some());
    }

    #[test]
    fn test_delta_content_extraction() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(delta_content(data), Some("Hel".to_string()));

        // Role-only delta (first chunk) has no content.
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(delta_content(data), None);

        assert_eq!(delta_content("not json"), None);
        assert_eq!(delta_content(r#"{"choices":[]}"#), None);
    }
}
