//! Hugging Face Provider
//!
//! Hosted inference through the Hugging Face router, which exposes an
//! OpenAI-compatible chat-completions endpoint for hub models. Model
//! serving itself stays on the Hugging Face side; this client is a thin
//! streaming pass-through like the other providers.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{chat_messages, ProviderClient, StreamToken};
use crate::config::GenerationParams;
use crate::conversation::Turn;

const ROUTER_URL: &str = "https://router.huggingface.co/v1/chat/completions";
const MODELS_URL: &str = "https://router.huggingface.co/v1/models";

/// Hugging Face router client.
pub struct HuggingFaceClient {
    api_key: String,
    model: String,
    params: GenerationParams,
    http_client: reqwest::Client,
}

impl HuggingFaceClient {
    /// Create a new Hugging Face client.
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
        // The router takes standard OpenAI sampling fields; Together-style
        // repetition_penalty is not among them.
        serde_json::json!({
            "model": self.model,
            "messages": chat_messages(&self.params.system_prompt, turns),
            "stream": true,
            "max_tokens": self.params.max_tokens,
            "temperature": self.params.temperature,
            "top_p": self.params.top_p,
        })
    }
}

#[async_trait]
impl ProviderClient for HuggingFaceClient {
    fn name(&self) -> &'static str {
        "Hugging Face"
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
            .post(ROUTER_URL)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(turns))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Hugging Face router returned {status}: {body}");
        }

        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();
            let mut full_response = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamToken::Error(e.to_string())).await;
                        return;
                    }
                };
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

                    let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
                        continue;
                    };
                    let token = value
                        .get("choices")
                        .and_then(|c| c.get(0))
                        .and_then(|c| c.get("delta"))
                        .and_then(|d| d.get("content"))
                        .and_then(|t| t.as_str());

                    if let Some(token) = token {
                        if token.is_empty() {
                            continue;
                        }
                        full_response.push_str(token);
                        if tx.send(StreamToken::Token(token.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
            }

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
    fn test_request_body_uses_openai_fields_only() {
        let client = HuggingFaceClient::new(
            "hf_token",
            "meta-llama/Llama-3.2-3B-Instruct",
            GenerationParams::default(),
        )
        .unwrap();

        let body = client.request_body(&[Turn::user("Hello")]);
        assert_eq!(body["model"], "meta-llama/Llama-3.2-3B-Instruct");
        assert_eq!(body["stream"], true);
        assert!(body.get("repetition_penalty").is_none());
        assert_eq!(body["max_tokens"], 512);
    }
}
