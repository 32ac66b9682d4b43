//! LLM Provider Integration
//!
//! Abstracted access to the supported providers through a common trait.
//!
//! # Available Providers
//!
//! - **Together.AI**: hosted chat completions (SSE streaming)
//! - **Ollama**: local LLM server (newline-delimited JSON streaming)
//! - **Hugging Face**: hosted inference router (SSE streaming)
//!
//! # Usage
//!
//! ```ignore
//! use gateway_core::backend::{provider_from_config, ProviderClient};
//!
//! let provider = provider_from_config(&config.provider, &config.generation)?;
//! let rx = provider.generate(conversation.turns()).await?;
//! ```

mod huggingface;
mod ollama;
mod together;
mod traits;

pub use huggingface::HuggingFaceClient;
pub use ollama::OllamaClient;
pub use together::TogetherClient;
pub use traits::{chat_messages, ProviderClient, StreamToken};

use crate::config::{GenerationParams, ProviderConfig};

/// Build the configured provider client. Called once at startup; the
/// relay only ever sees the trait object.
pub fn provider_from_config(
    provider: &ProviderConfig,
    generation: &GenerationParams,
) -> anyhow::Result<Box<dyn ProviderClient>> {
    let client: Box<dyn ProviderClient> = match provider {
        ProviderConfig::Together { api_key, model } => Box::new(TogetherClient::new(
            api_key.clone(),
            model.clone(),
            generation.clone(),
        )?),
        ProviderConfig::Ollama { host, port, model } => Box::new(OllamaClient::new(
            host.clone(),
            *port,
            model.clone(),
            generation.clone(),
        )?),
        ProviderConfig::HuggingFace { api_key, model } => Box::new(HuggingFaceClient::new(
            api_key.clone(),
            model.clone(),
            generation.clone(),
        )?),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_selection() {
        let generation = GenerationParams::default();

        let provider = provider_from_config(
            &ProviderConfig::Ollama {
                host: "localhost".to_string(),
                port: 11434,
                model: "llama3.2".to_string(),
            },
            &generation,
        )
        .unwrap();
        assert_eq!(provider.name(), "Ollama");

        let provider = provider_from_config(
            &ProviderConfig::Together {
                api_key: "key".to_string(),
                model: "m".to_string(),
            },
            &generation,
        )
        .unwrap();
        assert_eq!(provider.name(), "Together.AI");

        let provider = provider_from_config(
            &ProviderConfig::HuggingFace {
                api_key: "key".to_string(),
                model: "m".to_string(),
            },
            &generation,
        )
        .unwrap();
        assert_eq!(provider.name(), "Hugging Face");
    }
}
