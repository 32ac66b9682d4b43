//! TOML Configuration File Support
//!
//! Centralized configuration loading for the gateway, supporting a TOML
//! configuration file at `~/.config/campus-gateway/gateway.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest
//! first):
//! 1. Environment variables
//! 2. TOML configuration file
//! 3. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [http]
//! bind = "127.0.0.1:8093"
//!
//! [relay]
//! bind = "127.0.0.1:8092"
//!
//! [auth]
//! db_path = "/var/lib/campus-gateway/auth.db"
//! session_ttl_secs = 86400
//!
//! [provider]
//! kind = "together"
//! model = "meta-llama/Llama-2-7b-chat-hf"
//! max_tokens = 512
//! temperature = 0.7
//!
//! [limits]
//! max_frame_bytes = 65536
//! max_connections = 100
//! provider_timeout_secs = 120
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::security::GatewayLimits;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// HTTP section of the TOML configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpToml {
    /// Bind address for the auth API listener.
    pub bind: Option<String>,
}

/// Relay section of the TOML configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// Bind address for the WebSocket relay listener.
    pub bind: Option<String>,
}

/// Auth section of the TOML configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthToml {
    /// Path to the SQLite credential database.
    pub db_path: Option<String>,
    /// Session lifetime in seconds.
    pub session_ttl_secs: Option<u64>,
    /// Secret the credential vault key is derived from. Prefer the
    /// `GATEWAY_VAULT_SECRET` environment variable over this field.
    pub vault_secret: Option<String>,
}

/// Provider section of the TOML configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// Provider kind: `together`, `ollama`, or `huggingface`.
    pub kind: Option<String>,
    /// Model identifier, provider-specific.
    pub model: Option<String>,
    /// API key for hosted providers. Prefer the provider's environment
    /// variable over this field.
    pub api_key: Option<String>,
    /// Ollama host.
    pub host: Option<String>,
    /// Ollama port.
    pub port: Option<u16>,
    /// Maximum tokens per response.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff.
    pub top_p: Option<f32>,
    /// Repetition penalty.
    pub repetition_penalty: Option<f32>,
    /// System prompt prepended to every conversation.
    pub system_prompt: Option<String>,
}

/// Limits section of the TOML configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsToml {
    /// Maximum relay frame size in bytes.
    pub max_frame_bytes: Option<usize>,
    /// Maximum simultaneous relay connections.
    pub max_connections: Option<usize>,
    /// Maximum turns per conversation.
    pub max_conversation_turns: Option<usize>,
    /// Maximum content bytes per conversation.
    pub max_conversation_bytes: Option<usize>,
    /// Bound on the wait for each provider token, in seconds.
    pub provider_timeout_secs: Option<u64>,
}

/// Root structure of the TOML configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayToml {
    /// HTTP listener settings.
    pub http: HttpToml,
    /// Relay listener settings.
    pub relay: RelayToml,
    /// Auth service settings.
    pub auth: AuthToml,
    /// Provider selection and sampling settings.
    pub provider: ProviderToml,
    /// Resource limits.
    pub limits: LimitsToml,
}

/// Which LLM provider the relay forwards to, selected at startup.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderConfig {
    /// Together.AI hosted chat completions.
    Together {
        /// Bearer API key.
        api_key: String,
        /// Model identifier.
        model: String,
    },
    /// Local or remote Ollama server.
    Ollama {
        /// Ollama host.
        host: String,
        /// Ollama port.
        port: u16,
        /// Model identifier.
        model: String,
    },
    /// Hugging Face inference router (OpenAI-compatible endpoint).
    HuggingFace {
        /// Bearer API token.
        api_key: String,
        /// Model identifier.
        model: String,
    },
}

/// Sampling parameters passed through to the selected provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    pub top_p: f32,
    /// Repetition penalty.
    pub repetition_penalty: f32,
    /// System prompt prepended to every conversation.
    pub system_prompt: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
            repetition_penalty: 1.1,
            system_prompt: "You are a helpful, knowledgeable, and friendly AI assistant. \
                            Provide clear, concise, and accurate responses."
                .to_string(),
        }
    }
}

/// Fully resolved gateway configuration.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Bind address for the auth API listener.
    pub http_bind: String,
    /// Bind address for the WebSocket relay listener.
    pub relay_bind: String,
    /// Path to the SQLite credential database.
    pub db_path: PathBuf,
    /// Session lifetime in seconds.
    pub session_ttl_secs: u64,
    /// Secret the credential vault key is derived from.
    pub vault_secret: Option<String>,
    /// Selected provider.
    pub provider: ProviderConfig,
    /// Sampling parameters.
    pub generation: GenerationParams,
    /// Resource limits.
    pub limits: GatewayLimits,
}

/// Default location of the configuration file:
/// `$XDG_CONFIG_HOME/campus-gateway/gateway.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("campus-gateway").join("gateway.toml"))
}

/// Default location of the credential database:
/// `$XDG_DATA_HOME/campus-gateway/auth.db`, falling back to `./auth.db`.
#[must_use]
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("campus-gateway").join("auth.db"))
        .unwrap_or_else(|| PathBuf::from("auth.db"))
}

/// Load configuration from the default path, environment, and defaults.
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from an explicit path (or defaults when `None` /
/// the file does not exist), then apply environment overrides.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<GatewayConfig, ConfigError> {
    let file = match path {
        Some(path) if path.exists() => {
            let text = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::ReadError { path: path.clone(), source })?;
            let parsed: GatewayToml = toml::from_str(&text)?;
            tracing::info!(path = ?path, "Loaded configuration file");
            parsed
        }
        _ => GatewayToml::default(),
    };

    resolve(file)
}

/// Merge file values with environment overrides and defaults.
fn resolve(file: GatewayToml) -> Result<GatewayConfig, ConfigError> {
    let http_bind = env_var("GATEWAY_HTTP_BIND")
        .or(file.http.bind)
        .unwrap_or_else(|| "127.0.0.1:8093".to_string());

    let relay_bind = env_var("GATEWAY_RELAY_BIND")
        .or(file.relay.bind)
        .unwrap_or_else(|| "127.0.0.1:8092".to_string());

    let db_path = env_var("GATEWAY_DB")
        .map(PathBuf::from)
        .or_else(|| file.auth.db_path.map(PathBuf::from))
        .unwrap_or_else(default_db_path);

    let session_ttl_secs = env_var("GATEWAY_SESSION_TTL_SECS")
        .and_then(|v| v.parse().ok())
        .or(file.auth.session_ttl_secs)
        .unwrap_or(86_400);

    let vault_secret = env_var("GATEWAY_VAULT_SECRET").or(file.auth.vault_secret);

    let provider = resolve_provider(&file.provider)?;

    let defaults = GenerationParams::default();
    let generation = GenerationParams {
        max_tokens: file.provider.max_tokens.unwrap_or(defaults.max_tokens),
        temperature: file.provider.temperature.unwrap_or(defaults.temperature),
        top_p: file.provider.top_p.unwrap_or(defaults.top_p),
        repetition_penalty: file
            .provider
            .repetition_penalty
            .unwrap_or(defaults.repetition_penalty),
        system_prompt: file
            .provider
            .system_prompt
            .unwrap_or(defaults.system_prompt),
    };

    // File values over defaults, environment over both.
    let mut limits = GatewayLimits::default();
    if let Some(v) = file.limits.max_frame_bytes {
        limits.max_frame_bytes = v;
    }
    if let Some(v) = file.limits.max_connections {
        limits.max_connections = v;
    }
    if let Some(v) = file.limits.max_conversation_turns {
        limits.max_conversation_turns = v;
    }
    if let Some(v) = file.limits.max_conversation_bytes {
        limits.max_conversation_bytes = v;
    }
    if let Some(v) = file.limits.provider_timeout_secs {
        limits.provider_timeout_secs = v;
    }
    if let Some(v) = env_var("GATEWAY_MAX_FRAME_BYTES").and_then(|v| v.parse().ok()) {
        limits.max_frame_bytes = v;
    }
    if let Some(v) = env_var("GATEWAY_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
        limits.max_connections = v;
    }
    if let Some(v) = env_var("GATEWAY_PROVIDER_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        limits.provider_timeout_secs = v;
    }

    Ok(GatewayConfig {
        http_bind,
        relay_bind,
        db_path,
        session_ttl_secs,
        vault_secret,
        provider,
        generation,
        limits,
    })
}

/// Resolve the provider selection from file + environment.
fn resolve_provider(file: &ProviderToml) -> Result<ProviderConfig, ConfigError> {
    let kind = env_var("GATEWAY_PROVIDER")
        .or_else(|| file.kind.clone())
        .unwrap_or_else(|| "ollama".to_string());

    match kind.as_str() {
        "together" => {
            let api_key = env_var("TOGETHER_API_KEY")
                .or_else(|| file.api_key.clone())
                .ok_or_else(|| {
                    ConfigError::ValidationError(
                        "provider 'together' requires TOGETHER_API_KEY".to_string(),
                    )
                })?;
            let model = env_var("TOGETHER_MODEL")
                .or_else(|| file.model.clone())
                .unwrap_or_else(|| "meta-llama/Llama-2-7b-chat-hf".to_string());
            Ok(ProviderConfig::Together { api_key, model })
        }
        "ollama" => {
            let host = env_var("OLLAMA_HOST")
                .or_else(|| file.host.clone())
                .unwrap_or_else(|| "localhost".to_string());
            let port = env_var("OLLAMA_PORT")
                .and_then(|v| v.parse().ok())
                .or(file.port)
                .unwrap_or(11434);
            let model = env_var("OLLAMA_MODEL")
                .or_else(|| file.model.clone())
                .unwrap_or_else(|| "llama3.2".to_string());
            Ok(ProviderConfig::Ollama { host, port, model })
        }
        "huggingface" => {
            let api_key = env_var("HF_TOKEN")
                .or_else(|| file.api_key.clone())
                .ok_or_else(|| {
                    ConfigError::ValidationError(
                        "provider 'huggingface' requires HF_TOKEN".to_string(),
                    )
                })?;
            let model = env_var("HF_MODEL")
                .or_else(|| file.model.clone())
                .unwrap_or_else(|| "meta-llama/Llama-3.2-3B-Instruct".to_string());
            Ok(ProviderConfig::HuggingFace { api_key, model })
        }
        other => Err(ConfigError::ValidationError(format!(
            "unknown provider kind '{other}' (expected together, ollama, or huggingface)"
        ))),
    }
}

/// Read a non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_without_file() {
        let config = load_config_from_path(None).unwrap();
        assert_eq!(config.http_bind, "127.0.0.1:8093");
        assert_eq!(config.relay_bind, "127.0.0.1:8092");
        assert_eq!(config.session_ttl_secs, 86_400);
        // Ollama is the default provider: it needs no API key.
        assert!(matches!(config.provider, ProviderConfig::Ollama { .. }));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config =
            load_config_from_path(Some(PathBuf::from("/nonexistent/gateway.toml"))).unwrap();
        assert_eq!(config.http_bind, "127.0.0.1:8093");
    }

    #[test]
    fn test_file_values_are_applied() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[http]
bind = "0.0.0.0:9000"

[relay]
bind = "0.0.0.0:9001"

[auth]
session_ttl_secs = 3600

[provider]
kind = "ollama"
model = "mistral"
host = "ollama.internal"
port = 11435
temperature = 0.5

[limits]
max_connections = 7
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.http_bind, "0.0.0.0:9000");
        assert_eq!(config.relay_bind, "0.0.0.0:9001");
        assert_eq!(config.session_ttl_secs, 3600);
        assert_eq!(
            config.provider,
            ProviderConfig::Ollama {
                host: "ollama.internal".to_string(),
                port: 11435,
                model: "mistral".to_string(),
            }
        );
        assert!((config.generation.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.limits.max_connections, 7);
    }

    #[test]
    fn test_together_requires_api_key() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[provider]
kind = "together"
"#
        )
        .unwrap();

        // No TOGETHER_API_KEY in the file and (normally) none in the test
        // environment; guard against CI environments that set one.
        if std::env::var("TOGETHER_API_KEY").is_err() {
            let result = load_config_from_path(Some(file.path().to_path_buf()));
            assert!(matches!(result, Err(ConfigError::ValidationError(_))));
        }
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[provider]
kind = "skynet"
"#
        )
        .unwrap();

        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_generation_defaults_match_sampling_profile() {
        let params = GenerationParams::default();
        assert_eq!(params.max_tokens, 512);
        assert!((params.temperature - 0.7).abs() < f32::EPSILON);
        assert!((params.top_p - 0.9).abs() < f32::EPSILON);
        assert!((params.repetition_penalty - 1.1).abs() < f32::EPSILON);
    }
}
