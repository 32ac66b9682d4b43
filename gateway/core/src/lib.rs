//! Gateway Core - Auth Service and Model Relay for the Campus Chatbot
//!
//! This crate provides the backend logic for a browser-based campus
//! chatbot, completely independent of any UI: an HTTP auth service backed
//! by a SQLite credential store, and a WebSocket relay that forwards chat
//! messages to a configured LLM provider and streams tokens back.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        Browser Chat UI                         │
//! │        (external; talks plain HTTP + WebSocket text)           │
//! └───────┬───────────────────────────────────┬───────────────────┘
//!         │ POST /register /login /logout     │ AUTH <token>
//!         │ GET  /me /health                  │ chat frames / LOGOUT
//! ┌───────┴───────────┐              ┌────────┴──────────┐
//! │     Auth API      │              │    Model Relay    │
//! │      (axum)       │              │ (tokio-tungstenite)│
//! └───────┬───────────┘              └────────┬──────────┘
//!         │                                   │ validate(token)
//! ┌───────┴───────────────────────────────────┴──────────┐
//! │                     AuthService                       │
//! │        CredentialStore (SQLite) + Vault (XChaCha20)   │
//! └───────────────────────────────────────────────────────┘
//!                                             │
//!                                    ┌────────┴──────────┐
//!                                    │  ProviderClient   │
//!                                    │ Together / Ollama │
//!                                    │  / Hugging Face   │
//!                                    └───────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`auth::AuthService`]: register/login/logout/validate
//! - [`relay::RelayServer`]: the WebSocket relay accept loop
//! - [`backend::ProviderClient`]: the provider abstraction
//! - [`conversation::Conversation`]: per-connection turn memory
//! - [`config::GatewayConfig`]: resolved configuration
//!
//! # No UI Dependencies
//!
//! This crate has **zero** dependencies on any frontend framework. It is
//! pure backend logic that the daemon binary wires to two listeners.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod relay;
pub mod security;

// Re-exports for convenience
pub use auth::{AuthService, CredentialStore, LoginSuccess, RegisterRequest, UserView, Vault};
pub use backend::{provider_from_config, ProviderClient, StreamToken};
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, GatewayConfig,
    GenerationParams, ProviderConfig,
};
pub use conversation::{Conversation, Role, Turn};
pub use errors::{AuthError, RelayError};
pub use relay::{ConnectionId, RelayServer};
pub use security::{GatewayLimits, InputValidator, ValidationResult};
