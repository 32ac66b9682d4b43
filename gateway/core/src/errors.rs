//! Error Taxonomy
//!
//! Typed errors for the auth boundary and the relay boundary. Validation
//! and credential errors are returned synchronously to the caller and are
//! never retried; provider errors are surfaced to the connected client as
//! an error frame without tearing the connection down.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Errors produced by the auth service and credential store.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required field was empty or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The username or student ID is already registered.
    #[error("{0}")]
    DuplicateUser(String),

    /// Unknown user or password mismatch. The message is identical for
    /// both cases so callers cannot tell whether the username exists.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Missing, expired, or unknown session token.
    #[error("Invalid session")]
    Unauthenticated,

    /// Underlying credential store failure.
    #[error("credential store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Filesystem failure while opening the credential store.
    #[error("credential store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encrypting or decrypting a stored credential failed.
    #[error("credential vault error: {0}")]
    Vault(String),
}

impl AuthError {
    /// HTTP status code this error maps to.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::DuplicateUser(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Store(_) | Self::Io(_) | Self::Vault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Store/vault details stay in the server log, not the response body.
        let detail = match &self {
            Self::Store(e) => {
                tracing::error!(error = %e, "Credential store failure");
                "Internal error".to_string()
            }
            Self::Vault(e) => {
                tracing::error!(error = %e, "Credential vault failure");
                "Internal error".to_string()
            }
            Self::Io(e) => {
                tracing::error!(error = %e, "Credential store I/O failure");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

/// Errors produced at the relay boundary.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The client sent a frame the protocol does not allow in the
    /// current state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection was not authenticated when it tried to chat.
    #[error("unauthenticated")]
    Unauthenticated,

    /// The upstream LLM provider failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider did not produce a token within the configured bound.
    #[error("provider timed out")]
    ProviderTimeout,
}

impl RelayError {
    /// Render this error as a relay error frame payload.
    #[must_use]
    pub fn to_frame(&self) -> String {
        format!("{} {}", crate::relay::protocol::ERROR_PREFIX, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_status_codes() {
        assert_eq!(
            AuthError::Validation("empty".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::DuplicateUser("Username already exists".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_invalid_credentials_message_is_uniform() {
        // The same message regardless of which check failed upstream.
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid username or password"
        );
    }

    #[test]
    fn test_relay_error_frame_format() {
        let err = RelayError::Provider("upstream 429".into());
        assert_eq!(err.to_frame(), "[ERROR] provider error: upstream 429");

        let err = RelayError::ProviderTimeout;
        assert_eq!(err.to_frame(), "[ERROR] provider timed out");
    }
}
