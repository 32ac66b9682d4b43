//! Security Limits and Input Validation
//!
//! Validation is enforced at the boundaries where untrusted input enters
//! the system: registration payloads on the HTTP side and chat frames on
//! the relay side. All validation is fail-safe: when in doubt, reject.

use serde::{Deserialize, Serialize};

/// Resource limits for the gateway.
///
/// These limits prevent resource exhaustion through unbounded input.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayLimits {
    /// Maximum size of a single relay frame in bytes (default: 64KB)
    pub max_frame_bytes: usize,
    /// Maximum simultaneous relay connections (default: 100)
    pub max_connections: usize,
    /// Maximum turns kept in one connection's conversation memory
    /// (default: 200)
    pub max_conversation_turns: usize,
    /// Maximum total content bytes in one conversation (default: 1MB)
    pub max_conversation_bytes: usize,
    /// Maximum length of a username or student ID (default: 64)
    pub max_identifier_length: usize,
    /// Bound on the wait for each streamed provider token, in seconds
    /// (default: 120)
    pub provider_timeout_secs: u64,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self {
            max_frame_bytes: 64 * 1024,
            max_connections: 100,
            max_conversation_turns: 200,
            max_conversation_bytes: 1024 * 1024,
            max_identifier_length: 64,
            provider_timeout_secs: 120,
        }
    }
}

impl GatewayLimits {
    /// Load limits from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `GATEWAY_MAX_FRAME_BYTES`
    /// - `GATEWAY_MAX_CONNECTIONS`
    /// - `GATEWAY_PROVIDER_TIMEOUT_SECS`
    #[must_use]
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Ok(v) = std::env::var("GATEWAY_MAX_FRAME_BYTES") {
            if let Ok(n) = v.parse() {
                limits.max_frame_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("GATEWAY_MAX_CONNECTIONS") {
            if let Ok(n) = v.parse() {
                limits.max_connections = n;
            }
        }
        if let Ok(v) = std::env::var("GATEWAY_PROVIDER_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                limits.provider_timeout_secs = n;
            }
        }

        limits
    }

    /// Provider token wait bound as a `Duration`.
    #[must_use]
    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Result of validating untrusted input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationResult {
    /// Input is acceptable.
    Valid,
    /// Input was rejected.
    Invalid {
        /// Why the input was rejected.
        reason: String,
    },
}

impl ValidationResult {
    /// Check whether the input passed validation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Rejection reason, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::Invalid { reason } => Some(reason),
        }
    }
}

/// Validates input at the gateway trust boundary.
#[derive(Clone, Debug)]
pub struct InputValidator {
    limits: GatewayLimits,
}

impl InputValidator {
    /// Create a validator with the given limits.
    #[must_use]
    pub fn new(limits: GatewayLimits) -> Self {
        Self { limits }
    }

    /// Validate a chat message received on the relay.
    #[must_use]
    pub fn validate_chat_message(&self, content: &str) -> ValidationResult {
        if content.trim().is_empty() {
            return ValidationResult::Invalid {
                reason: "empty message".to_string(),
            };
        }
        if content.len() > self.limits.max_frame_bytes {
            return ValidationResult::Invalid {
                reason: format!(
                    "message exceeds {} bytes",
                    self.limits.max_frame_bytes
                ),
            };
        }
        ValidationResult::Valid
    }

    /// Validate one registration/login identifier (username, student ID).
    #[must_use]
    pub fn validate_identifier(&self, name: &str, value: &str) -> ValidationResult {
        if value.trim().is_empty() {
            return ValidationResult::Invalid {
                reason: format!("{name} must not be empty"),
            };
        }
        if value.len() > self.limits.max_identifier_length {
            return ValidationResult::Invalid {
                reason: format!(
                    "{name} exceeds {} characters",
                    self.limits.max_identifier_length
                ),
            };
        }
        if value.chars().any(char::is_control) {
            return ValidationResult::Invalid {
                reason: format!("{name} contains control characters"),
            };
        }
        ValidationResult::Valid
    }

    /// Validate a password field. Passwords only need to be non-empty and
    /// bounded; composition rules are a UI concern.
    #[must_use]
    pub fn validate_password(&self, name: &str, value: &str) -> ValidationResult {
        if value.is_empty() {
            return ValidationResult::Invalid {
                reason: format!("{name} must not be empty"),
            };
        }
        if value.len() > self.limits.max_frame_bytes {
            return ValidationResult::Invalid {
                reason: format!("{name} is too long"),
            };
        }
        ValidationResult::Valid
    }

    /// Access the configured limits.
    #[must_use]
    pub fn limits(&self) -> &GatewayLimits {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = GatewayLimits::default();
        assert_eq!(limits.max_frame_bytes, 64 * 1024);
        assert_eq!(limits.max_connections, 100);
        assert_eq!(limits.provider_timeout_secs, 120);
    }

    #[test]
    fn test_chat_message_validation() {
        let validator = InputValidator::new(GatewayLimits::default());

        assert!(validator.validate_chat_message("Hello").is_valid());
        assert!(!validator.validate_chat_message("").is_valid());
        assert!(!validator.validate_chat_message("   ").is_valid());

        let oversized = "x".repeat(64 * 1024 + 1);
        let result = validator.validate_chat_message(&oversized);
        assert!(!result.is_valid());
        assert!(result.error_message().unwrap().contains("exceeds"));
    }

    #[test]
    fn test_identifier_validation() {
        let validator = InputValidator::new(GatewayLimits::default());

        assert!(validator.validate_identifier("username", "alice").is_valid());
        assert!(!validator.validate_identifier("username", "").is_valid());
        assert!(!validator
            .validate_identifier("username", "ali\x00ce")
            .is_valid());

        let long = "a".repeat(65);
        assert!(!validator.validate_identifier("username", &long).is_valid());
    }

    #[test]
    fn test_password_validation() {
        let validator = InputValidator::new(GatewayLimits::default());

        assert!(validator.validate_password("password", "pw1").is_valid());
        let result = validator.validate_password("password", "");
        assert_eq!(
            result.error_message(),
            Some("password must not be empty")
        );
    }
}
