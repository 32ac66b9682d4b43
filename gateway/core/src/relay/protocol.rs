//! Relay Wire Protocol
//!
//! The relay speaks plain text frames so any browser WebSocket client can
//! drive it without a codec:
//!
//! - `AUTH <session_id>` — bearer handshake, must be the first frame
//! - `LOGOUT` — clear conversation memory and close (any state)
//! - anything else — chat input
//!
//! Server-to-client frames are streamed tokens, plus three markers:
//! `[AUTH_OK]` acknowledges the handshake, `[END]` terminates a response
//! turn, and `[ERROR] ...` carries an error without closing the socket.

/// Prefix of the bearer handshake frame.
pub const AUTH_PREFIX: &str = "AUTH ";

/// Control frame that clears conversation memory and closes the socket.
pub const LOGOUT: &str = "LOGOUT";

/// Handshake acknowledgement frame.
pub const AUTH_OK: &str = "[AUTH_OK]";

/// End-of-turn marker terminating each streamed response.
pub const END_OF_TURN: &str = "[END]";

/// Prefix of error frames.
pub const ERROR_PREFIX: &str = "[ERROR]";

/// A classified inbound text frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientFrame<'a> {
    /// Bearer handshake carrying a session token.
    Auth(&'a str),
    /// The logout control frame.
    Logout,
    /// Chat input to forward to the provider.
    Chat(&'a str),
}

impl<'a> ClientFrame<'a> {
    /// Classify an inbound text frame.
    ///
    /// `LOGOUT` must match exactly (a chat message mentioning the word is
    /// still chat); the handshake is recognized by its prefix.
    #[must_use]
    pub fn classify(text: &'a str) -> Self {
        if text == LOGOUT {
            return Self::Logout;
        }
        if let Some(token) = text.strip_prefix(AUTH_PREFIX) {
            return Self::Auth(token.trim());
        }
        Self::Chat(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_logout_exact_match_only() {
        assert_eq!(ClientFrame::classify("LOGOUT"), ClientFrame::Logout);
        assert_eq!(
            ClientFrame::classify("LOGOUT please"),
            ClientFrame::Chat("LOGOUT please")
        );
        assert_eq!(
            ClientFrame::classify("logout"),
            ClientFrame::Chat("logout")
        );
    }

    #[test]
    fn test_classify_auth() {
        assert_eq!(
            ClientFrame::classify("AUTH abc123"),
            ClientFrame::Auth("abc123")
        );
        assert_eq!(
            ClientFrame::classify("AUTH   abc123  "),
            ClientFrame::Auth("abc123")
        );
        // Empty token is still an Auth frame; validation rejects it.
        assert_eq!(ClientFrame::classify("AUTH "), ClientFrame::Auth(""));
    }

    #[test]
    fn test_classify_chat() {
        assert_eq!(ClientFrame::classify("Hello"), ClientFrame::Chat("Hello"));
        // "AUTHORS" does not start with the handshake prefix ("AUTH ").
        assert_eq!(ClientFrame::classify("AUTHORS"), ClientFrame::Chat("AUTHORS"));
    }
}
