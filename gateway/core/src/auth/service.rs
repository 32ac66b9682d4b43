//! Auth Service
//!
//! Register, login, logout, and token validation on top of the credential
//! store. Passwords are hashed with iterated salted SHA-256 (100k rounds);
//! session tokens are 32 random bytes, hex-encoded, stored only as SHA-256
//! digests, and expire after a configurable TTL.

use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::store::{CredentialStore, SessionRecord, UserRecord};
use super::vault::Vault;
use crate::errors::AuthError;
use crate::security::InputValidator;

/// Password hashing rounds. Iterated SHA-256 keeps the dependency set
/// small while making brute force expensive.
const HASH_ROUNDS: u32 = 100_000;

/// Salt used for the dummy compare on the unknown-user login path, so
/// that path costs the same as a real hash check.
const DUMMY_SALT: &str = "0000000000000000";

/// Registration payload.
#[derive(Clone, Debug, Deserialize)]
pub struct RegisterRequest {
    /// Unique login name.
    pub username: String,
    /// University student identifier.
    pub student_id: String,
    /// Login password (hashed before storage).
    pub password: String,
    /// E-governance portal password (encrypted before storage).
    pub egov_password: String,
}

/// The client-visible slice of a user record. The portal password is
/// deliberately absent; it never crosses this boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    /// Login name.
    pub username: String,
    /// Student identifier.
    pub student_id: String,
}

/// Result of a successful login.
#[derive(Clone, Debug, Serialize)]
pub struct LoginSuccess {
    /// Opaque bearer session token. Shown to the client exactly once.
    pub session_id: String,
    /// The authenticated user.
    pub user: UserView,
}

/// The auth service. Shared between the HTTP API and the relay boundary.
pub struct AuthService {
    store: CredentialStore,
    vault: Vault,
    validator: InputValidator,
    session_ttl_secs: u64,
}

impl AuthService {
    /// Create the service.
    #[must_use]
    pub fn new(
        store: CredentialStore,
        vault: Vault,
        validator: InputValidator,
        session_ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            vault,
            validator,
            session_ttl_secs,
        }
    }

    /// Register a new user.
    ///
    /// Fails with `Validation` on empty or malformed fields and with
    /// `DuplicateUser` if the username or student ID is taken.
    pub fn register(&self, request: &RegisterRequest) -> Result<(), AuthError> {
        for (name, value) in [
            ("username", &request.username),
            ("student_id", &request.student_id),
        ] {
            let result = self.validator.validate_identifier(name, value);
            if let Some(reason) = result.error_message() {
                return Err(AuthError::Validation(reason.to_string()));
            }
        }
        for (name, value) in [
            ("password", &request.password),
            ("egov_password", &request.egov_password),
        ] {
            let result = self.validator.validate_password(name, value);
            if let Some(reason) = result.error_message() {
                return Err(AuthError::Validation(reason.to_string()));
            }
        }

        let salt = random_hex(16);
        let password_hash = hash_password(&request.password, &salt);
        let egov_password_enc = self.vault.seal(&request.egov_password)?;

        self.store.insert_user(&UserRecord {
            username: request.username.clone(),
            student_id: request.student_id.clone(),
            password_hash,
            password_salt: salt,
            egov_password_enc,
        })?;

        tracing::info!(username = %request.username, "User registered");
        Ok(())
    }

    /// Log a user in and mint a session token.
    ///
    /// Unknown user and wrong password both return `InvalidCredentials`
    /// with the same message; the unknown-user path runs a dummy hash so
    /// the two are not distinguishable by timing either.
    pub fn login(&self, username: &str, password: &str) -> Result<LoginSuccess, AuthError> {
        let Some(user) = self.store.get_user(username)? else {
            let _ = hash_password(password, DUMMY_SALT);
            return Err(AuthError::InvalidCredentials);
        };

        let candidate = hash_password(password, &user.password_salt);
        if candidate != user.password_hash {
            return Err(AuthError::InvalidCredentials);
        }

        let token = random_hex(32);
        let now = Utc::now().timestamp();
        self.store.insert_session(&SessionRecord {
            token_digest: token_digest(&token),
            username: user.username.clone(),
            created_at: now,
            expires_at: now + self.session_ttl_secs as i64,
        })?;

        tracing::info!(username = %user.username, "Login successful");
        Ok(LoginSuccess {
            session_id: token,
            user: UserView {
                username: user.username,
                student_id: user.student_id,
            },
        })
    }

    /// Invalidate a session. Idempotent: an unknown or already-removed
    /// token is not an error.
    pub fn logout(&self, session_id: &str) -> Result<(), AuthError> {
        let removed = self.store.delete_session(&token_digest(session_id))?;
        if removed {
            tracing::info!("Session invalidated");
        }
        // Expired rows are dead weight; sweep them while we hold a reason
        // to touch the table.
        self.store.purge_expired_sessions(Utc::now().timestamp())?;
        Ok(())
    }

    /// Resolve a bearer token to its user.
    ///
    /// Fails with `Unauthenticated` for missing, unknown, or expired
    /// tokens. The relay boundary calls this before forwarding anything
    /// to a provider.
    pub fn validate(&self, session_id: &str) -> Result<UserView, AuthError> {
        if session_id.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        let Some(session) = self.store.get_session(&token_digest(session_id))? else {
            return Err(AuthError::Unauthenticated);
        };

        if session.expires_at <= Utc::now().timestamp() {
            self.store.delete_session(&session.token_digest)?;
            return Err(AuthError::Unauthenticated);
        }

        let Some(user) = self.store.get_user(&session.username)? else {
            return Err(AuthError::Unauthenticated);
        };

        Ok(UserView {
            username: user.username,
            student_id: user.student_id,
        })
    }

    /// Decrypt the stored e-governance portal password for a user.
    ///
    /// This exists for the external attendance collaborator contract;
    /// nothing in this repository serializes the result to a client.
    pub fn portal_password(&self, username: &str) -> Result<String, AuthError> {
        let Some(user) = self.store.get_user(username)? else {
            return Err(AuthError::Unauthenticated);
        };
        self.vault.open(&user.egov_password_enc)
    }
}

/// Iterated salted SHA-256, hex-encoded.
fn hash_password(password: &str, salt: &str) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();

    for _ in 1..HASH_ROUNDS {
        digest = Sha256::digest(&digest);
    }

    hex::encode(digest)
}

/// SHA-256 digest of a session token, hex-encoded, for storage lookup.
fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Cryptographically random hex string of `bytes` entropy bytes.
fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::GatewayLimits;

    fn service() -> AuthService {
        AuthService::new(
            CredentialStore::open_in_memory().unwrap(),
            Vault::derive("test secret"),
            InputValidator::new(GatewayLimits::default()),
            3600,
        )
    }

    fn alice() -> RegisterRequest {
        RegisterRequest {
            username: "alice".to_string(),
            student_id: "S123".to_string(),
            password: "pw1".to_string(),
            egov_password: "portal-pw".to_string(),
        }
    }

    #[test]
    fn test_register_then_login_succeeds_once() {
        let service = service();
        service.register(&alice()).unwrap();

        let success = service.login("alice", "pw1").unwrap();
        assert_eq!(success.user.username, "alice");
        assert_eq!(success.user.student_id, "S123");
        assert_eq!(success.session_id.len(), 64);

        // Second registration with the same username fails.
        let err = service.register(&alice()).unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUser(_)));
    }

    #[test]
    fn test_empty_fields_are_validation_errors() {
        let service = service();

        let mut request = alice();
        request.username = String::new();
        assert!(matches!(
            service.register(&request).unwrap_err(),
            AuthError::Validation(_)
        ));

        let mut request = alice();
        request.egov_password = String::new();
        assert!(matches!(
            service.register(&request).unwrap_err(),
            AuthError::Validation(_)
        ));
    }

    #[test]
    fn test_wrong_password_and_unknown_user_are_indistinguishable() {
        let service = service();
        service.register(&alice()).unwrap();

        let wrong_password = service.login("alice", "nope").unwrap_err();
        let unknown_user = service.login("mallory", "nope").unwrap_err();

        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
    }

    #[test]
    fn test_logout_is_idempotent() {
        let service = service();
        service.register(&alice()).unwrap();
        let success = service.login("alice", "pw1").unwrap();

        service.logout(&success.session_id).unwrap();
        // Second logout with the now-invalid token: still no error.
        service.logout(&success.session_id).unwrap();

        assert!(matches!(
            service.validate(&success.session_id).unwrap_err(),
            AuthError::Unauthenticated
        ));
    }

    #[test]
    fn test_validate_resolves_live_session() {
        let service = service();
        service.register(&alice()).unwrap();
        let success = service.login("alice", "pw1").unwrap();

        let user = service.validate(&success.session_id).unwrap();
        assert_eq!(user.username, "alice");

        assert!(matches!(
            service.validate("").unwrap_err(),
            AuthError::Unauthenticated
        ));
        assert!(matches!(
            service.validate("deadbeef").unwrap_err(),
            AuthError::Unauthenticated
        ));
    }

    #[test]
    fn test_expired_session_is_unauthenticated() {
        let service = AuthService::new(
            CredentialStore::open_in_memory().unwrap(),
            Vault::derive("test secret"),
            InputValidator::new(GatewayLimits::default()),
            0, // expires immediately
        );
        service.register(&alice()).unwrap();
        let success = service.login("alice", "pw1").unwrap();

        assert!(matches!(
            service.validate(&success.session_id).unwrap_err(),
            AuthError::Unauthenticated
        ));
    }

    #[test]
    fn test_portal_password_roundtrips_through_vault() {
        let service = service();
        service.register(&alice()).unwrap();

        // Stored encrypted, recoverable server-side only.
        assert_eq!(service.portal_password("alice").unwrap(), "portal-pw");
    }

    #[test]
    fn test_login_response_never_contains_portal_password() {
        let service = service();
        service.register(&alice()).unwrap();
        let success = service.login("alice", "pw1").unwrap();

        let json = serde_json::to_string(&success).unwrap();
        assert!(!json.contains("portal-pw"));
        assert!(!json.contains("egov"));
    }
}
