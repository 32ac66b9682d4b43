//! Credential Store
//!
//! SQLite-backed persistence for user records and session tokens. All
//! access goes through a single connection behind a mutex, which
//! serializes registration and logout against each other; the UNIQUE
//! constraints on `username` and `student_id` are the backstop.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::AuthError;

/// A stored user row. `egov_password_enc` is vault ciphertext; the store
/// never sees the plaintext portal password.
#[derive(Clone, Debug)]
pub struct UserRecord {
    /// Unique login name.
    pub username: String,
    /// Unique university student identifier.
    pub student_id: String,
    /// Iterated salted SHA-256 password hash, hex-encoded.
    pub password_hash: String,
    /// Per-user random salt, hex-encoded.
    pub password_salt: String,
    /// Encrypted e-governance portal password (vault ciphertext).
    pub egov_password_enc: String,
}

/// A stored session row. Only the SHA-256 digest of the token is kept.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    /// SHA-256 digest of the opaque session token, hex-encoded.
    pub token_digest: String,
    /// Owning username (lookup key, not a foreign object reference).
    pub username: String,
    /// Creation time, Unix seconds.
    pub created_at: i64,
    /// Expiry time, Unix seconds.
    pub expires_at: i64,
}

/// SQLite credential store shared by the auth API and the relay boundary.
pub struct CredentialStore {
    conn: Mutex<Connection>,
}

impl CredentialStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, AuthError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store. Used by tests.
    pub fn open_in_memory() -> Result<Self, AuthError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                student_id TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                password_salt TEXT NOT NULL,
                egov_password TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sessions (
                token_digest TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (username) REFERENCES users (username)
            );",
        )
    }

    /// Insert a new user.
    ///
    /// Fails with `DuplicateUser` when the username or the student ID is
    /// already registered. Both checks happen under the connection lock,
    /// so concurrent registrations of the same name cannot both succeed.
    pub fn insert_user(&self, user: &UserRecord) -> Result<(), AuthError> {
        let conn = self.conn.lock();

        let username_taken: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![user.username],
                |row| row.get(0),
            )
            .optional()?;
        if username_taken.is_some() {
            return Err(AuthError::DuplicateUser(
                "Username already exists".to_string(),
            ));
        }

        let student_taken: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE student_id = ?1",
                params![user.student_id],
                |row| row.get(0),
            )
            .optional()?;
        if student_taken.is_some() {
            return Err(AuthError::DuplicateUser(
                "Student ID already registered".to_string(),
            ));
        }

        conn.execute(
            "INSERT INTO users (username, student_id, password_hash, password_salt, egov_password, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.username,
                user.student_id,
                user.password_hash,
                user.password_salt,
                user.egov_password_enc,
                chrono::Utc::now().timestamp(),
            ],
        )?;

        Ok(())
    }

    /// Fetch a user by username.
    pub fn get_user(&self, username: &str) -> Result<Option<UserRecord>, AuthError> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT username, student_id, password_hash, password_salt, egov_password
                 FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(UserRecord {
                        username: row.get(0)?,
                        student_id: row.get(1)?,
                        password_hash: row.get(2)?,
                        password_salt: row.get(3)?,
                        egov_password_enc: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Insert a session row.
    pub fn insert_session(&self, session: &SessionRecord) -> Result<(), AuthError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token_digest, username, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.token_digest,
                session.username,
                session.created_at,
                session.expires_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch a session by token digest.
    pub fn get_session(&self, token_digest: &str) -> Result<Option<SessionRecord>, AuthError> {
        let conn = self.conn.lock();
        let session = conn
            .query_row(
                "SELECT token_digest, username, created_at, expires_at
                 FROM sessions WHERE token_digest = ?1",
                params![token_digest],
                |row| {
                    Ok(SessionRecord {
                        token_digest: row.get(0)?,
                        username: row.get(1)?,
                        created_at: row.get(2)?,
                        expires_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    /// Delete a session. Returns whether a row was removed.
    pub fn delete_session(&self, token_digest: &str) -> Result<bool, AuthError> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM sessions WHERE token_digest = ?1",
            params![token_digest],
        )?;
        Ok(removed > 0)
    }

    /// Remove all sessions that expired before `now` (Unix seconds).
    /// Returns the number of purged rows.
    pub fn purge_expired_sessions(&self, now: i64) -> Result<usize, AuthError> {
        let conn = self.conn.lock();
        let purged = conn.execute("DELETE FROM sessions WHERE expires_at < ?1", params![now])?;
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(username: &str, student_id: &str) -> UserRecord {
        UserRecord {
            username: username.to_string(),
            student_id: student_id.to_string(),
            password_hash: "hash".to_string(),
            password_salt: "salt".to_string(),
            egov_password_enc: "sealed".to_string(),
        }
    }

    #[test]
    fn test_insert_and_get_user() {
        let store = CredentialStore::open_in_memory().unwrap();
        store.insert_user(&sample_user("alice", "S123")).unwrap();

        let user = store.get_user("alice").unwrap().unwrap();
        assert_eq!(user.student_id, "S123");
        assert!(store.get_user("bob").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let store = CredentialStore::open_in_memory().unwrap();
        store.insert_user(&sample_user("alice", "S123")).unwrap();

        let err = store
            .insert_user(&sample_user("alice", "S999"))
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUser(msg) if msg == "Username already exists"));
    }

    #[test]
    fn test_duplicate_student_id_rejected() {
        let store = CredentialStore::open_in_memory().unwrap();
        store.insert_user(&sample_user("alice", "S123")).unwrap();

        let err = store.insert_user(&sample_user("bob", "S123")).unwrap_err();
        assert!(
            matches!(err, AuthError::DuplicateUser(msg) if msg == "Student ID already registered")
        );
    }

    #[test]
    fn test_session_lifecycle() {
        let store = CredentialStore::open_in_memory().unwrap();
        let session = SessionRecord {
            token_digest: "digest-1".to_string(),
            username: "alice".to_string(),
            created_at: 1_000,
            expires_at: 2_000,
        };
        store.insert_session(&session).unwrap();

        let found = store.get_session("digest-1").unwrap().unwrap();
        assert_eq!(found.username, "alice");

        assert!(store.delete_session("digest-1").unwrap());
        assert!(!store.delete_session("digest-1").unwrap());
        assert!(store.get_session("digest-1").unwrap().is_none());
    }

    #[test]
    fn test_purge_expired_sessions() {
        let store = CredentialStore::open_in_memory().unwrap();
        for (digest, expires_at) in [("old", 100), ("live", 10_000)] {
            store
                .insert_session(&SessionRecord {
                    token_digest: digest.to_string(),
                    username: "alice".to_string(),
                    created_at: 0,
                    expires_at,
                })
                .unwrap();
        }

        let purged = store.purge_expired_sessions(5_000).unwrap();
        assert_eq!(purged, 1);
        assert!(store.get_session("old").unwrap().is_none());
        assert!(store.get_session("live").unwrap().is_some());
    }
}
