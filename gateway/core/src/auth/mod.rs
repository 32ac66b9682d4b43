//! Authentication and Credential Storage
//!
//! The auth service owns user records and session tokens. Login passwords
//! are stored as iterated salted SHA-256 hashes; the e-governance portal
//! password is stored encrypted under a server-side symmetric key and is
//! never returned to clients. Session tokens are opaque random strings;
//! only their SHA-256 digest is persisted.

mod service;
mod store;
mod vault;

pub use service::{AuthService, LoginSuccess, RegisterRequest, UserView};
pub use store::{CredentialStore, SessionRecord, UserRecord};
pub use vault::Vault;
