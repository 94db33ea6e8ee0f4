//! Persistent key-value storage for auth artifacts.
//!
//! This module provides:
//! - `SessionStore`: the async storage contract used by the session manager
//!   and the launch gate
//! - `FileStore`: a JSON file in the data directory
//! - `KeyringStore`: one OS keychain entry per key
//! - `MemoryStore`: an in-process map for tests and ephemeral sessions
//!
//! Stores give no transactional guarantee across keys. Callers issuing
//! several writes must tolerate a partial outcome.

pub mod file;
pub mod keychain;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use keychain::KeyringStore;
pub use memory::MemoryStore;

/// JSON-encoded user profile
pub const USER_SESSION_KEY: &str = "userSession";
/// Bearer token
pub const AUTH_TOKEN_KEY: &str = "authToken";
/// RFC 3339 absolute expiry of the bearer token
pub const TOKEN_EXPIRY_KEY: &str = "tokenExpiry";
/// Refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Set once the app has been launched at least once
pub const HAS_LAUNCHED_KEY: &str = "hasLaunched";

/// Every key owned by the session manager, in the order it clears them.
pub const SESSION_KEYS: [&str; 4] = [
    USER_SESSION_KEY,
    AUTH_TOKEN_KEY,
    TOKEN_EXPIRY_KEY,
    REFRESH_TOKEN_KEY,
];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store file: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keychain(#[from] keyring::Error),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value storage for session artifacts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove every listed key. Keys that are already absent are ignored.
    async fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError>;
}
