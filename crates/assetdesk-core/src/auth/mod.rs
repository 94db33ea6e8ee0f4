//! Authentication module for managing user sessions.
//!
//! This module provides:
//! - `SessionManager`: stores, serves, refreshes and clears the session
//! - `TokenRefresher`: the refresh exchange plus its write-back to storage
//! - `Session` / `UserProfile`: the session as handed to the UI layer
//!
//! Tokens without a server-issued expiry live for 60 minutes and are
//! refreshed in the background once fewer than 5 minutes remain.

pub mod error;
pub mod manager;
pub mod refresh;
pub mod session;

pub use error::{RefreshError, SessionError, ValidationError};
pub use manager::SessionManager;
pub use refresh::TokenRefresher;
pub use session::{Session, UserProfile, REQUIRED_USER_FIELDS};
