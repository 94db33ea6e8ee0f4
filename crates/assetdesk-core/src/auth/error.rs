use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

/// The user payload handed to `set_session` is unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("user data must be a JSON object")]
    NotARecord,

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("malformed user data: {0}")]
    Malformed(String),

    #[error("token must not be empty")]
    EmptyToken,
}

impl ValidationError {
    /// Names of the absent mandatory fields, empty for other kinds
    pub fn missing_fields(&self) -> &[String] {
        match self {
            ValidationError::MissingFields(fields) => fields,
            _ => &[],
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session data: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to parse stored user profile: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Failed to encode user profile: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Session storage failed: {0}")]
    Storage(#[from] StoreError),

    #[error("Login failed: {0}")]
    Login(#[from] ApiError),
}

/// Failure of the refresh exchange. Never escapes the session manager.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Refresh request failed: {0}")]
    Api(#[from] ApiError),

    #[error("Failed to store refreshed token: {0}")]
    Storage(#[from] StoreError),
}
