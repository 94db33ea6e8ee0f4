//! REST API client module for the asset tracking backend.
//!
//! This module provides the `ApiClient` for the auth endpoints: the login
//! exchange that yields a user profile and token pair, and the refresh
//! exchange that trades a refresh token for a new bearer token.

pub mod client;
pub mod error;

pub use client::{ApiClient, LoginResult, RefreshResult, REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
