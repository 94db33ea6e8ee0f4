//! Client-side session core for the assetdesk asset/maintenance tracker.
//!
//! The UI layer talks to three things:
//! - `bootstrap::resolve_initial_route` once at launch
//! - `auth::SessionManager` for everything session related
//! - `config::Config` to build the store and API client it injects into both

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod store;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{Session, SessionError, SessionManager, UserProfile, ValidationError};
pub use bootstrap::{resolve_initial_route, Route, StoredFlags};
pub use config::{Config, StoreBackend};
pub use store::{FileStore, KeyringStore, MemoryStore, SessionStore, StoreError};
