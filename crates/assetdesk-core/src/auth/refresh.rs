use std::sync::Arc;

use tracing::info;

use crate::api::{ApiClient, RefreshResult};
use crate::store::{SessionStore, AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY};
use crate::utils::format_timestamp;

use super::RefreshError;

/// Performs the refresh exchange and writes the new tokens back to the store.
///
/// Owned by `SessionManager`; it shares the manager's store and is the only
/// other writer of the token keys.
#[derive(Clone)]
pub struct TokenRefresher {
    api: ApiClient,
    store: Arc<dyn SessionStore>,
}

impl TokenRefresher {
    pub fn new(api: ApiClient, store: Arc<dyn SessionStore>) -> Self {
        Self { api, store }
    }

    /// One refresh attempt. The refresh token is only replaced when the
    /// server rotated it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResult, RefreshError> {
        if refresh_token.is_empty() {
            return Err(RefreshError::MissingRefreshToken);
        }

        let result = self.api.refresh_token(refresh_token).await?;

        let expiry = format_timestamp(result.token_expiry);
        futures::try_join!(
            self.store.set(AUTH_TOKEN_KEY, &result.token),
            self.store.set(TOKEN_EXPIRY_KEY, &expiry),
        )?;
        if let Some(ref rotated) = result.refresh_token {
            self.store.set(REFRESH_TOKEN_KEY, rotated).await?;
        }

        info!(expires = %expiry, rotated = result.refresh_token.is_some(), "Token refreshed");
        Ok(result)
    }
}
