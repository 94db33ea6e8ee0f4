//! Session lifecycle: storing a login, serving it back, refreshing it, and
//! clearing it on logout.
//!
//! Read paths fail open. A storage fault reads as "no session", a failed
//! refresh returns the stale token, and a corrupt profile reads as the Guest
//! placeholder. Write paths (`set_session`, `clear_session`) surface every
//! failure so the caller can retry.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, RefreshResult};
use crate::store::{
    SessionStore, StoreError, AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, TOKEN_EXPIRY_KEY,
    USER_SESSION_KEY,
};
use crate::utils::time::REFRESH_THRESHOLD_MINUTES;
use crate::utils::{format_timestamp, parse_timestamp, resolve_expiry};

use super::{RefreshError, Session, SessionError, TokenRefresher, UserProfile, ValidationError};

/// Key inside the login payload that may carry a server-issued expiry
const USER_DATA_EXPIRY_FIELD: &str = "tokenExpiry";

/// Raw values of the four session keys
#[derive(Debug, Default)]
struct StoredSession {
    user: Option<String>,
    token: Option<String>,
    expiry: Option<String>,
    refresh_token: Option<String>,
}

/// Owns all reads and writes of the session keys.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    api: ApiClient,
    refresher: TokenRefresher,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, api: ApiClient) -> Self {
        let refresher = TokenRefresher::new(api.clone(), store.clone());
        Self {
            store,
            api,
            refresher,
            background: Mutex::new(None),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Validate a login payload and persist it as the current session.
    ///
    /// The four keys are written concurrently. A write failure is returned
    /// as-is; keys that were already written are not rolled back.
    pub async fn set_session(
        &self,
        user_data: &Value,
        token: &str,
        refresh_token: &str,
    ) -> Result<Session, SessionError> {
        let user = UserProfile::from_user_data(user_data)?;
        if token.is_empty() {
            return Err(ValidationError::EmptyToken.into());
        }

        let provided_expiry = user_data.get(USER_DATA_EXPIRY_FIELD).and_then(Value::as_str);
        let expiry = resolve_expiry(provided_expiry, Utc::now());
        if provided_expiry.is_some_and(|raw| parse_timestamp(raw) != Some(expiry)) {
            debug!(provided = ?provided_expiry, "Discarded unusable token expiry");
        }

        let user_json = user.to_json()?;
        let expiry_str = format_timestamp(expiry);
        futures::try_join!(
            self.store.set(USER_SESSION_KEY, &user_json),
            self.store.set(AUTH_TOKEN_KEY, token),
            self.store.set(TOKEN_EXPIRY_KEY, &expiry_str),
            self.store.set(REFRESH_TOKEN_KEY, refresh_token),
        )?;

        info!(user_id = %user.user_id, role = %user.role, expires = %expiry_str, "Session stored");

        Ok(Session {
            user,
            token: token.to_string(),
            refresh_token: non_empty(refresh_token.to_string()),
            token_expiry: Some(expiry),
        })
    }

    /// Log in through the auth endpoint and store the resulting session
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, SessionError> {
        let login = self.api.authenticate(email, password).await?;
        self.set_session(&login.user, &login.token, &login.refresh_token)
            .await
    }

    /// Remove all four session keys. Used on logout.
    ///
    /// A background refresh still in flight is awaited first so it cannot
    /// write a token back after the keys are gone.
    pub async fn clear_session(&self) -> Result<(), SessionError> {
        self.wait_for_refresh().await;
        self.store.remove_all(&SESSION_KEYS).await?;
        info!("Session cleared");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current session, refreshing the token when needed.
    ///
    /// - no stored user or token: `None`; other keys are left in place
    /// - token expired: one refresh is awaited; on failure the stale token
    ///   is still returned
    /// - token within the refresh window: a background refresh is started and
    ///   the current session returned without waiting for it. A caller that
    ///   reads the token right after may still see the old value.
    pub async fn get_session(&self) -> Option<Session> {
        let stored = match self.read_stored().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read session from storage");
                return None;
            }
        };

        let (Some(raw_user), Some(mut token)) = (stored.user, stored.token) else {
            debug!("No stored session");
            return None;
        };
        let mut refresh_token = stored.refresh_token.and_then(non_empty);
        let mut token_expiry = stored.expiry.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                warn!(raw, "Ignoring unparseable stored token expiry");
            }
            parsed
        });

        if let Some(expiry) = token_expiry {
            let now = Utc::now();
            if expiry <= now {
                debug!(%expiry, "Token expired, refreshing");
                match self.refresh_now(refresh_token.as_deref()).await {
                    Ok(result) => {
                        token = result.token;
                        token_expiry = Some(result.token_expiry);
                        if result.refresh_token.is_some() {
                            refresh_token = result.refresh_token;
                        }
                    }
                    Err(e) => warn!(error = %e, "Token refresh failed, keeping stale session"),
                }
            } else if expiry - now <= Duration::minutes(REFRESH_THRESHOLD_MINUTES) {
                self.spawn_background_refresh(refresh_token.clone()).await;
            }
        }

        // A corrupt profile must not lock the user out of the UI, so it reads
        // as the Guest placeholder while the token stays usable.
        let user = match UserProfile::parse(&raw_user) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Stored user profile is corrupt, using Guest");
                UserProfile::guest()
            }
        };

        Some(Session {
            user,
            token,
            refresh_token,
            token_expiry,
        })
    }

    pub async fn is_authenticated(&self) -> bool {
        self.get_session().await.is_some()
    }

    /// Bearer token for API calls.
    ///
    /// An expired token is refreshed first; `None` when there is no token or
    /// the refresh fails.
    pub async fn get_auth_token(&self) -> Option<String> {
        let stored = futures::try_join!(
            self.store.get(AUTH_TOKEN_KEY),
            self.store.get(TOKEN_EXPIRY_KEY),
            self.store.get(REFRESH_TOKEN_KEY),
        );
        let (token, expiry, refresh_token) = match stored {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "Failed to read token from storage");
                return None;
            }
        };

        let token = token?;
        let expired = expiry
            .as_deref()
            .and_then(parse_timestamp)
            .is_some_and(|expiry| expiry <= Utc::now());
        if !expired {
            return Some(token);
        }

        match self.refresh_now(refresh_token.as_deref()).await {
            Ok(result) => Some(result.token),
            Err(e) => {
                warn!(error = %e, "Token expired and could not be refreshed");
                None
            }
        }
    }

    /// Expiry currently on record, without triggering any refresh
    pub async fn stored_expiry(&self) -> Option<DateTime<Utc>> {
        match self.store.get(TOKEN_EXPIRY_KEY).await {
            Ok(raw) => raw.as_deref().and_then(parse_timestamp),
            Err(e) => {
                warn!(error = %e, "Failed to read token expiry");
                None
            }
        }
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Wait for the most recent background refresh, if one is in flight.
    ///
    /// `get_session` never waits on its own; this is for orderly shutdown and
    /// for callers that need the refreshed token on the next read.
    pub async fn wait_for_refresh(&self) {
        let handle = self.background.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background token refresh task failed");
            }
        }
    }

    async fn refresh_now(&self, refresh_token: Option<&str>) -> Result<RefreshResult, RefreshError> {
        self.refresher.refresh(refresh_token.unwrap_or_default()).await
    }

    /// Start a detached refresh. Its only observable effect is on the store.
    async fn spawn_background_refresh(&self, refresh_token: Option<String>) {
        let Some(refresh_token) = refresh_token else {
            debug!("Token expires soon but no refresh token is stored");
            return;
        };

        let mut background = self.background.lock().await;
        if background.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Background refresh already running");
            return;
        }

        debug!("Token expires soon, refreshing in background");
        let refresher = self.refresher.clone();
        *background = Some(tokio::spawn(async move {
            if let Err(e) = refresher.refresh(&refresh_token).await {
                warn!(error = %e, "Background token refresh failed");
            }
        }));
    }

    async fn read_stored(&self) -> Result<StoredSession, StoreError> {
        let (user, token, expiry, refresh_token) = futures::try_join!(
            self.store.get(USER_SESSION_KEY),
            self.store.get(AUTH_TOKEN_KEY),
            self.store.get(TOKEN_EXPIRY_KEY),
            self.store.get(REFRESH_TOKEN_KEY),
        )?;
        Ok(StoredSession {
            user,
            token,
            expiry,
            refresh_token,
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::store::MemoryStore;

    /// Store whose writes or removals can be made to fail
    #[derive(Default)]
    struct FaultyStore {
        inner: MemoryStore,
        fail_reads: bool,
        fail_writes: bool,
        fail_removes: bool,
    }

    #[async_trait]
    impl SessionStore for FaultyStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if self.fail_reads {
                return Err(StoreError::Unavailable("reads disabled".to_string()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.fail_writes && key == TOKEN_EXPIRY_KEY {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
            if self.fail_removes {
                return Err(StoreError::Unavailable("locked".to_string()));
            }
            self.inner.remove_all(keys).await
        }
    }

    fn offline_api() -> ApiClient {
        ApiClient::new("http://127.0.0.1:9").unwrap()
    }

    fn user_data() -> Value {
        json!({
            "userId": "u-1",
            "username": "inspector",
            "email": "inspector@county.gov",
            "role": "inspector"
        })
    }

    #[tokio::test]
    async fn test_set_session_returns_normalized_session() {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(store.clone(), offline_api());

        let session = manager.set_session(&user_data(), "tok", "ref").await.unwrap();

        assert_eq!(session.user.username, "inspector");
        assert_eq!(session.user.profile_photo, None);
        assert_eq!(session.refresh_token.as_deref(), Some("ref"));
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_set_session_keeps_future_expiry() {
        let manager = SessionManager::new(Arc::new(MemoryStore::new()), offline_api());
        let mut data = user_data();
        data["tokenExpiry"] = json!("2099-06-01T08:00:00Z");

        let session = manager.set_session(&data, "tok", "ref").await.unwrap();

        assert_eq!(
            session.token_expiry.map(|e| e.to_rfc3339()).as_deref(),
            Some("2099-06-01T08:00:00+00:00")
        );
    }

    #[tokio::test]
    async fn test_set_session_rejects_empty_token() {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(store.clone(), offline_api());

        let err = manager.set_session(&user_data(), "", "ref").await.unwrap_err();

        assert!(matches!(err, SessionError::Validation(ValidationError::EmptyToken)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_session_surfaces_partial_write_failure() {
        let store = Arc::new(FaultyStore {
            fail_writes: true,
            ..Default::default()
        });
        let manager = SessionManager::new(store.clone(), offline_api());

        let err = manager.set_session(&user_data(), "tok", "ref").await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(_)));
    }

    #[tokio::test]
    async fn test_clear_session_surfaces_storage_failure() {
        let store = Arc::new(FaultyStore {
            fail_removes: true,
            ..Default::default()
        });
        let manager = SessionManager::new(store.clone(), offline_api());
        manager.set_session(&user_data(), "tok", "ref").await.unwrap();

        assert!(matches!(manager.clear_session().await, Err(SessionError::Storage(_))));
        assert!(manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_read_failure_reads_as_no_session() {
        let store = Arc::new(FaultyStore {
            fail_reads: true,
            ..Default::default()
        });
        let manager = SessionManager::new(store, offline_api());

        assert!(manager.get_session().await.is_none());
        assert!(manager.get_auth_token().await.is_none());
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_partial_state_is_left_alone() {
        let store = Arc::new(MemoryStore::new());
        store.set(USER_SESSION_KEY, r#"{"userId":"1","username":"a","email":"b","role":"c"}"#).await.unwrap();
        store.set(REFRESH_TOKEN_KEY, "ref").await.unwrap();
        let manager = SessionManager::new(store.clone(), offline_api());

        assert!(manager.get_session().await.is_none());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_corrupt_profile_reads_as_guest() {
        let store = Arc::new(MemoryStore::new());
        store.set(USER_SESSION_KEY, "{corrupt").await.unwrap();
        store.set(AUTH_TOKEN_KEY, "tok").await.unwrap();
        let manager = SessionManager::new(store, offline_api());

        let session = manager.get_session().await.unwrap();
        assert!(session.is_guest());
        assert_eq!(session.user.username, "Guest");
        assert_eq!(session.token, "tok");
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_returns_stale_session() {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(store.clone(), offline_api());
        manager.set_session(&user_data(), "tok", "").await.unwrap();
        let past = format_timestamp(Utc::now() - Duration::minutes(1));
        store.set(TOKEN_EXPIRY_KEY, &past).await.unwrap();

        let session = manager.get_session().await.unwrap();
        assert_eq!(session.token, "tok");
        assert_eq!(session.refresh_token, None);
        assert!(manager.get_auth_token().await.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_refresh_without_task_returns() {
        let manager = SessionManager::new(Arc::new(MemoryStore::new()), offline_api());
        manager.wait_for_refresh().await;
    }
}
