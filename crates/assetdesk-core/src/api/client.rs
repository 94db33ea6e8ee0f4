//! HTTP client for the asset tracking auth endpoints.
//!
//! The backend exposes one PHP script per operation. Every response is wrapped
//! in the same `{ "status": "success" | "error", "message"?, "data"? }`
//! envelope, and a request only counts as successful when the HTTP status is
//! 2xx *and* the envelope says `success`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::utils::resolve_expiry;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// The refresh exchange has no timeout of its own and relies on this one.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const REFRESH_PATH: &str = "refresh.php";
const LOGIN_PATH: &str = "login.php";

const STATUS_SUCCESS: &str = "success";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    token: Option<String>,
    token_expiry: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    user: Option<serde_json::Value>,
    token: Option<String>,
    refresh_token: Option<String>,
}

/// Outcome of a successful refresh exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshResult {
    pub token: String,
    pub token_expiry: DateTime<Utc>,
    /// Only present when the server rotated the refresh token
    pub refresh_token: Option<String>,
}

/// The `(userData, token, refreshToken)` triple produced by a login.
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user: serde_json::Value,
    pub token: String,
    pub refresh_token: String,
}

// ============================================================================
// Client
// ============================================================================

/// API client for the auth endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client with the default request timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Exchange a refresh token for a new bearer token.
    ///
    /// Makes exactly one request. A missing or unusable `tokenExpiry` in the
    /// response is replaced with a fresh default lifetime.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshResult, ApiError> {
        let body = RefreshRequest { refresh_token };
        let data: RefreshData = self.post(REFRESH_PATH, &body).await?;

        let token = data
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("refresh response has no token".to_string()))?;

        Ok(RefreshResult {
            token,
            token_expiry: resolve_expiry(data.token_expiry.as_deref(), Utc::now()),
            refresh_token: data.refresh_token.filter(|t| !t.is_empty()),
        })
    }

    /// Log in with email and password
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<LoginResult, ApiError> {
        let body = LoginRequest { email, password };
        let data: LoginData = self.post(LOGIN_PATH, &body).await?;

        let missing = |field: &str| ApiError::InvalidResponse(format!("login response has no {}", field));

        Ok(LoginResult {
            user: data.user.ok_or_else(|| missing("user"))?,
            token: data.token.filter(|t| !t.is_empty()).ok_or_else(|| missing("token"))?,
            refresh_token: data.refresh_token.unwrap_or_default(),
        })
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// POST a JSON body and unwrap the response envelope. No retries.
    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.url(path);

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        debug!(url = %url, bytes = text.len(), "Response received");

        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("{}: {}", e, ApiError::truncate_body(&text)))
        })?;

        if envelope.status != STATUS_SUCCESS {
            return Err(ApiError::Rejected(
                envelope.message.unwrap_or_else(|| format!("status \"{}\"", envelope.status)),
            ));
        }

        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("response has no data".to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_refresh_token_success() {
        let mut server = mockito::Server::new_async().await;
        let expiry = Utc::now() + ChronoDuration::minutes(30);

        let mock = server
            .mock("POST", "/refresh.php")
            .match_body(mockito::Matcher::Json(serde_json::json!({ "refreshToken": "r-1" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "status": "success",
                    "data": {
                        "token": "t-2",
                        "tokenExpiry": expiry.to_rfc3339(),
                        "refreshToken": "r-2"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(server.url()).unwrap();
        let result = client.refresh_token("r-1").await.unwrap();

        assert_eq!(result.token, "t-2");
        assert_eq!(result.token_expiry.timestamp(), expiry.timestamp());
        assert_eq!(result.refresh_token.as_deref(), Some("r-2"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_token_defaults_expiry_and_keeps_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/refresh.php")
            .with_status(200)
            .with_body(r#"{"status":"success","data":{"token":"t-2"}}"#)
            .create_async()
            .await;

        let client = ApiClient::new(format!("{}/", server.url())).unwrap();
        let before = Utc::now();
        let result = client.refresh_token("r-1").await.unwrap();

        assert_eq!(result.refresh_token, None);
        assert!(result.token_expiry >= before + ChronoDuration::minutes(59));
        assert!(result.token_expiry <= Utc::now() + ChronoDuration::minutes(60));
    }

    #[tokio::test]
    async fn test_refresh_token_failures() {
        let mut server = mockito::Server::new_async().await;
        let client = ApiClient::new(server.url()).unwrap();

        let m = server
            .mock("POST", "/refresh.php")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        assert!(matches!(client.refresh_token("r").await, Err(ApiError::ServerError(_))));
        m.remove_async().await;

        let m = server
            .mock("POST", "/refresh.php")
            .with_status(200)
            .with_body(r#"{"status":"error","message":"Invalid refresh token"}"#)
            .create_async()
            .await;
        assert!(matches!(client.refresh_token("r").await, Err(ApiError::Rejected(msg)) if msg == "Invalid refresh token"));
        m.remove_async().await;

        let m = server
            .mock("POST", "/refresh.php")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;
        assert!(matches!(client.refresh_token("r").await, Err(ApiError::InvalidResponse(_))));
        m.remove_async().await;

        // Success envelope without a data object
        let m = server
            .mock("POST", "/refresh.php")
            .with_status(200)
            .with_body(r#"{"status":"success"}"#)
            .create_async()
            .await;
        assert!(matches!(
            client.refresh_token("r").await,
            Err(ApiError::InvalidResponse(msg)) if msg == "response has no data"
        ));
        m.remove_async().await;

        server
            .mock("POST", "/refresh.php")
            .with_status(200)
            .with_body(r#"{"status":"success","data":{"tokenExpiry":"2030-01-01T00:00:00Z"}}"#)
            .create_async()
            .await;
        assert!(matches!(client.refresh_token("r").await, Err(ApiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/login.php")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "email": "clerk@county.gov",
                "password": "hunter2"
            })))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "status": "success",
                    "data": {
                        "user": { "userId": 12, "username": "clerk", "email": "clerk@county.gov", "role": "technician" },
                        "token": "t-1",
                        "refreshToken": "r-1"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(server.url()).unwrap();
        let login = client.authenticate("clerk@county.gov", "hunter2").await.unwrap();

        assert_eq!(login.token, "t-1");
        assert_eq!(login.refresh_token, "r-1");
        assert_eq!(login.user["username"], "clerk");
    }

    #[tokio::test]
    async fn test_authenticate_bad_credentials() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/login.php")
            .with_status(401)
            .create_async()
            .await;

        let client = ApiClient::new(server.url()).unwrap();
        assert!(matches!(
            client.authenticate("clerk@county.gov", "wrong").await,
            Err(ApiError::Unauthorized)
        ));
    }
}
