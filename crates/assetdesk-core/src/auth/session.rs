use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::utils::time::REFRESH_THRESHOLD_MINUTES;

use super::{SessionError, ValidationError};

/// Fields a user payload must carry for a session to be valid.
pub const REQUIRED_USER_FIELDS: [&str; 4] = ["userId", "username", "email", "role"];

const GUEST_USER_ID: &str = "0";
const GUEST_USERNAME: &str = "Guest";
const GUEST_ROLE: &str = "guest";

/// Identity part of a session, stored JSON-encoded under `userSession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserProfile {
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub profile_photo: Option<String>,
}

/// The login endpoint sends numeric ids; older payloads send strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

impl UserProfile {
    /// Validate and normalize a user payload from the login collaborator.
    ///
    /// A field that is present but `null` counts as missing.
    pub fn from_user_data(data: &Value) -> Result<Self, ValidationError> {
        let record = data.as_object().ok_or(ValidationError::NotARecord)?;

        let missing: Vec<String> = REQUIRED_USER_FIELDS
            .iter()
            .filter(|field| record.get(**field).map_or(true, Value::is_null))
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        Self::deserialize(data).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    /// Decode the stored `userSession` value
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        serde_json::from_str(raw).map_err(SessionError::Parse)
    }

    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(SessionError::Encode)
    }

    /// Placeholder identity shown when the stored profile is unreadable
    pub fn guest() -> Self {
        Self {
            user_id: GUEST_USER_ID.to_string(),
            username: GUEST_USERNAME.to_string(),
            email: String::new(),
            role: GUEST_ROLE.to_string(),
            profile_photo: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.user_id == GUEST_USER_ID && self.username == GUEST_USERNAME && self.role == GUEST_ROLE
    }
}

/// An authenticated user plus the tokens held for them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(flatten)]
    pub user: UserProfile,
    pub token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.token_expiry.is_some_and(|expiry| Utc::now() >= expiry)
    }

    /// Check if the token will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        self.time_until_expiry().is_some_and(|remaining| {
            remaining > Duration::zero() && remaining <= Duration::minutes(REFRESH_THRESHOLD_MINUTES)
        })
    }

    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.token_expiry.map(|expiry| expiry - Utc::now())
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.time_until_expiry().map(|d| d.num_minutes().max(0))
    }

    pub fn is_guest(&self) -> bool {
        self.user.is_guest()
    }
}
