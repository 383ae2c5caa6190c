//! OAuth bearer tokens.
//!
//! The client only needs the access token for the `Authorization` header;
//! expiry bookkeeping is exposed so callers can decide when to refresh.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds, counted from `created`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
}

impl OAuthToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_in: None,
            created: Utc::now(),
        }
    }

    pub fn with_expires_in(mut self, seconds: i64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    pub fn authorization_value(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let lifetime = TimeDelta::try_seconds(self.expires_in?)?;
        self.created.checked_add_signed(lifetime)
    }

    /// Tokens without expiry information count as expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(true, |expires| now >= expires)
    }

    pub fn validity_description(&self) -> String {
        self.validity_description_at(Utc::now())
    }

    pub fn validity_description_at(&self, now: DateTime<Utc>) -> String {
        match self.expires_at() {
            None => "no expiry information".to_string(),
            Some(expires) if now >= expires => {
                format!("expired {} ago", format_span((now - expires).num_seconds()))
            }
            Some(expires) => {
                format!("valid for {}", format_span((expires - now).num_seconds()))
            }
        }
    }
}

fn format_span(seconds: i64) -> String {
    let (hours, minutes, seconds) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
