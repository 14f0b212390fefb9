//! Token storage

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Treat tokens as expired this long before their real expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Stored bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn new(token: String, expires_in_secs: Option<u64>) -> Self {
        Self::issued_at(token, expires_in_secs, Utc::now())
    }

    pub fn issued_at(token: String, expires_in_secs: Option<u64>, now: DateTime<Utc>) -> Self {
        let expires_at = expires_in_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| now + Duration::seconds(secs));
        Self { token, expires_at }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= exp,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
