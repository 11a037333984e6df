use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::hub::{HubError, HubResult};

/// Bearer credential handed out at signup and login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "auth_token")]
    pub token: String,
    #[serde(rename = "created", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "expiry", with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthToken {
    pub const DEFAULT_TTL: Duration = Duration::hours(720);

    pub fn mint(ttl: Duration) -> Self {
        Self::mint_at(OffsetDateTime::now_utc(), ttl)
    }

    pub fn mint_at(now: OffsetDateTime, ttl: Duration) -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn validate(&self) -> HubResult<()> {
        self.validate_at(OffsetDateTime::now_utc())
    }

    pub fn validate_at(&self, now: OffsetDateTime) -> HubResult<()> {
        if self.token.is_empty() {
            return Err(HubError::AuthMissing);
        }
        if now >= self.expires_at {
            return Err(HubError::AuthExpired);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
