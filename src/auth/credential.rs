use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;

use crate::db::models::CredentialRecord;

/// The OAuth2 credential triple. Always replaced as a whole, never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// How usable a credential is at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// No access token at all
    Missing,
    /// Usable without touching the network
    Fresh,
    /// Still accepted by the platform but inside the renewal window
    NeedsRenewal,
    Expired,
}

impl Credential {
    /// Build a credential from a token response received at `now`.
    /// Returns `None` if `expires_in_secs` does not fit in a timestamp.
    pub fn issued(
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: i64,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let expires_at = Duration::try_seconds(expires_in_secs)
            .and_then(|lifetime| now.checked_add_signed(lifetime))?;
        Some(Credential {
            access_token: Some(access_token),
            refresh_token,
            expires_at: Some(expires_at),
        })
    }

    pub fn freshness(&self, now: DateTime<Utc>, renewal_skew: Duration) -> Freshness {
        let (Some(_), Some(expires_at)) = (&self.access_token, self.expires_at) else {
            return Freshness::Missing;
        };
        if now + renewal_skew < expires_at {
            Freshness::Fresh
        } else if now < expires_at {
            Freshness::NeedsRenewal
        } else {
            Freshness::Expired
        }
    }

    /// The access token, if the platform would still accept it at `now`.
    pub fn unexpired_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match self.expires_at {
            Some(expires_at) if now < expires_at => self.access_token.as_deref(),
            _ => None,
        }
    }

    pub fn expires_at_ms(&self) -> Option<i64> {
        self.expires_at.map(|t| t.timestamp_millis())
    }
}

impl From<CredentialRecord> for Credential {
    fn from(rec: CredentialRecord) -> Self {
        Credential {
            access_token: Some(rec.access_token),
            refresh_token: rec.refresh_token,
            // An unreadable expiry is treated as already expired so the
            // refresh token still gets used.
            expires_at: Some(
                Utc.timestamp_millis_opt(rec.expires_at_ms)
                    .single()
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
        }
    }
}
