use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed key of the single persisted credential row.
pub const CREDENTIAL_KEY: &str = "twitch";

/// The persisted mirror of the in-memory Twitch credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    /// Only present for authorization-code derived credentials
    pub refresh_token: Option<String>,
    /// Absolute expiry as Unix epoch milliseconds
    pub expires_at_ms: i64,
    pub updated_at: DateTime<Utc>,
}
