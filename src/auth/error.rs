use thiserror::Error;

/// Errors that can occur while obtaining or renewing the Twitch credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No usable credential and no renewal path succeeded.
    #[error("No usable credential available")]
    Unavailable,

    /// The token endpoint rejected the exchange or could not be reached.
    #[error("Token exchange failed: {0}")]
    RenewalFailed(String),

    /// Reading or writing the persisted credential failed.
    #[error("Credential persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl From<reqwest::Error> for CredentialError {
    fn from(err: reqwest::Error) -> Self {
        CredentialError::RenewalFailed(err.to_string())
    }
}
