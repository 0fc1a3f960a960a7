use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const HELIX_API_URL: &str = "https://api.twitch.tv/helix";

#[derive(Debug, Error)]
pub enum OracleError {
    /// The bearer token was rejected (HTTP 401)
    #[error("Bearer token rejected")]
    Unauthorized,
    #[error("Helix API error: {0}")]
    Status(StatusCode),
    #[error("Helix request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One live stream as reported by Helix `GET /streams`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamSession {
    pub id: String,
    pub user_login: String,
    #[serde(default)]
    pub game_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    data: Option<Vec<StreamSession>>,
}

/// Answers "is this subject live right now?".
#[async_trait]
pub trait LivenessOracle: Send + Sync {
    /// Active sessions for `subject`; empty if the subject is offline.
    async fn active_sessions(
        &self,
        subject: &str,
        bearer: &str,
    ) -> Result<Vec<StreamSession>, OracleError>;
}

/// Liveness oracle backed by the Twitch Helix API.
pub struct HelixClient {
    http: Client,
    base_url: String,
    client_id: String,
}

impl HelixClient {
    pub fn new(http: Client, base_url: &str, client_id: &str) -> Self {
        HelixClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        }
    }
}

#[async_trait]
impl LivenessOracle for HelixClient {
    async fn active_sessions(
        &self,
        subject: &str,
        bearer: &str,
    ) -> Result<Vec<StreamSession>, OracleError> {
        let url = format!("{}/streams", self.base_url);
        debug!("Checking live status of {}", subject);

        let resp = self
            .http
            .get(&url)
            .query(&[("user_login", subject)])
            .bearer_auth(bearer)
            .header("Client-Id", &self.client_id)
            .send()
            .await?;

        check_status(resp.status())?;
        let raw = resp.text().await?;
        Ok(parse_streams_response(&raw))
    }
}

/// 401 is kept apart from other failures so callers can renew and retry.
fn check_status(status: StatusCode) -> Result<(), OracleError> {
    match status {
        StatusCode::UNAUTHORIZED => Err(OracleError::Unauthorized),
        s if !s.is_success() => Err(OracleError::Status(s)),
        _ => Ok(()),
    }
}

/// A body that does not decode is treated as "no sessions".
fn parse_streams_response(raw: &str) -> Vec<StreamSession> {
    serde_json::from_str::<StreamsResponse>(raw)
        .ok()
        .and_then(|r| r.data)
        .unwrap_or_default()
}
