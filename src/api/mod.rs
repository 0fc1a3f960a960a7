use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::auth::{CredentialError, CredentialManager};
use crate::leaderboard::Leaderboard;
use crate::live::PollScheduler;

/// How long a login `state` stays redeemable.
const STATE_TTL_MINUTES: i64 = 10;
/// Upper bound on outstanding login nonces.
const MAX_PENDING_STATES: usize = 1024;

/// `state` nonces handed out by /auth/login and not yet redeemed.
#[derive(Debug, Default)]
pub struct PendingStates {
    issued: HashMap<String, DateTime<Utc>>,
}

impl PendingStates {
    pub fn issue(&mut self, nonce: String, now: DateTime<Utc>) {
        self.prune(now);
        if self.issued.len() >= MAX_PENDING_STATES {
            let oldest = self
                .issued
                .iter()
                .min_by_key(|(_, &at)| at)
                .map(|(nonce, _)| nonce.clone());
            if let Some(oldest) = oldest {
                self.issued.remove(&oldest);
            }
        }
        self.issued.insert(nonce, now);
    }

    /// Consume `nonce`. Unknown, reused and expired nonces are refused.
    pub fn redeem(&mut self, nonce: &str, now: DateTime<Utc>) -> bool {
        match self.issued.remove(nonce) {
            Some(at) => now - at < Duration::minutes(STATE_TTL_MINUTES),
            None => false,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.issued.len()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let ttl = Duration::minutes(STATE_TTL_MINUTES);
        self.issued.retain(|_, at| now - *at < ttl);
    }
}

/// Parameters for building the Twitch authorize redirect.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub authorize_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: String,
}

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialManager>,
    pub scheduler: PollScheduler,
    pub leaderboard: Arc<dyn Leaderboard>,
    pub oauth: OAuthSettings,
    pub pending_states: Arc<Mutex<PendingStates>>,
}

impl AppState {
    pub fn new(
        credentials: Arc<CredentialManager>,
        scheduler: PollScheduler,
        leaderboard: Arc<dyn Leaderboard>,
        oauth: OAuthSettings,
    ) -> Self {
        AppState {
            credentials,
            scheduler,
            leaderboard,
            oauth,
            pending_states: Arc::new(Mutex::new(PendingStates::default())),
        }
    }
}

/// Build the Axum router for the HTTP API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/getRank/:name", get(rank_handler))
        .route("/subscriptions", get(subscriptions_handler))
        .route("/subscriptions/:subject", post(enroll_handler))
        .route("/auth/login", get(login_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/auth/status", get(auth_status_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn health_handler() -> &'static str {
    "ok"
}

/// GET /getRank/:name
async fn rank_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match state.leaderboard.lookup_rank(&name).await {
        Ok(Some(entry)) => Ok(Json(entry)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            format!("{} is not on the leaderboard", name),
        )),
        Err(e) => {
            warn!("Leaderboard lookup for {} failed: {}", name, e);
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscriptionsResponse {
    running: bool,
    subjects: BTreeMap<String, bool>,
}

/// GET /subscriptions
async fn subscriptions_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SubscriptionsResponse {
        running: state.scheduler.is_running().await,
        subjects: state.scheduler.subscriptions().await,
    })
}

#[derive(Debug, Serialize)]
struct EnrollResponse {
    subject: String,
    /// Whether this request (re)started the polling loop
    started: bool,
}

/// POST /subscriptions/:subject
async fn enroll_handler(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let subject = subject.trim().to_lowercase();
    if subject.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "subject must not be empty".into()));
    }
    let started = state.scheduler.enroll(&subject).await.is_some();
    Ok((
        StatusCode::ACCEPTED,
        Json(EnrollResponse { subject, started }),
    ))
}

/// GET /auth/login
async fn login_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let nonce = random_state();
    let url = authorize_url(&state.oauth, &nonce)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    state.pending_states.lock().await.issue(nonce, Utc::now());
    Ok(Redirect::to(url.as_str()))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /auth/callback?code=...&state=...
async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let nonce = params.state.unwrap_or_default();
    if !state.pending_states.lock().await.redeem(&nonce, Utc::now()) {
        return Err((
            StatusCode::BAD_REQUEST,
            "unknown, reused or expired state".into(),
        ));
    }

    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        warn!("Authorization denied: {} {}", error, description);
        return Err((
            StatusCode::BAD_REQUEST,
            format!("authorization denied: {} {}", error, description),
        ));
    }

    let code = params
        .code
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "missing code".to_string()))?;

    state
        .credentials
        .complete_authorization(&code)
        .await
        .map_err(|e| match e {
            CredentialError::RenewalFailed(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        })?;

    info!("OAuth callback completed");
    Ok("Authorization complete")
}

/// GET /auth/status
async fn auth_status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.credentials.status().await)
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn authorize_url(oauth: &OAuthSettings, nonce: &str) -> Result<url::Url, url::ParseError> {
    url::Url::parse_with_params(
        &oauth.authorize_url,
        &[
            ("client_id", oauth.client_id.as_str()),
            ("redirect_uri", oauth.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", oauth.scopes.as_str()),
            ("state", nonce),
        ],
    )
}
