use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod api;
mod auth;
mod config;
mod db;
mod leaderboard;
mod live;
mod twitch;

use api::{AppState, OAuthSettings};
use auth::{CredentialManager, ManagerOptions, TwitchTokenExchange};
use config::Config;
use db::Database;
use leaderboard::{HttpLeaderboard, LeaderboardNotifier};
use live::{LivePoller, PollScheduler};
use twitch::HelixClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    // Credential manager, seeded from the persisted record
    let exchange = TwitchTokenExchange::new(
        http.clone(),
        &config.token_url,
        &config.client_id,
        &config.client_secret,
    );
    let credentials = Arc::new(CredentialManager::new(
        Arc::new(db.clone()),
        Arc::new(exchange),
        ManagerOptions {
            renewal_skew: chrono::Duration::seconds(config.renewal_skew_secs as i64),
            allow_client_credentials: config.allow_client_credentials,
            redirect_uri: config.redirect_uri.clone(),
        },
    ));
    if let Err(e) = credentials.hydrate().await {
        warn!("Could not load persisted credential: {}", e);
    }

    // Live polling
    let oracle = Arc::new(HelixClient::new(
        http.clone(),
        &config.helix_url,
        &config.client_id,
    ));
    let poller = Arc::new(LivePoller::new(credentials.clone(), oracle));
    let leaderboard = Arc::new(HttpLeaderboard::new(http, &config.leaderboard_url));
    let notifier = Arc::new(LeaderboardNotifier::new(leaderboard.clone()));
    let scheduler = PollScheduler::new(
        poller,
        notifier,
        Duration::from_secs(config.poll_interval_secs),
    );

    for subject in config.initial_subjects() {
        scheduler.enroll(&subject).await;
    }

    // HTTP API
    let state = AppState::new(
        credentials,
        scheduler,
        leaderboard,
        OAuthSettings {
            authorize_url: config.authorize_url.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
        },
    );
    let app = api::router(state);
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run API server (blocks until shutdown)
    axum::serve(listener, app).await?;

    Ok(())
}
