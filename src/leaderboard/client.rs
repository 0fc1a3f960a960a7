use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Valve's public CS2 Premier leaderboard.
pub const DEFAULT_LEADERBOARD_URL: &str = "https://api.steampowered.com/ICSGOServers_730/GetLeaderboardEntries/v1?lbname=official_leaderboard_premier_season1";

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub name: String,
    pub rank: u32,
    #[serde(default)]
    pub score: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LeaderboardResponse {
    #[serde(default)]
    result: Option<LeaderboardResult>,
}

#[derive(Debug, Deserialize)]
struct LeaderboardResult {
    #[serde(default)]
    entries: Vec<RankEntry>,
}

/// Source of leaderboard ranks.
#[async_trait]
pub trait Leaderboard: Send + Sync {
    /// Rank of the player called `name`, if listed.
    async fn lookup_rank(&self, name: &str) -> Result<Option<RankEntry>>;
}

/// Leaderboard read over HTTP on every lookup.
pub struct HttpLeaderboard {
    http: Client,
    url: String,
}

impl HttpLeaderboard {
    pub fn new(http: Client, url: &str) -> Self {
        HttpLeaderboard {
            http,
            url: url.to_string(),
        }
    }

    async fn fetch_entries(&self) -> Result<Vec<RankEntry>> {
        debug!("Fetching leaderboard from {}", self.url);

        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("Leaderboard request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Leaderboard error: {}", resp.status());
        }

        let raw: LeaderboardResponse = resp
            .json()
            .await
            .context("Failed to parse leaderboard response")?;

        Ok(raw.result.map(|r| r.entries).unwrap_or_default())
    }
}

#[async_trait]
impl Leaderboard for HttpLeaderboard {
    async fn lookup_rank(&self, name: &str) -> Result<Option<RankEntry>> {
        let entries = self.fetch_entries().await?;
        Ok(find_player(&entries, name).cloned())
    }
}

/// Case-insensitive linear search by player name.
pub fn find_player<'a>(entries: &'a [RankEntry], name: &str) -> Option<&'a RankEntry> {
    let name = name.trim();
    entries.iter().find(|e| e.name.eq_ignore_ascii_case(name))
}
