use clap::Parser;

use crate::auth::exchange::TWITCH_TOKEN_URL;
use crate::leaderboard::DEFAULT_LEADERBOARD_URL;
use crate::twitch::HELIX_API_URL;

/// Twitch live-status poller with leaderboard rank lookup
#[derive(Parser, Debug, Clone)]
#[command(name = "pingrank", version, about)]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "pingrank.db")]
    pub database_path: String,

    /// Twitch application client ID
    #[arg(long, env = "TWITCH_CLIENT_ID")]
    pub client_id: String,

    /// Twitch application client secret
    #[arg(long, env = "TWITCH_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Redirect URI registered for the authorization-code flow
    #[arg(
        long,
        env = "TWITCH_REDIRECT_URI",
        default_value = "http://localhost:8080/auth/callback"
    )]
    pub redirect_uri: String,

    /// OAuth scopes requested on /auth/login (space separated)
    #[arg(long, env = "TWITCH_SCOPES", default_value = "")]
    pub scopes: String,

    /// Twitch OAuth authorize URL
    #[arg(
        long,
        env = "TWITCH_AUTHORIZE_URL",
        default_value = "https://id.twitch.tv/oauth2/authorize"
    )]
    pub authorize_url: String,

    /// Twitch OAuth token URL
    #[arg(long, env = "TWITCH_TOKEN_URL", default_value = TWITCH_TOKEN_URL)]
    pub token_url: String,

    /// Twitch Helix API base URL
    #[arg(long, env = "TWITCH_HELIX_URL", default_value = HELIX_API_URL)]
    pub helix_url: String,

    /// Allow minting an app access token with the client-credentials grant
    #[arg(
        long,
        env = "ALLOW_CLIENT_CREDENTIALS",
        default_value = "true",
        action = clap::ArgAction::Set
    )]
    pub allow_client_credentials: bool,

    /// Renew the credential this many seconds before it expires
    #[arg(long, env = "RENEWAL_SKEW_SECS", default_value = "300")]
    pub renewal_skew_secs: u64,

    /// Delay between live-status poll cycles in seconds
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "240")]
    pub poll_interval_secs: u64,

    /// Twitch logins enrolled for polling at startup (comma separated)
    #[arg(
        long,
        env = "SUBJECTS",
        value_delimiter = ',',
        default_values = ["olofmeister", "f0rest"]
    )]
    pub subjects: Vec<String>,

    /// Leaderboard endpoint queried for rank lookups
    #[arg(long, env = "LEADERBOARD_URL", default_value = DEFAULT_LEADERBOARD_URL)]
    pub leaderboard_url: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client_id.trim().is_empty() {
            anyhow::bail!("TWITCH_CLIENT_ID must not be empty");
        }
        if self.client_secret.trim().is_empty() {
            anyhow::bail!("TWITCH_CLIENT_SECRET must not be empty");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be positive");
        }
        if self.renewal_skew_secs > 3600 {
            anyhow::bail!("renewal_skew_secs must be at most 3600");
        }
        url::Url::parse(&self.redirect_uri)
            .map_err(|e| anyhow::anyhow!("invalid redirect_uri '{}': {}", self.redirect_uri, e))?;
        Ok(())
    }

    /// Configured subjects, trimmed, lowercased and without blanks
    pub fn initial_subjects(&self) -> Vec<String> {
        self.subjects
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
