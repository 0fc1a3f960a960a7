pub mod client;
pub mod notifier;

pub use client::{HttpLeaderboard, Leaderboard, DEFAULT_LEADERBOARD_URL};
pub use notifier::LeaderboardNotifier;
