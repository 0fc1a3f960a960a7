use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::client::Leaderboard;
use crate::live::RankNotifier;

/// Looks up a live subject's leaderboard rank and logs it.
pub struct LeaderboardNotifier {
    leaderboard: Arc<dyn Leaderboard>,
}

impl LeaderboardNotifier {
    pub fn new(leaderboard: Arc<dyn Leaderboard>) -> Self {
        LeaderboardNotifier { leaderboard }
    }
}

#[async_trait]
impl RankNotifier for LeaderboardNotifier {
    async fn notify(&self, subject: &str) -> Result<()> {
        match self.leaderboard.lookup_rank(subject).await? {
            Some(entry) => info!(
                "{} is live, leaderboard rank #{} (score {:?})",
                subject, entry.rank, entry.score
            ),
            None => info!("{} is live, not on the leaderboard", subject),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::client::{find_player, RankEntry};
    use std::sync::Mutex;

    struct FixedLeaderboard {
        entries: Vec<RankEntry>,
        lookups: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Leaderboard for FixedLeaderboard {
        async fn lookup_rank(&self, name: &str) -> Result<Option<RankEntry>> {
            self.lookups.lock().unwrap().push(name.to_string());
            Ok(find_player(&self.entries, name).cloned())
        }
    }

    struct DownLeaderboard;

    #[async_trait]
    impl Leaderboard for DownLeaderboard {
        async fn lookup_rank(&self, _name: &str) -> Result<Option<RankEntry>> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_notify_looks_up_subject() {
        let board = Arc::new(FixedLeaderboard {
            entries: vec![RankEntry {
                name: "f0rest".into(),
                rank: 12,
                score: None,
            }],
            lookups: Mutex::new(vec![]),
        });
        let notifier = LeaderboardNotifier::new(board.clone());

        notifier.notify("f0rest").await.unwrap();
        notifier.notify("unknown").await.unwrap();
        assert_eq!(
            *board.lookups.lock().unwrap(),
            vec!["f0rest".to_string(), "unknown".to_string()]
        );
    }

    #[tokio::test]
    async fn test_notify_propagates_lookup_failure() {
        let notifier = LeaderboardNotifier::new(Arc::new(DownLeaderboard));
        assert!(notifier.notify("f0rest").await.is_err());
    }
}
