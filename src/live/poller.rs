use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::CredentialManager;
use crate::twitch::{LivenessOracle, OracleError, StreamSession};

/// Fail-closed live check: every failure reads as "not live".
pub struct LivePoller {
    credentials: Arc<CredentialManager>,
    oracle: Arc<dyn LivenessOracle>,
}

impl LivePoller {
    pub fn new(credentials: Arc<CredentialManager>, oracle: Arc<dyn LivenessOracle>) -> Self {
        LivePoller {
            credentials,
            oracle,
        }
    }

    pub async fn is_active(&self, subject: &str) -> bool {
        match self.sessions(subject).await {
            Ok(sessions) => match sessions.first() {
                Some(s) => {
                    debug!(
                        "{} is live (stream {}, {}: {})",
                        s.user_login,
                        s.id,
                        s.game_name.as_deref().unwrap_or("-"),
                        s.title.as_deref().unwrap_or("")
                    );
                    true
                }
                None => false,
            },
            Err(e) => {
                warn!("Live check for {} failed: {}", subject, e);
                false
            }
        }
    }

    async fn sessions(&self, subject: &str) -> anyhow::Result<Vec<StreamSession>> {
        let token = self.credentials.acquire().await?;

        match self.oracle.active_sessions(subject, &token).await {
            Err(OracleError::Unauthorized) => {
                debug!("Token rejected while checking {}, retrying once", subject);
                let token = self.credentials.renew_rejected(&token).await?;
                Ok(self.oracle.active_sessions(subject, &token).await?)
            }
            other => Ok(other?),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::manager::tests::{options, FakeExchange, FakeStore};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    pub(crate) enum Reply {
        Live,
        Offline,
        Unauthorized,
        ServerError,
    }

    /// Scripted oracle: pops replies per subject, repeating the last one.
    #[derive(Default)]
    pub(crate) struct FakeOracle {
        pub script: Mutex<HashMap<String, Vec<Reply>>>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeOracle {
        pub fn with(script: Vec<(&str, Vec<Reply>)>) -> Self {
            let oracle = FakeOracle::default();
            {
                let mut s = oracle.script.lock().unwrap();
                for (subject, replies) in script {
                    s.insert(subject.to_string(), replies);
                }
            }
            oracle
        }

        pub fn calls_for(&self, subject: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _)| s == subject)
                .count()
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LivenessOracle for FakeOracle {
        async fn active_sessions(
            &self,
            subject: &str,
            bearer: &str,
        ) -> Result<Vec<StreamSession>, OracleError> {
            self.calls
                .lock()
                .unwrap()
                .push((subject.to_string(), bearer.to_string()));
            let reply = {
                let mut script = self.script.lock().unwrap();
                match script.get_mut(subject) {
                    Some(replies) if replies.len() > 1 => replies.remove(0),
                    Some(replies) => replies.first().copied().unwrap_or(Reply::Offline),
                    None => Reply::Offline,
                }
            };
            match reply {
                Reply::Live => Ok(vec![StreamSession {
                    id: "1".into(),
                    user_login: subject.to_string(),
                    game_name: None,
                    title: None,
                }]),
                Reply::Offline => Ok(vec![]),
                Reply::Unauthorized => Err(OracleError::Unauthorized),
                Reply::ServerError => Err(OracleError::Status(StatusCode::SERVICE_UNAVAILABLE)),
            }
        }
    }

    pub(crate) async fn credentials(exchange: Arc<FakeExchange>) -> Arc<CredentialManager> {
        let store = Arc::new(FakeStore::with(
            "initial",
            Some("r"),
            Utc::now() + Duration::hours(1),
        ));
        let mgr = CredentialManager::new(store, exchange, options(true));
        mgr.hydrate().await.unwrap();
        Arc::new(mgr)
    }

    #[tokio::test]
    async fn test_live_and_offline() {
        let oracle = Arc::new(FakeOracle::with(vec![
            ("a", vec![Reply::Live]),
            ("b", vec![Reply::Offline]),
        ]));
        let exchange = Arc::new(FakeExchange::default());
        let poller = LivePoller::new(credentials(exchange.clone()).await, oracle.clone());

        assert!(poller.is_active("a").await);
        assert!(!poller.is_active("b").await);
        assert_eq!(exchange.count(), 0);
    }

    #[tokio::test]
    async fn test_oracle_error_is_inactive() {
        let oracle = Arc::new(FakeOracle::with(vec![("a", vec![Reply::ServerError])]));
        let poller = LivePoller::new(
            credentials(Arc::new(FakeExchange::default())).await,
            oracle.clone(),
        );
        assert!(!poller.is_active("a").await);
        assert_eq!(oracle.calls_for("a"), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_retries_once_with_renewed_token() {
        let oracle = Arc::new(FakeOracle::with(vec![(
            "a",
            vec![Reply::Unauthorized, Reply::Live],
        )]));
        let exchange = Arc::new(FakeExchange::default());
        let poller = LivePoller::new(credentials(exchange.clone()).await, oracle.clone());

        assert!(poller.is_active("a").await);
        assert_eq!(exchange.count(), 1);
        let calls = oracle.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("a".to_string(), "initial".to_string()),
                ("a".to_string(), "token-1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_inactive() {
        let oracle = Arc::new(FakeOracle::with(vec![("a", vec![Reply::Unauthorized])]));
        let exchange = Arc::new(FakeExchange::default());
        let poller = LivePoller::new(credentials(exchange.clone()).await, oracle.clone());

        assert!(!poller.is_active("a").await);
        assert_eq!(oracle.calls_for("a"), 2);
        assert_eq!(exchange.count(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_credential_is_inactive() {
        let mgr = CredentialManager::new(
            Arc::new(FakeStore::default()),
            Arc::new(FakeExchange::default()),
            options(false),
        );
        let oracle = Arc::new(FakeOracle::with(vec![("a", vec![Reply::Live])]));
        let poller = LivePoller::new(Arc::new(mgr), oracle.clone());

        assert!(!poller.is_active("a").await);
        assert_eq!(oracle.total_calls(), 0);
    }
}
