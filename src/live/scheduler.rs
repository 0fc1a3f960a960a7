//! Subscription flags and the polling loop that drives [`LivePoller`].
//!
//! A subject stays in the map forever once enrolled; its flag says whether it
//! is still being polled. The loop keeps running while at least one flag is
//! `true` and exits otherwise. `running` shares the lock with the flags so an
//! enrollment can never slip in between the loop's last check and its exit.
//! Each enrollment bumps the subject's generation; a pass only deactivates a
//! subject whose generation is unchanged since the pass took its snapshot.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::poller::LivePoller;

/// Downstream side effect fired for every subject found live.
#[async_trait]
pub trait RankNotifier: Send + Sync {
    async fn notify(&self, subject: &str) -> Result<()>;
}

/// Outcome of one pass over the enrolled subjects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub live: Vec<String>,
    pub deactivated: Vec<String>,
    /// Whether any subject is still flagged after the pass
    pub rearm: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Subscription {
    active: bool,
    generation: u64,
}

#[derive(Default)]
struct SubscriptionState {
    flags: HashMap<String, Subscription>,
    running: bool,
}

impl SubscriptionState {
    fn any_active(&self) -> bool {
        self.flags.values().any(|sub| sub.active)
    }

    fn activate(&mut self, subject: &str) {
        let sub = self.flags.entry(subject.to_string()).or_default();
        sub.active = true;
        sub.generation += 1;
    }

    /// Clear the flag unless `subject` was enrolled again after `generation`.
    fn deactivate(&mut self, subject: &str, generation: u64) -> bool {
        match self.flags.get_mut(subject) {
            Some(sub) if sub.generation == generation => {
                sub.active = false;
                true
            }
            _ => false,
        }
    }
}

struct Inner {
    poller: Arc<LivePoller>,
    notifier: Arc<dyn RankNotifier>,
    interval: Duration,
    state: Mutex<SubscriptionState>,
}

#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<Inner>,
}

impl PollScheduler {
    pub fn new(
        poller: Arc<LivePoller>,
        notifier: Arc<dyn RankNotifier>,
        interval: Duration,
    ) -> Self {
        PollScheduler {
            inner: Arc::new(Inner {
                poller,
                notifier,
                interval,
                state: Mutex::new(SubscriptionState::default()),
            }),
        }
    }

    /// Flag `subject` for polling and start the loop if it had stopped.
    /// Returns the loop's handle when a new loop was spawned.
    pub async fn enroll(&self, subject: &str) -> Option<JoinHandle<()>> {
        let mut state = self.inner.state.lock().await;
        state.activate(subject);
        info!("Enrolled {} for live polling", subject);
        self.spawn_if_idle(&mut state)
    }

    pub async fn subscriptions(&self) -> BTreeMap<String, bool> {
        let state = self.inner.state.lock().await;
        state
            .flags
            .iter()
            .map(|(subject, sub)| (subject.clone(), sub.active))
            .collect()
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running
    }

    fn spawn_if_idle(&self, state: &mut SubscriptionState) -> Option<JoinHandle<()>> {
        if state.running || !state.any_active() {
            return None;
        }
        state.running = true;
        let scheduler = self.clone();
        Some(tokio::spawn(async move { scheduler.run().await }))
    }

    async fn run(self) {
        info!("Live polling started (interval={:?})", self.inner.interval);
        loop {
            let report = self.run_cycle().await;
            info!(
                "Poll cycle done: {} live, {} deactivated",
                report.live.len(),
                report.deactivated.len()
            );

            {
                let mut state = self.inner.state.lock().await;
                if !state.any_active() {
                    state.running = false;
                    info!("No subjects left to poll, stopping");
                    return;
                }
            }

            tokio::time::sleep(self.inner.interval).await;
        }
    }

    /// Check every flagged subject once, one at a time.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut subjects: Vec<(String, u64)> = {
            let state = self.inner.state.lock().await;
            state
                .flags
                .iter()
                .filter(|(_, sub)| sub.active)
                .map(|(subject, sub)| (subject.clone(), sub.generation))
                .collect()
        };
        subjects.sort();

        let mut report = CycleReport::default();
        for (subject, generation) in subjects {
            if self.inner.poller.is_active(&subject).await {
                if let Err(e) = self.inner.notifier.notify(&subject).await {
                    warn!("Rank notification for {} failed: {}", subject, e);
                }
                report.live.push(subject);
            } else if self
                .inner
                .state
                .lock()
                .await
                .deactivate(&subject, generation)
            {
                report.deactivated.push(subject);
            } else {
                info!("{} was re-enrolled during the check, keeping it", subject);
            }
        }

        report.rearm = self.inner.state.lock().await.any_active();
        report
    }

    #[cfg(test)]
    async fn flag(&self, subject: &str) {
        self.inner.state.lock().await.activate(subject);
    }
}
