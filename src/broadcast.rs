use crate::abuse::RateLimiter;
use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a background poller. Dropping it cancels the task, so a poller
/// can never outlive whatever owns it.
pub struct PollerHandle {
    name: &'static str,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn name(&self) -> &str {
        self.name
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        tracing::debug!(poller = self.name, "Stopping poller");
        self.task.abort();
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Re-evaluate the voting window on a fixed interval. Clients are notified
/// whenever the decision changes.
pub fn spawn_window_watcher(state: Arc<AppState>, period: Duration) -> PollerHandle {
    let task = tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            let status = state.refresh_voting_status().await;
            tracing::debug!(allowed = status.allowed, reason = ?status.reason, "Voting window checked");
        }
    });

    PollerHandle {
        name: "window_watcher",
        task,
    }
}

/// Re-read the shared ranking from the store and push it to every client,
/// so the ranking stays live across devices
pub fn spawn_ranking_poller(state: Arc<AppState>, period: Duration) -> PollerHandle {
    let task = tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            if let Err(e) = state.refresh_ranking().await {
                tracing::warn!("Ranking refresh failed, retrying next tick: {}", e);
            }
        }
    });

    PollerHandle {
        name: "ranking_poller",
        task,
    }
}

/// Forget rate-limit counters whose window has passed
pub fn spawn_rate_limit_cleanup(limiter: RateLimiter) -> PollerHandle {
    let task = tokio::spawn(async move {
        let mut interval = ticker((limiter.window() * 2).max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });

    PollerHandle {
        name: "rate_limit_cleanup",
        task,
    }
}

/// Evict cached vote ledgers that are not in use. Voters who only toggle
/// over HTTP never disconnect a socket, so this is what bounds the cache.
pub fn spawn_ledger_sweeper(state: Arc<AppState>, period: Duration) -> PollerHandle {
    let task = tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            let evicted = state.evict_idle_ledgers().await;
            if evicted > 0 {
                tracing::debug!(evicted, "Evicted idle vote ledgers");
            }
        }
    });

    PollerHandle {
        name: "ledger_sweeper",
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventConfig;
    use crate::protocol::ServerMessage;
    use crate::store::{MemoryStore, VoteStore};

    #[tokio::test]
    async fn test_ranking_poller_broadcasts() {
        let state = Arc::new(AppState::in_memory(EventConfig::default()));
        let mut rx = state.broadcast.subscribe();

        let _poller = spawn_ranking_poller(state.clone(), Duration::from_millis(20));

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("poller should broadcast")
            .unwrap();
        assert!(matches!(msg, ServerMessage::Ranking { .. }));
    }

    #[tokio::test]
    async fn test_window_watcher_notifies_on_change() {
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(AppState::new(
            store.clone(),
            store.clone(),
            EventConfig::default(),
        ));
        let mut rx = state.broadcast.subscribe();

        // Flip the flag behind the gate's back; the watcher has to notice
        store.set_override(true).await.unwrap();
        let _poller = spawn_window_watcher(state.clone(), Duration::from_millis(20));

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("watcher should broadcast")
            .unwrap();
        match msg {
            ServerMessage::VotingStatus { status } => assert!(status.allowed),
            other => panic!("expected voting status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ledger_sweeper_empties_cache() {
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(AppState::new(
            store.clone(),
            store.clone(),
            EventConfig::default(),
        ));
        for i in 0..10 {
            state.ledger_for(&format!("voter-{}", i)).await.unwrap();
        }
        assert_eq!(state.ledgers.read().await.len(), 10);

        let _poller = spawn_ledger_sweeper(state.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(state.ledgers.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_poller() {
        let state = Arc::new(AppState::in_memory(EventConfig::default()));
        let poller = spawn_ranking_poller(state.clone(), Duration::from_millis(10));
        assert_eq!(poller.name(), "ranking_poller");
        drop(poller);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let mut rx = state.broadcast.subscribe();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
