use super::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Clock behaviour of the in-memory store
#[derive(Debug, Clone, PartialEq)]
pub enum Clock {
    /// Use the host clock (development only)
    System,
    /// Always report this instant
    Fixed(DateTime<Utc>),
    /// Behave like an unreachable time RPC
    Unreachable,
}

/// In-process store used for development and tests.
///
/// Supports fault injection so the fail-closed and rollback paths can be
/// exercised without a network.
pub struct MemoryStore {
    votes: RwLock<Vec<VoteRecord>>,
    override_enabled: RwLock<bool>,
    played: RwLock<Vec<PlayedTrack>>,
    clock: RwLock<Clock>,
    offline: AtomicBool,
    read_only: AtomicBool,
    writes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            votes: RwLock::new(Vec::new()),
            override_enabled: RwLock::new(false),
            played: RwLock::new(Vec::new()),
            clock: RwLock::new(Clock::System),
            offline: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            clock: RwLock::new(clock),
            ..Self::new()
        }
    }

    pub async fn set_clock(&self, clock: Clock) {
        *self.clock.write().await = clock;
    }

    /// Make every call fail with [`StoreError::Network`]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every write fail with [`StoreError::Permission`]
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of successful write calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Network("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> StoreResult<()> {
        self.check_reachable()?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::Permission(
                "memory store is read-only".to_string(),
            ));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn votes_for_voter(&self, voter_id: &str) -> StoreResult<Vec<VoteRecord>> {
        self.check_reachable()?;
        Ok(self
            .votes
            .read()
            .await
            .iter()
            .filter(|v| v.voter_id == voter_id)
            .cloned()
            .collect())
    }

    async fn all_votes(&self) -> StoreResult<Vec<VoteRecord>> {
        self.check_reachable()?;
        Ok(self.votes.read().await.clone())
    }

    async fn insert_vote(&self, record: VoteRecord) -> StoreResult<()> {
        self.check_writable()?;
        self.votes.write().await.push(record);
        Ok(())
    }

    async fn delete_vote(&self, track_id: &str, voter_id: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.votes
            .write()
            .await
            .retain(|v| !(v.track_id == track_id && v.voter_id == voter_id));
        Ok(())
    }

    async fn delete_all_votes(&self) -> StoreResult<()> {
        self.check_writable()?;
        self.votes.write().await.clear();
        Ok(())
    }

    async fn override_enabled(&self) -> StoreResult<bool> {
        self.check_reachable()?;
        Ok(*self.override_enabled.read().await)
    }

    async fn set_override(&self, enabled: bool) -> StoreResult<()> {
        self.check_writable()?;
        *self.override_enabled.write().await = enabled;
        Ok(())
    }

    async fn played_tracks(&self) -> StoreResult<Vec<PlayedTrack>> {
        self.check_reachable()?;
        Ok(self.played.read().await.clone())
    }

    async fn mark_played(&self, track_id: &str) -> StoreResult<()> {
        self.check_writable()?;
        let mut played = self.played.write().await;
        if !played.iter().any(|p| p.track_id == track_id) {
            played.push(PlayedTrack {
                track_id: track_id.to_string(),
                played_at: Utc::now(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TimeSource for MemoryStore {
    async fn server_now(&self) -> StoreResult<DateTime<Utc>> {
        self.check_reachable()?;
        match &*self.clock.read().await {
            Clock::System => Ok(Utc::now()),
            Clock::Fixed(now) => Ok(*now),
            Clock::Unreachable => Err(StoreError::Network(
                "time source unreachable".to_string(),
            )),
        }
    }
}
