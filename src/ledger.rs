//! Vote ledger.
//!
//! Each voter holds at most [`MAX_ACTIVE_VOTES`] live votes. Mutations update
//! local state first, write to the store, and then reconcile from the store so
//! that a second tab or device for the same voter cannot leave stale state
//! behind. Every mutation carries a per-track sequence number; a completion
//! that is no longer the latest for its track is discarded.

use crate::store::{StoreError, VoteStore};
use crate::types::*;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Errors surfaced to the voter after a failed mutation
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid voter id")]
    InvalidVoter,

    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidVoter => "INVALID_VOTER",
            LedgerError::Store(e) => e.code(),
        }
    }
}

/// What a toggle ended up doing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    Cast,
    Retracted,
    /// Voter already holds the maximum number of votes; nothing was written
    CapReached,
    /// Track was already played; nothing was written
    AlreadyPlayed,
    /// A newer mutation for the same track overtook this one
    Superseded,
}

/// Group vote records by track and count distinct voters.
///
/// Display metadata comes from the most recent record of each track. The
/// result is ordered by votes descending; ties keep the order in which tracks
/// first appear in `records`.
pub fn aggregate(records: &[VoteRecord]) -> Vec<TrackAggregate> {
    let mut order: Vec<&str> = Vec::new();
    let mut voters: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut latest: HashMap<&str, &VoteRecord> = HashMap::new();

    for record in records {
        let track_id = record.track_id.as_str();
        if !voters.contains_key(track_id) {
            order.push(track_id);
        }
        voters
            .entry(track_id)
            .or_default()
            .insert(record.voter_id.as_str());

        let newer = latest
            .get(track_id)
            .map_or(true, |seen| record.created_at >= seen.created_at);
        if newer {
            latest.insert(track_id, record);
        }
    }

    let mut ranking: Vec<TrackAggregate> = order
        .into_iter()
        .filter_map(|track_id| {
            let record = latest.get(track_id)?;
            Some(TrackAggregate {
                track_id: record.track_id.clone(),
                title: record.title.clone(),
                artist: record.artist.clone(),
                artwork_url: record.artwork_url.clone(),
                votes: voters.get(track_id).map(|v| v.len() as u32).unwrap_or(0),
            })
        })
        .collect();

    // Stable: equal counts keep first-appearance order
    ranking.sort_by(|a, b| b.votes.cmp(&a.votes));
    ranking
}

/// Shared per-track vote counts, visible to every voter
#[derive(Debug, Default)]
pub struct Tally {
    ranking: RwLock<Vec<TrackAggregate>>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ranking(&self) -> Vec<TrackAggregate> {
        self.ranking.read().await.clone()
    }

    pub async fn counts(&self) -> HashMap<TrackId, u32> {
        self.ranking
            .read()
            .await
            .iter()
            .map(|t| (t.track_id.clone(), t.votes))
            .collect()
    }

    pub async fn count(&self, track_id: &str) -> u32 {
        self.ranking
            .read()
            .await
            .iter()
            .find(|t| t.track_id == track_id)
            .map(|t| t.votes)
            .unwrap_or(0)
    }

    /// Recompute the whole ranking from the store
    pub async fn refresh(&self, store: &dyn VoteStore) -> Result<Vec<TrackAggregate>, StoreError> {
        let records = store.all_votes().await?;
        let ranking = aggregate(&records);
        *self.ranking.write().await = ranking.clone();
        Ok(ranking)
    }

    /// Optimistic +1/-1 ahead of a store round trip
    async fn adjust(&self, track: &TrackSummary, delta: i32) {
        let mut ranking = self.ranking.write().await;
        match ranking.iter().position(|t| t.track_id == track.track_id) {
            Some(index) => {
                let entry = &mut ranking[index];
                entry.votes = entry.votes.saturating_add_signed(delta);
                if entry.votes == 0 {
                    ranking.remove(index);
                }
            }
            None if delta > 0 => ranking.push(TrackAggregate {
                track_id: track.track_id.clone(),
                title: track.title.clone(),
                artist: track.artist.clone(),
                artwork_url: track.artwork_url.clone(),
                votes: delta as u32,
            }),
            None => {}
        }
        ranking.sort_by(|a, b| b.votes.cmp(&a.votes));
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    active: BTreeSet<TrackId>,
    details: HashMap<TrackId, TrackSummary>,
    latest_seq: HashMap<TrackId, u64>,
    next_seq: u64,
}

impl LedgerState {
    fn issue_seq(&mut self, track_id: &str) -> u64 {
        self.next_seq += 1;
        self.latest_seq.insert(track_id.to_string(), self.next_seq);
        self.next_seq
    }

    fn is_latest(&self, track_id: &str, seq: u64) -> bool {
        self.latest_seq.get(track_id) == Some(&seq)
    }
}

/// A voter's current votes as shown to them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoterVotes {
    pub voter_id: VoterId,
    pub tracks: Vec<TrackSummary>,
    pub remaining: usize,
}

/// Votes of a single voter, kept in sync with the store
pub struct VoteLedger {
    voter_id: VoterId,
    store: Arc<dyn VoteStore>,
    tally: Arc<Tally>,
    state: RwLock<LedgerState>,
}

impl VoteLedger {
    pub fn new(
        voter_id: &str,
        store: Arc<dyn VoteStore>,
        tally: Arc<Tally>,
    ) -> Result<Self, LedgerError> {
        if !is_valid_voter_id(voter_id) {
            return Err(LedgerError::InvalidVoter);
        }

        Ok(Self {
            voter_id: voter_id.to_string(),
            store,
            tally,
            state: RwLock::new(LedgerState::default()),
        })
    }

    pub fn voter_id(&self) -> &str {
        &self.voter_id
    }

    pub fn tally(&self) -> &Arc<Tally> {
        &self.tally
    }

    pub async fn active_vote_ids(&self) -> Vec<TrackId> {
        self.state.read().await.active.iter().cloned().collect()
    }

    pub async fn snapshot(&self) -> VoterVotes {
        let state = self.state.read().await;
        let tracks: Vec<TrackSummary> = state
            .active
            .iter()
            .filter_map(|id| state.details.get(id).cloned())
            .collect();

        VoterVotes {
            voter_id: self.voter_id.clone(),
            remaining: MAX_ACTIVE_VOTES.saturating_sub(state.active.len()),
            tracks,
        }
    }

    /// Toggle a vote: retract if held, otherwise cast if under the cap
    pub async fn cast_or_retract(&self, track: TrackSummary) -> Result<VoteOutcome, LedgerError> {
        {
            let state = self.state.read().await;
            if state.active.contains(&track.track_id) {
                drop(state);
                return self.retract(&track).await;
            }
            if state.active.len() >= MAX_ACTIVE_VOTES {
                tracing::debug!(voter = %self.voter_id, "Vote cap reached");
                return Ok(VoteOutcome::CapReached);
            }
        }

        let played = self.store.played_tracks().await?;
        if played.iter().any(|p| p.track_id == track.track_id) {
            tracing::info!(track = %track.track_id, "Vote on already played track ignored");
            if let Err(e) = self.refresh_aggregate().await {
                tracing::warn!("Failed to refresh ranking: {}", e);
            }
            return Ok(VoteOutcome::AlreadyPlayed);
        }

        self.cast(track).await
    }

    async fn cast(&self, track: TrackSummary) -> Result<VoteOutcome, LedgerError> {
        let track_id = track.track_id.clone();

        let seq = {
            let mut state = self.state.write().await;
            // Re-check: a concurrent call may have changed the set since the peek
            if state.active.contains(&track_id) {
                return Ok(VoteOutcome::Superseded);
            }
            if state.active.len() >= MAX_ACTIVE_VOTES {
                return Ok(VoteOutcome::CapReached);
            }
            state.active.insert(track_id.clone());
            state.details.insert(track_id.clone(), track.clone());
            self.tally.adjust(&track, 1).await;
            state.issue_seq(&track_id)
        };

        let record = VoteRecord::new(&track, &self.voter_id, Utc::now());
        let result = match self.store.delete_vote(&track_id, &self.voter_id).await {
            Ok(()) => self.store.insert_vote(record).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                if !self.state.read().await.is_latest(&track_id, seq) {
                    tracing::debug!(track = %track_id, seq, "Discarding superseded cast");
                    return Ok(VoteOutcome::Superseded);
                }
                tracing::info!(voter = %self.voter_id, track = %track_id, "Vote cast");
                self.reconcile(true).await;
                Ok(VoteOutcome::Cast)
            }
            Err(e) => {
                let mut state = self.state.write().await;
                if state.is_latest(&track_id, seq) {
                    state.active.remove(&track_id);
                    state.details.remove(&track_id);
                    self.tally.adjust(&track, -1).await;
                }
                tracing::warn!(voter = %self.voter_id, track = %track_id, "Vote cast failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn retract(&self, track: &TrackSummary) -> Result<VoteOutcome, LedgerError> {
        let track_id = track.track_id.clone();

        let (seq, summary) = {
            let mut state = self.state.write().await;
            if !state.active.remove(&track_id) {
                return Ok(VoteOutcome::Superseded);
            }
            let summary = state
                .details
                .remove(&track_id)
                .unwrap_or_else(|| track.clone());
            self.tally.adjust(&summary, -1).await;
            (state.issue_seq(&track_id), summary)
        };

        match self.store.delete_vote(&track_id, &self.voter_id).await {
            Ok(()) => {
                if !self.state.read().await.is_latest(&track_id, seq) {
                    tracing::debug!(track = %track_id, seq, "Discarding superseded retraction");
                    return Ok(VoteOutcome::Superseded);
                }
                tracing::info!(voter = %self.voter_id, track = %track_id, "Vote retracted");
                self.reconcile(false).await;
                Ok(VoteOutcome::Retracted)
            }
            Err(e) => {
                let mut state = self.state.write().await;
                if state.is_latest(&track_id, seq) {
                    state.active.insert(track_id.clone());
                    state.details.insert(track_id.clone(), summary.clone());
                    self.tally.adjust(&summary, 1).await;
                }
                tracing::warn!(voter = %self.voter_id, track = %track_id, "Vote retraction failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Follow-up read after a successful write. The write itself already
    /// succeeded, so a failed read is only logged; the next poll corrects it.
    async fn reconcile(&self, with_aggregate: bool) {
        if let Err(e) = self.refresh_voter_records().await {
            tracing::warn!(voter = %self.voter_id, "Failed to reconcile voter records: {}", e);
        }
        if with_aggregate {
            if let Err(e) = self.refresh_aggregate().await {
                tracing::warn!("Failed to refresh ranking: {}", e);
            }
        }
    }

    /// Rebuild this voter's active votes from the store
    pub async fn refresh_voter_records(&self) -> Result<(), LedgerError> {
        let records = self.store.votes_for_voter(&self.voter_id).await?;

        let mut state = self.state.write().await;
        state.active.clear();
        state.details.clear();
        for record in records {
            state.active.insert(record.track_id.clone());
            state.details.insert(record.track_id.clone(), record.summary());
        }

        if state.active.len() > MAX_ACTIVE_VOTES {
            tracing::warn!(
                voter = %self.voter_id,
                count = state.active.len(),
                "Store holds more votes than allowed for voter"
            );
        }
        Ok(())
    }

    /// Recompute the shared ranking from all records
    pub async fn refresh_aggregate(&self) -> Result<Vec<TrackAggregate>, LedgerError> {
        Ok(self.tally.refresh(self.store.as_ref()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreResult};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn track(id: &str) -> TrackSummary {
        TrackSummary {
            track_id: id.to_string(),
            title: format!("Song {}", id),
            artist: "Band".to_string(),
            artwork_url: None,
        }
    }

    fn record(track_id: &str, voter: &str, minute: i64, title: &str) -> VoteRecord {
        VoteRecord {
            track_id: track_id.to_string(),
            title: title.to_string(),
            artist: "Band".to_string(),
            artwork_url: None,
            voter_id: voter.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 8, 13, 20, 0, 0).unwrap()
                + Duration::minutes(minute),
        }
    }

    fn ledger(voter: &str) -> (Arc<MemoryStore>, VoteLedger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = VoteLedger::new(voter, store.clone(), Arc::new(Tally::new())).unwrap();
        (store, ledger)
    }

    #[test]
    fn test_aggregate_counts_distinct_voters() {
        let records = vec![
            record("a", "v1", 0, "A"),
            record("b", "v1", 1, "B"),
            record("a", "v2", 2, "A"),
            // Duplicate row for the same pair counts once
            record("a", "v2", 3, "A"),
        ];

        let ranking = aggregate(&records);
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].track_id, "a");
        assert_eq!(ranking[0].votes, 2);
        assert_eq!(ranking[1].votes, 1);
    }

    #[test]
    fn test_aggregate_ties_keep_first_appearance() {
        let records = vec![
            record("x", "v1", 0, "X"),
            record("y", "v1", 1, "Y"),
            record("z", "v2", 2, "Z"),
            record("z", "v3", 3, "Z"),
        ];

        let ids: Vec<_> = aggregate(&records)
            .into_iter()
            .map(|t| t.track_id)
            .collect();
        assert_eq!(ids, vec!["z", "x", "y"]);
    }

    #[test]
    fn test_aggregate_uses_latest_metadata() {
        let records = vec![
            record("a", "v2", 5, "New Title"),
            record("a", "v1", 0, "Old Title"),
        ];
        assert_eq!(aggregate(&records)[0].title, "New Title");
    }

    #[test]
    fn test_rejects_invalid_voter() {
        let store = Arc::new(MemoryStore::new());
        let result = VoteLedger::new("not valid!", store, Arc::new(Tally::new()));
        assert!(matches!(result, Err(LedgerError::InvalidVoter)));
    }

    #[tokio::test]
    async fn test_cast_and_retract_toggle() {
        let (store, ledger) = ledger("voter-1");

        let outcome = ledger.cast_or_retract(track("t1")).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Cast);
        assert_eq!(ledger.active_vote_ids().await, vec!["t1"]);
        assert_eq!(ledger.tally().count("t1").await, 1);
        assert_eq!(store.votes_for_voter("voter-1").await.unwrap().len(), 1);

        let outcome = ledger.cast_or_retract(track("t1")).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Retracted);
        assert!(ledger.active_vote_ids().await.is_empty());
        assert_eq!(ledger.tally().count("t1").await, 0);
        assert!(store.votes_for_voter("voter-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fourth_vote_is_rejected_without_write() {
        let (store, ledger) = ledger("voter-1");

        for id in ["t1", "t2"] {
            ledger.cast_or_retract(track(id)).await.unwrap();
        }
        assert_eq!(
            ledger.cast_or_retract(track("t3")).await.unwrap(),
            VoteOutcome::Cast
        );
        assert_eq!(ledger.active_vote_ids().await.len(), 3);

        let writes_before = store.write_count();
        let outcome = ledger.cast_or_retract(track("t4")).await.unwrap();
        assert_eq!(outcome, VoteOutcome::CapReached);
        assert_eq!(store.write_count(), writes_before);
        assert_eq!(ledger.active_vote_ids().await.len(), 3);

        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.remaining, 0);
        assert_eq!(snapshot.tracks.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_cast_reverts_optimistic_state() {
        let (store, ledger) = ledger("voter-1");
        store.set_read_only(true);

        let err = ledger.cast_or_retract(track("t1")).await.unwrap_err();
        assert_eq!(err.code(), "PERMISSION");
        assert!(ledger.active_vote_ids().await.is_empty());
        assert_eq!(ledger.tally().count("t1").await, 0);
    }

    #[tokio::test]
    async fn test_failed_retraction_restores_vote() {
        let (store, ledger) = ledger("voter-1");
        ledger.cast_or_retract(track("t1")).await.unwrap();

        store.set_read_only(true);
        let err = ledger.cast_or_retract(track("t1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Store(StoreError::Permission(_))));
        assert_eq!(ledger.active_vote_ids().await, vec!["t1"]);
        assert_eq!(ledger.tally().count("t1").await, 1);
    }

    #[tokio::test]
    async fn test_played_track_is_rejected() {
        let (store, ledger) = ledger("voter-1");
        store.mark_played("t1").await.unwrap();
        let writes_before = store.write_count();

        let outcome = ledger.cast_or_retract(track("t1")).await.unwrap();
        assert_eq!(outcome, VoteOutcome::AlreadyPlayed);
        assert_eq!(store.write_count(), writes_before);
        assert!(ledger.active_vote_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_picks_up_other_tab() {
        let store = Arc::new(MemoryStore::new());
        let tally = Arc::new(Tally::new());
        let tab_a = VoteLedger::new("voter-1", store.clone(), tally.clone()).unwrap();
        let tab_b = VoteLedger::new("voter-1", store.clone(), tally.clone()).unwrap();

        tab_a.cast_or_retract(track("t1")).await.unwrap();
        tab_b.cast_or_retract(track("t2")).await.unwrap();

        tab_a.refresh_voter_records().await.unwrap();
        assert_eq!(tab_a.active_vote_ids().await, vec!["t1", "t2"]);

        let persisted: BTreeSet<_> = store
            .votes_for_voter("voter-1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.track_id)
            .collect();
        let active: BTreeSet<_> = tab_a.active_vote_ids().await.into_iter().collect();
        assert_eq!(persisted, active);
    }

    #[tokio::test]
    async fn test_aggregate_matches_distinct_voters_across_ledgers() {
        let store = Arc::new(MemoryStore::new());
        let tally = Arc::new(Tally::new());

        for voter in ["v1", "v2", "v3"] {
            let ledger = VoteLedger::new(voter, store.clone(), tally.clone()).unwrap();
            ledger.cast_or_retract(track("hit")).await.unwrap();
        }

        let ledger = VoteLedger::new("v4", store.clone(), tally.clone()).unwrap();
        let ranking = ledger.refresh_aggregate().await.unwrap();
        assert_eq!(ranking[0].track_id, "hit");
        assert_eq!(ranking[0].votes, 3);
    }

    /// Memory store that can pause right after a write, before reporting back
    #[derive(Default)]
    struct HeldStore {
        inner: MemoryStore,
        hold_insert: AtomicBool,
        hold_delete: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    impl HeldStore {
        async fn pause_if(&self, flag: &AtomicBool) {
            if flag.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
        }
    }

    #[async_trait]
    impl VoteStore for HeldStore {
        async fn votes_for_voter(&self, voter_id: &str) -> StoreResult<Vec<VoteRecord>> {
            self.inner.votes_for_voter(voter_id).await
        }

        async fn all_votes(&self) -> StoreResult<Vec<VoteRecord>> {
            self.inner.all_votes().await
        }

        async fn insert_vote(&self, record: VoteRecord) -> StoreResult<()> {
            let result = self.inner.insert_vote(record).await;
            self.pause_if(&self.hold_insert).await;
            result
        }

        async fn delete_vote(&self, track_id: &str, voter_id: &str) -> StoreResult<()> {
            let result = self.inner.delete_vote(track_id, voter_id).await;
            self.pause_if(&self.hold_delete).await;
            result
        }

        async fn delete_all_votes(&self) -> StoreResult<()> {
            self.inner.delete_all_votes().await
        }

        async fn override_enabled(&self) -> StoreResult<bool> {
            self.inner.override_enabled().await
        }

        async fn set_override(&self, enabled: bool) -> StoreResult<()> {
            self.inner.set_override(enabled).await
        }

        async fn played_tracks(&self) -> StoreResult<Vec<PlayedTrack>> {
            self.inner.played_tracks().await
        }

        async fn mark_played(&self, track_id: &str) -> StoreResult<()> {
            self.inner.mark_played(track_id).await
        }
    }

    fn held_ledger() -> (Arc<HeldStore>, Arc<VoteLedger>) {
        let store = Arc::new(HeldStore::default());
        let ledger = VoteLedger::new("voter-1", store.clone(), Arc::new(Tally::new())).unwrap();
        (store, Arc::new(ledger))
    }

    async fn stored_ids(store: &HeldStore) -> Vec<TrackId> {
        store
            .votes_for_voter("voter-1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.track_id)
            .collect()
    }

    #[tokio::test]
    async fn test_cast_overtaken_by_retraction_is_discarded() {
        let (store, ledger) = held_ledger();
        store.hold_insert.store(true, Ordering::SeqCst);

        let cast = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.cast_or_retract(track("t1")).await }
        });
        store.entered.notified().await;

        // The optimistic cast is visible, so the second tap retracts it
        let outcome = ledger.cast_or_retract(track("t1")).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Retracted);

        store.release.notify_one();
        assert_eq!(cast.await.unwrap().unwrap(), VoteOutcome::Superseded);

        assert!(ledger.active_vote_ids().await.is_empty());
        assert!(stored_ids(&store).await.is_empty());
        assert_eq!(ledger.tally().count("t1").await, 0);
    }

    #[tokio::test]
    async fn test_retraction_overtaken_by_cast_is_discarded() {
        let (store, ledger) = held_ledger();
        ledger.cast_or_retract(track("t1")).await.unwrap();
        store.hold_delete.store(true, Ordering::SeqCst);

        let retract = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.cast_or_retract(track("t1")).await }
        });
        store.entered.notified().await;

        let outcome = ledger.cast_or_retract(track("t1")).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Cast);

        store.release.notify_one();
        assert_eq!(retract.await.unwrap().unwrap(), VoteOutcome::Superseded);

        assert_eq!(ledger.active_vote_ids().await, vec!["t1"]);
        assert_eq!(stored_ids(&store).await, vec!["t1"]);
        assert_eq!(ledger.tally().count("t1").await, 1);
    }

    #[tokio::test]
    async fn test_failed_superseded_retraction_does_not_revert() {
        let (store, ledger) = held_ledger();
        ledger.cast_or_retract(track("t1")).await.unwrap();
        store.inner.set_read_only(true);
        store.hold_delete.store(true, Ordering::SeqCst);

        let retract = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.cast_or_retract(track("t1")).await }
        });
        store.entered.notified().await;
        store.inner.set_read_only(false);

        let outcome = ledger.cast_or_retract(track("t1")).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Cast);

        store.release.notify_one();
        let err = retract.await.unwrap().unwrap_err();
        assert!(matches!(err, LedgerError::Store(StoreError::Permission(_))));

        // A revert here would count the vote twice
        assert_eq!(ledger.active_vote_ids().await, vec!["t1"]);
        assert_eq!(stored_ids(&store).await, vec!["t1"]);
        assert_eq!(ledger.tally().count("t1").await, 1);
    }

    #[test]
    fn test_sequence_numbers_supersede_older_mutations() {
        let mut state = LedgerState::default();
        let first = state.issue_seq("t1");
        let second = state.issue_seq("t1");
        let other = state.issue_seq("t2");

        assert!(!state.is_latest("t1", first));
        assert!(state.is_latest("t1", second));
        assert!(state.is_latest("t2", other));
    }

    #[tokio::test]
    async fn test_tally_adjust_keeps_ranking_sorted() {
        let tally = Tally::new();
        tally.adjust(&track("a"), 1).await;
        tally.adjust(&track("b"), 1).await;
        tally.adjust(&track("b"), 1).await;

        let ranking = tally.ranking().await;
        assert_eq!(ranking[0].track_id, "b");
        assert_eq!(ranking[0].votes, 2);

        tally.adjust(&track("a"), -1).await;
        tally.adjust(&track("missing"), -1).await;
        assert_eq!(tally.ranking().await.len(), 1);
    }
}
