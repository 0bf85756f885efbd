use super::AppState;
use crate::ledger::{LedgerError, VoteLedger, VoteOutcome, VoterVotes};
use crate::protocol::ServerMessage;
use crate::store::StoreError;
use crate::types::*;
use crate::window::GateStatus;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Fixed demo data: (track_id, title, artist, voter_id)
pub const SEED_VOTES: &[(&str, &str, &str, &str)] = &[
    ("4u7EnebtmKWzUH433cf5Qv", "Bohemian Rhapsody", "Queen", "seed-voter-1"),
    ("4u7EnebtmKWzUH433cf5Qv", "Bohemian Rhapsody", "Queen", "seed-voter-2"),
    ("0GjEhVFGZW8afUYGChu3Rr", "Dancing Queen", "ABBA", "seed-voter-1"),
    ("0GjEhVFGZW8afUYGChu3Rr", "Dancing Queen", "ABBA", "seed-voter-3"),
    ("0GjEhVFGZW8afUYGChu3Rr", "Dancing Queen", "ABBA", "seed-voter-4"),
    ("7o2CTH4ctstm8TNelqjb51", "Sweet Caroline", "Neil Diamond", "seed-voter-2"),
    ("2SAqBLGA283SUiwJ3xOUVI", "Livin' on a Prayer", "Bon Jovi", "seed-voter-3"),
];

const CSV_HEADER: &str = "track_id,title,artist,artwork_url,voter_id,created_at";

#[derive(Debug, thiserror::Error)]
pub enum VoteError {
    #[error("voting is closed")]
    VotingClosed,

    #[error("invalid track: {0}")]
    InvalidTrack(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl VoteError {
    pub fn code(&self) -> &'static str {
        match self {
            VoteError::VotingClosed => "VOTING_CLOSED",
            VoteError::InvalidTrack(_) => "INVALID_TRACK",
            VoteError::Ledger(e) => e.code(),
        }
    }
}

fn validate_track(track: &TrackSummary) -> Result<(), VoteError> {
    if track.track_id.trim().is_empty() {
        return Err(VoteError::InvalidTrack("missing track id".to_string()));
    }
    if track.title.trim().is_empty() {
        return Err(VoteError::InvalidTrack("missing title".to_string()));
    }
    Ok(())
}

/// Quote a CSV field when it contains a separator, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render vote records as CSV with a header row
pub fn votes_to_csv(records: &[VoteRecord]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for record in records {
        let row = [
            csv_field(&record.track_id),
            csv_field(&record.title),
            csv_field(&record.artist),
            csv_field(record.artwork_url.as_deref().unwrap_or("")),
            csv_field(&record.voter_id),
            record.created_at.to_rfc3339(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

impl AppState {
    /// Ledger for a voter, loading their records from the store on first use
    pub async fn ledger_for(&self, voter_id: &str) -> Result<Arc<VoteLedger>, LedgerError> {
        if let Some(ledger) = self.ledgers.read().await.get(voter_id) {
            return Ok(ledger.clone());
        }

        let ledger = Arc::new(VoteLedger::new(
            voter_id,
            self.store.clone(),
            self.tally.clone(),
        )?);

        let ledger = {
            let mut ledgers = self.ledgers.write().await;
            ledgers
                .entry(voter_id.to_string())
                .or_insert(ledger)
                .clone()
        };

        if let Err(e) = ledger.refresh_voter_records().await {
            tracing::warn!(voter = voter_id, "Failed to load voter records: {}", e);
        }
        Ok(ledger)
    }

    /// Re-read a voter's records from the store and return them.
    ///
    /// Reads never add to the ledger cache: a voter without a cached ledger
    /// gets a throwaway one.
    pub async fn voter_votes(&self, voter_id: &str) -> Result<VoterVotes, LedgerError> {
        let cached = self.ledgers.read().await.get(voter_id).cloned();
        let ledger = match cached {
            Some(ledger) => ledger,
            None => Arc::new(VoteLedger::new(
                voter_id,
                self.store.clone(),
                self.tally.clone(),
            )?),
        };
        ledger.refresh_voter_records().await?;
        Ok(ledger.snapshot().await)
    }

    /// Drop a voter's cached ledger unless a mutation is still using it
    pub async fn release_ledger(&self, voter_id: &str) -> bool {
        let mut ledgers = self.ledgers.write().await;
        match ledgers.get(voter_id) {
            Some(ledger) if Arc::strong_count(ledger) == 1 => {
                ledgers.remove(voter_id);
                true
            }
            _ => false,
        }
    }

    /// Drop every cached ledger with no mutation in flight. The store holds
    /// the truth, so an evicted voter is reloaded on their next toggle.
    pub async fn evict_idle_ledgers(&self) -> usize {
        let mut ledgers = self.ledgers.write().await;
        let before = ledgers.len();
        ledgers.retain(|_, ledger| Arc::strong_count(ledger) > 1);
        before - ledgers.len()
    }

    /// Toggle a vote, gated on the cached voting window decision
    pub async fn toggle_vote(
        &self,
        voter_id: &str,
        track: TrackSummary,
    ) -> Result<(VoteOutcome, VoterVotes), VoteError> {
        validate_track(&track)?;
        if !self.gate.is_voting_allowed().await {
            return Err(VoteError::VotingClosed);
        }

        let ledger = self.ledger_for(voter_id).await?;
        let outcome = ledger.cast_or_retract(track).await;

        if matches!(
            outcome,
            Ok(VoteOutcome::Cast) | Ok(VoteOutcome::Retracted) | Err(_)
        ) {
            // Failed writes were rolled back locally; others should see that too
            self.broadcast_ranking().await;
        }

        Ok((outcome?, ledger.snapshot().await))
    }

    /// Re-evaluate the voting window and notify clients when it changed
    pub async fn refresh_voting_status(&self) -> GateStatus {
        let before = self.gate.status().await;
        let after = self.gate.refresh().await;
        if before.allowed != after.allowed || before.reason != after.reason {
            let _ = self.broadcast.send(ServerMessage::VotingStatus {
                status: after.clone(),
            });
        }
        after
    }

    /// Admin: force voting open or closed. The broadcast only happens once
    /// the store confirmed the write.
    pub async fn set_voting_override(&self, enabled: bool) -> Result<GateStatus, StoreError> {
        let status = if enabled {
            self.gate.open_voting_now().await?
        } else {
            self.gate.close_voting_now().await?
        };

        let _ = self.broadcast.send(ServerMessage::VotingStatus {
            status: status.clone(),
        });
        Ok(status)
    }

    /// Send the cached ranking to every client
    pub async fn broadcast_ranking(&self) {
        let seq = self.ranking_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let tracks = self.tally.ranking().await;
        // Ignore send errors (no receivers connected is fine)
        let _ = self.broadcast.send(ServerMessage::Ranking { tracks, seq });
    }

    /// Recompute the ranking from the store and broadcast it
    pub async fn refresh_ranking(&self) -> Result<Vec<TrackAggregate>, StoreError> {
        let ranking = self.tally.refresh(self.store.as_ref()).await?;
        self.broadcast_ranking().await;
        Ok(ranking)
    }

    /// Admin: flag a track as played so it no longer accepts votes
    pub async fn mark_played(&self, track_id: &str) -> Result<(), StoreError> {
        self.store.mark_played(track_id).await?;
        tracing::info!(track = track_id, "Track marked as played");
        self.refresh_ranking().await?;
        Ok(())
    }

    pub async fn export_votes_csv(&self) -> Result<String, StoreError> {
        let records = self.store.all_votes().await?;
        tracing::info!(rows = records.len(), "Exporting votes as CSV");
        Ok(votes_to_csv(&records))
    }

    /// Admin: delete every vote record. Cached ledgers are dropped so voters
    /// reload from the now empty store.
    pub async fn clear_votes(&self) -> Result<(), StoreError> {
        self.store.delete_all_votes().await?;
        self.ledgers.write().await.clear();
        tracing::warn!("All votes cleared");

        let _ = self.refresh_ranking().await;
        Ok(())
    }

    /// Admin: insert the fixed demo vote set. Returns the number of records written.
    pub async fn seed_votes(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        for (track_id, title, artist, voter_id) in SEED_VOTES {
            let record = VoteRecord {
                track_id: track_id.to_string(),
                title: title.to_string(),
                artist: artist.to_string(),
                artwork_url: None,
                voter_id: voter_id.to_string(),
                created_at: now,
            };
            // Same delete-then-insert as regular votes, so seeding twice is harmless
            self.store.delete_vote(track_id, voter_id).await?;
            self.store.insert_vote(record).await?;
        }

        tracing::info!(rows = SEED_VOTES.len(), "Seeded demo votes");
        let _ = self.refresh_ranking().await;
        Ok(SEED_VOTES.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventConfig;
    use crate::store::{MemoryStore, VoteStore};

    fn track(id: &str) -> TrackSummary {
        TrackSummary {
            track_id: id.to_string(),
            title: format!("Song {}", id),
            artist: "Band".to_string(),
            artwork_url: None,
        }
    }

    async fn open_state() -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), store.clone(), EventConfig::default());
        state.set_voting_override(true).await.unwrap();
        (store, state)
    }

    #[test]
    fn test_csv_escaping() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("Hello, World"), "\"Hello, World\"");
        assert_eq!(csv_field("12\" Mix"), "\"12\"\" Mix\"");
    }

    #[tokio::test]
    async fn test_toggle_vote_requires_open_gate() {
        let state = AppState::in_memory(EventConfig::default());
        state.refresh_voting_status().await;

        let err = state.toggle_vote("voter-1", track("t1")).await.unwrap_err();
        assert!(matches!(err, VoteError::VotingClosed));
        assert_eq!(err.code(), "VOTING_CLOSED");
    }

    #[tokio::test]
    async fn test_toggle_vote_validates_track() {
        let (_store, state) = open_state().await;
        let mut bad = track("t1");
        bad.title = "  ".to_string();

        let err = state.toggle_vote("voter-1", bad).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRACK");
    }

    #[tokio::test]
    async fn test_toggle_vote_round_trip() {
        let (_store, state) = open_state().await;
        let mut rx = state.broadcast.subscribe();

        let (outcome, votes) = state.toggle_vote("voter-1", track("t1")).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Cast);
        assert_eq!(votes.tracks.len(), 1);
        assert_eq!(votes.remaining, 2);

        match rx.recv().await.unwrap() {
            ServerMessage::Ranking { tracks, seq } => {
                assert_eq!(seq, 1);
                assert_eq!(tracks[0].votes, 1);
            }
            other => panic!("expected ranking, got {:?}", other),
        }

        let (outcome, votes) = state.toggle_vote("voter-1", track("t1")).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Retracted);
        assert!(votes.tracks.is_empty());
    }

    #[tokio::test]
    async fn test_ledger_for_loads_existing_records() {
        let (store, state) = open_state().await;
        store
            .insert_vote(VoteRecord::new(&track("t9"), "voter-1", Utc::now()))
            .await
            .unwrap();

        let ledger = state.ledger_for("voter-1").await.unwrap();
        assert_eq!(ledger.active_vote_ids().await, vec!["t9"]);
        assert!(state.ledger_for("not valid!").await.is_err());
    }

    #[tokio::test]
    async fn test_reading_votes_does_not_cache_ledgers() {
        let (store, state) = open_state().await;
        store
            .insert_vote(VoteRecord::new(&track("t1"), "voter-0", Utc::now()))
            .await
            .unwrap();

        for i in 0..500 {
            state.voter_votes(&format!("voter-{}", i)).await.unwrap();
        }
        assert!(state.ledgers.read().await.is_empty());

        let votes = state.voter_votes("voter-0").await.unwrap();
        assert_eq!(votes.tracks.len(), 1);
    }

    #[tokio::test]
    async fn test_idle_ledgers_are_released() {
        let (_store, state) = open_state().await;
        state.toggle_vote("voter-1", track("t1")).await.unwrap();
        state.toggle_vote("voter-2", track("t1")).await.unwrap();
        assert_eq!(state.ledgers.read().await.len(), 2);

        // A ledger somebody still holds stays cached
        let held = state.ledger_for("voter-1").await.unwrap();
        assert!(!state.release_ledger("voter-1").await);
        assert_eq!(state.evict_idle_ledgers().await, 1);
        drop(held);

        assert!(state.release_ledger("voter-1").await);
        assert!(state.ledgers.read().await.is_empty());

        // Evicted voters are reloaded from the store on their next toggle
        let (outcome, votes) = state.toggle_vote("voter-2", track("t1")).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Retracted);
        assert!(votes.tracks.is_empty());
    }

    #[tokio::test]
    async fn test_override_broadcasts_status() {
        let state = AppState::in_memory(EventConfig::default());
        let mut rx = state.broadcast.subscribe();

        state.set_voting_override(true).await.unwrap();
        match rx.recv().await.unwrap() {
            ServerMessage::VotingStatus { status } => assert!(status.allowed),
            other => panic!("expected voting status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_seed_export_and_clear() {
        let (store, state) = open_state().await;

        assert_eq!(state.seed_votes().await.unwrap(), SEED_VOTES.len());
        // Seeding twice does not duplicate records
        state.seed_votes().await.unwrap();
        assert_eq!(store.all_votes().await.unwrap().len(), SEED_VOTES.len());

        let ranking = state.tally.ranking().await;
        assert_eq!(ranking[0].title, "Dancing Queen");
        assert_eq!(ranking[0].votes, 3);

        let csv = state.export_votes_csv().await.unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(lines.count(), SEED_VOTES.len());
        assert!(csv.contains("Livin' on a Prayer"));

        state.clear_votes().await.unwrap();
        assert!(store.all_votes().await.unwrap().is_empty());
        assert!(state.tally.ranking().await.is_empty());
    }

    #[tokio::test]
    async fn test_mark_played_blocks_new_votes() {
        let (_store, state) = open_state().await;
        state.mark_played("t1").await.unwrap();

        let (outcome, votes) = state.toggle_vote("voter-1", track("t1")).await.unwrap();
        assert_eq!(outcome, VoteOutcome::AlreadyPlayed);
        assert!(votes.tracks.is_empty());
    }
}
