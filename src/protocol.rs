use crate::ledger::{VoteOutcome, VoterVotes};
use crate::types::*;
use crate::window::GateStatus;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Toggle a vote for the session's voter
    ToggleVote {
        track: TrackSummary,
    },
    /// Re-read the session voter's records (after reconnect or a second tab)
    RefreshVotes,
    RecommendTrack {
        track: TrackSummary,
    },
    KaraokeSignup {
        singer_name: String,
        song_title: String,
        #[serde(default)]
        artist: Option<String>,
    },
    // Admin-only messages
    AdminOpenVoting,
    AdminCloseVoting,
    AdminMarkPlayed {
        track_id: TrackId,
    },
    AdminSetQueueOrder {
        order: Vec<EntryId>,
    },
    AdminMoveEntry {
        entry_id: EntryId,
        to_index: usize,
    },
    AdminSetEntryStatus {
        entry_id: EntryId,
        status: EntryStatus,
    },
    AdminRemoveEntry {
        entry_id: EntryId,
    },
    AdminReviewRecommendation {
        recommendation_id: RecommendationId,
        approve: bool,
    },
    AdminDeleteRecommendation {
        recommendation_id: RecommendationId,
    },
    AdminListRecommendations,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        voting: GateStatus,
        event: EventInfo,
    },
    VotingStatus {
        status: GateStatus,
    },
    MyVotes {
        votes: VoterVotes,
    },
    VoteResult {
        track_id: TrackId,
        outcome: VoteOutcome,
        votes: VoterVotes,
    },
    Ranking {
        tracks: Vec<TrackAggregate>,
        seq: u64,
    },
    KaraokeQueue {
        entries: Vec<KaraokeEntry>,
    },
    SignupAccepted {
        entry: KaraokeEntry,
    },
    RecommendationReceived {
        recommendation: Recommendation,
    },
    Recommendations {
        items: Vec<Recommendation>,
    },
    /// Business-rule notice; not a failure
    Info {
        code: String,
        msg: String,
    },
    /// Form input rejected before anything was stored
    ValidationError {
        field: String,
        msg: String,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            msg: msg.into(),
        }
    }
}
