//! Audience message handlers
//!
//! Voting, recommendations and karaoke sign-up.

use crate::ledger::VoteOutcome;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{KaraokeSignup, TrackSummary};
use std::sync::Arc;

pub async fn handle_toggle_vote(
    state: &Arc<AppState>,
    voter_id: &str,
    track: TrackSummary,
) -> Option<ServerMessage> {
    let track_id = track.track_id.clone();
    tracing::debug!(voter = voter_id, track = %track_id, "Toggle vote");

    match state.toggle_vote(voter_id, track).await {
        Ok((VoteOutcome::Superseded, _)) => {
            // A newer toggle for this track answers the client instead
            None
        }
        Ok((outcome, votes)) => Some(ServerMessage::VoteResult {
            track_id,
            outcome,
            votes,
        }),
        Err(e) => {
            tracing::info!(voter = voter_id, track = %track_id, "Vote rejected: {}", e);
            Some(ServerMessage::error(e.code(), e.to_string()))
        }
    }
}

pub async fn handle_refresh_votes(state: &Arc<AppState>, voter_id: &str) -> Option<ServerMessage> {
    match state.voter_votes(voter_id).await {
        Ok(votes) => Some(ServerMessage::MyVotes { votes }),
        Err(e) => Some(ServerMessage::error(e.code(), e.to_string())),
    }
}

pub async fn handle_recommend_track(
    state: &Arc<AppState>,
    voter_id: &str,
    track: TrackSummary,
) -> Option<ServerMessage> {
    match state.recommend_track(voter_id, track).await {
        Ok(recommendation) => Some(ServerMessage::RecommendationReceived { recommendation }),
        Err(e) => Some(ServerMessage::error("RECOMMEND_FAILED", e)),
    }
}

pub async fn handle_karaoke_signup(
    state: &Arc<AppState>,
    signup: KaraokeSignup,
) -> Option<ServerMessage> {
    match state.sign_up(signup).await {
        Ok(entry) => Some(ServerMessage::SignupAccepted { entry }),
        Err(e) => Some(ServerMessage::ValidationError {
            field: e.field.to_string(),
            msg: e.msg,
        }),
    }
}
