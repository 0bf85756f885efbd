//! WebSocket message dispatch
//!
//! Authorization is checked here, then dispatched to role-specific handler modules.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::Session;
use crate::state::AppState;
use crate::types::KaraokeSignup;
use std::sync::Arc;

use super::{admin, audience};

/// Return early unless the session belongs to an authenticated admin
macro_rules! check_admin {
    ($session:expr, $action:expr) => {
        if !$session.is_admin() {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only admins can {}", $action),
            });
        }
    };
}

/// Return early unless the session carries a voter id
macro_rules! require_voter {
    ($session:expr) => {
        match $session.voter_id.as_deref() {
            Some(voter_id) => voter_id,
            None => {
                return Some(ServerMessage::error(
                    "NO_VOTER",
                    "Connect with a voter id to do this",
                ))
            }
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    session: &Session,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        // Audience messages
        ClientMessage::ToggleVote { track } => {
            let voter_id = require_voter!(session);
            audience::handle_toggle_vote(state, voter_id, track).await
        }

        ClientMessage::RefreshVotes => {
            let voter_id = require_voter!(session);
            audience::handle_refresh_votes(state, voter_id).await
        }

        ClientMessage::RecommendTrack { track } => {
            let voter_id = require_voter!(session);
            audience::handle_recommend_track(state, voter_id, track).await
        }

        ClientMessage::KaraokeSignup {
            singer_name,
            song_title,
            artist,
        } => {
            audience::handle_karaoke_signup(
                state,
                KaraokeSignup {
                    singer_name,
                    song_title,
                    artist,
                },
            )
            .await
        }

        // Admin-only commands
        ClientMessage::AdminOpenVoting => {
            check_admin!(session, "open voting");
            admin::handle_set_voting(state, true).await
        }

        ClientMessage::AdminCloseVoting => {
            check_admin!(session, "close voting");
            admin::handle_set_voting(state, false).await
        }

        ClientMessage::AdminMarkPlayed { track_id } => {
            check_admin!(session, "mark tracks as played");
            admin::handle_mark_played(state, track_id).await
        }

        ClientMessage::AdminSetQueueOrder { order } => {
            check_admin!(session, "reorder the karaoke queue");
            admin::handle_set_queue_order(state, order).await
        }

        ClientMessage::AdminMoveEntry { entry_id, to_index } => {
            check_admin!(session, "reorder the karaoke queue");
            admin::handle_move_entry(state, entry_id, to_index).await
        }

        ClientMessage::AdminSetEntryStatus { entry_id, status } => {
            check_admin!(session, "update karaoke entries");
            admin::handle_set_entry_status(state, entry_id, status).await
        }

        ClientMessage::AdminRemoveEntry { entry_id } => {
            check_admin!(session, "remove karaoke entries");
            admin::handle_remove_entry(state, entry_id).await
        }

        ClientMessage::AdminReviewRecommendation {
            recommendation_id,
            approve,
        } => {
            check_admin!(session, "review recommendations");
            admin::handle_review_recommendation(state, recommendation_id, approve).await
        }

        ClientMessage::AdminDeleteRecommendation { recommendation_id } => {
            check_admin!(session, "delete recommendations");
            admin::handle_delete_recommendation(state, recommendation_id).await
        }

        ClientMessage::AdminListRecommendations => {
            check_admin!(session, "list recommendations");
            Some(ServerMessage::Recommendations {
                items: state.list_recommendations(true).await,
            })
        }
    }
}
