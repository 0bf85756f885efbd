//! Admin-only command handlers
//!
//! Authorization is checked in the dispatch layer before calling these.

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{EntryId, EntryStatus, RecommendationId, TrackId};
use std::sync::Arc;

pub async fn handle_set_voting(state: &Arc<AppState>, enabled: bool) -> Option<ServerMessage> {
    tracing::info!(enabled, "Admin setting voting override");
    match state.set_voting_override(enabled).await {
        Ok(status) => Some(ServerMessage::VotingStatus { status }),
        Err(e) => {
            tracing::error!("Failed to set voting override: {}", e);
            Some(ServerMessage::error(e.code(), e.to_string()))
        }
    }
}

pub async fn handle_mark_played(state: &Arc<AppState>, track_id: TrackId) -> Option<ServerMessage> {
    match state.mark_played(&track_id).await {
        Ok(()) => Some(ServerMessage::Info {
            code: "TRACK_PLAYED".to_string(),
            msg: format!("Track {} marked as played", track_id),
        }),
        Err(e) => Some(ServerMessage::error(e.code(), e.to_string())),
    }
}

pub async fn handle_set_queue_order(
    state: &Arc<AppState>,
    order: Vec<EntryId>,
) -> Option<ServerMessage> {
    match state.set_queue_order(order).await {
        // Queue broadcast already went out to everyone
        Ok(()) => None,
        Err(e) => Some(ServerMessage::error("QUEUE_ORDER_FAILED", e)),
    }
}

pub async fn handle_move_entry(
    state: &Arc<AppState>,
    entry_id: EntryId,
    to_index: usize,
) -> Option<ServerMessage> {
    match state.move_entry(&entry_id, to_index).await {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::error("MOVE_ENTRY_FAILED", e)),
    }
}

pub async fn handle_set_entry_status(
    state: &Arc<AppState>,
    entry_id: EntryId,
    status: EntryStatus,
) -> Option<ServerMessage> {
    match state.set_entry_status(&entry_id, status).await {
        Ok(_) => None,
        Err(e) => Some(ServerMessage::error("ENTRY_STATUS_FAILED", e)),
    }
}

pub async fn handle_remove_entry(state: &Arc<AppState>, entry_id: EntryId) -> Option<ServerMessage> {
    match state.remove_entry(&entry_id).await {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::error("REMOVE_ENTRY_FAILED", e)),
    }
}

pub async fn handle_review_recommendation(
    state: &Arc<AppState>,
    recommendation_id: RecommendationId,
    approve: bool,
) -> Option<ServerMessage> {
    match state
        .review_recommendation(&recommendation_id, approve)
        .await
    {
        Ok(_) => None,
        Err(e) => Some(ServerMessage::error("REVIEW_FAILED", e)),
    }
}

pub async fn handle_delete_recommendation(
    state: &Arc<AppState>,
    recommendation_id: RecommendationId,
) -> Option<ServerMessage> {
    match state.delete_recommendation(&recommendation_id).await {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::error("DELETE_FAILED", e)),
    }
}
