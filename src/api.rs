//! HTTP API endpoints.
//!
//! The web app uses these alongside the WebSocket: read-only views for the
//! party screen, vote toggling for guests, and admin tooling (voting
//! override, exports, demo data).

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::abuse::{self, AbuseConfig};
use crate::auth::{self, AuthConfig};
use crate::catalogue::{CatalogueError, TrackCandidate};
use crate::config::EventConfig;
use crate::ledger::{LedgerError, VoteOutcome, VoterVotes};
use crate::state::export::PartyStateExport;
use crate::state::{AppState, VoteError};
use crate::store::StoreError;
use crate::types::{
    is_valid_voter_id, KaraokeEntry, Recommendation, TrackAggregate, TrackSummary, VoterId,
};
use crate::window::GateStatus;
use crate::ws;

const DEFAULT_SEARCH_LIMIT: u32 = 20;
const MAX_SEARCH_LIMIT: u32 = 50;

/// JSON error body: `{"code": "...", "msg": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub msg: String,
}

fn error_response(status: StatusCode, code: &str, msg: impl Into<String>) -> Response {
    (
        status,
        Json(ApiError {
            code: code.to_string(),
            msg: msg.into(),
        }),
    )
        .into_response()
}

fn store_error_response(e: &StoreError) -> Response {
    let status = match e {
        StoreError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Permission(_) | StoreError::Decode(_) => StatusCode::BAD_GATEWAY,
        StoreError::Rejected(_) => StatusCode::BAD_REQUEST,
    };
    error_response(status, e.code(), e.to_string())
}

fn vote_error_response(e: &VoteError) -> Response {
    match e {
        VoteError::VotingClosed => error_response(StatusCode::CONFLICT, e.code(), e.to_string()),
        VoteError::InvalidTrack(_) | VoteError::Ledger(LedgerError::InvalidVoter) => {
            error_response(StatusCode::BAD_REQUEST, e.code(), e.to_string())
        }
        VoteError::Ledger(LedgerError::Store(store)) => store_error_response(store),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingResponse {
    pub tracks: Vec<TrackAggregate>,
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterResponse {
    pub voter_id: VoterId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub outcome: VoteOutcome,
    pub votes: VoterVotes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedResponse {
    pub inserted: usize,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

/// GET /api/status
pub async fn voting_status(State(state): State<Arc<AppState>>) -> Json<GateStatus> {
    Json(state.gate.status().await)
}

/// GET /api/ranking
pub async fn ranking(State(state): State<Arc<AppState>>) -> Json<RankingResponse> {
    Json(RankingResponse {
        tracks: state.tally.ranking().await,
        seq: state.ranking_seq.load(Ordering::SeqCst),
    })
}

/// GET /api/event
///
/// Public event info plus the voting schedule
pub async fn event_info(State(state): State<Arc<AppState>>) -> Json<EventConfig> {
    Json(state.event.as_ref().clone())
}

/// GET /api/karaoke
pub async fn karaoke_queue(State(state): State<Arc<AppState>>) -> Json<Vec<KaraokeEntry>> {
    Json(state.upcoming_karaoke().await)
}

/// GET /api/recommendations
pub async fn recommendations(State(state): State<Arc<AppState>>) -> Json<Vec<Recommendation>> {
    Json(state.list_recommendations(false).await)
}

/// GET /api/search?q=...&limit=...
///
/// Catalogue search, deduplicated. Empty queries return nothing without
/// calling the catalogue.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(catalogue) = state.catalogue.clone() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "SEARCH_UNAVAILABLE",
            "No music catalogue configured",
        );
    };

    let query = params.q.trim();
    if query.is_empty() {
        return Json(Vec::<TrackCandidate>::new()).into_response();
    }
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    match catalogue.search(query, limit).await {
        Ok(results) => Json(results).into_response(),
        Err(e) => {
            tracing::warn!(provider = catalogue.name(), "Search failed: {}", e);
            let status = match &e {
                CatalogueError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            error_response(status, "SEARCH_FAILED", e.to_string())
        }
    }
}

/// POST /api/voter
///
/// Mint a fresh anonymous voter id. The client keeps it in local storage.
pub async fn new_voter() -> Json<VoterResponse> {
    Json(VoterResponse {
        voter_id: ulid::Ulid::new().to_string(),
    })
}

/// GET /api/votes/{voter_id}
pub async fn voter_votes(
    State(state): State<Arc<AppState>>,
    Path(voter_id): Path<VoterId>,
) -> Response {
    if !is_valid_voter_id(&voter_id) {
        return error_response(StatusCode::BAD_REQUEST, "INVALID_VOTER", "Invalid voter id");
    }
    match state.voter_votes(&voter_id).await {
        Ok(votes) => Json(votes).into_response(),
        Err(LedgerError::Store(e)) => store_error_response(&e),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.code(), e.to_string()),
    }
}

/// POST /api/votes/{voter_id}/toggle
pub async fn toggle_vote(
    State(state): State<Arc<AppState>>,
    Path(voter_id): Path<VoterId>,
    Json(track): Json<TrackSummary>,
) -> Response {
    match state.toggle_vote(&voter_id, track).await {
        Ok((outcome, votes)) => Json(ToggleResponse { outcome, votes }).into_response(),
        Err(e) => vote_error_response(&e),
    }
}

/// POST /api/admin/voting/open
pub async fn open_voting(State(state): State<Arc<AppState>>) -> Response {
    match state.set_voting_override(true).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => store_error_response(&e),
    }
}

/// POST /api/admin/voting/close
pub async fn close_voting(State(state): State<Arc<AppState>>) -> Response {
    match state.set_voting_override(false).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => store_error_response(&e),
    }
}

/// GET /api/admin/votes.csv
pub async fn export_votes_csv(State(state): State<Arc<AppState>>) -> Response {
    match state.export_votes_csv().await {
        Ok(csv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"votes.csv\"",
                ),
            ],
            csv,
        )
            .into_response(),
        Err(e) => store_error_response(&e),
    }
}

/// DELETE /api/admin/votes
pub async fn clear_votes(State(state): State<Arc<AppState>>) -> Response {
    match state.clear_votes().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error_response(&e),
    }
}

/// POST /api/admin/votes/seed
pub async fn seed_votes(State(state): State<Arc<AppState>>) -> Response {
    match state.seed_votes().await {
        Ok(inserted) => Json(SeedResponse { inserted }).into_response(),
        Err(e) => store_error_response(&e),
    }
}

/// POST /api/admin/played/{track_id}
pub async fn mark_played(
    State(state): State<Arc<AppState>>,
    Path(track_id): Path<String>,
) -> Response {
    match state.mark_played(&track_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error_response(&e),
    }
}

/// GET /api/admin/state/export
pub async fn export_state(State(state): State<Arc<AppState>>) -> Json<PartyStateExport> {
    Json(state.export_state().await)
}

/// POST /api/admin/state/import
///
/// Replaces the karaoke queue and recommendations with the snapshot.
pub async fn import_state(
    State(state): State<Arc<AppState>>,
    Json(export): Json<PartyStateExport>,
) -> Response {
    match state.import_state(export).await {
        Ok(()) => (StatusCode::OK, "State imported successfully").into_response(),
        Err(e) => {
            tracing::error!("State import failed: {}", e);
            error_response(StatusCode::BAD_REQUEST, "IMPORT_FAILED", e)
        }
    }
}

/// Build the full application router
pub fn router(
    state: Arc<AppState>,
    auth_config: Arc<AuthConfig>,
    abuse_config: Arc<AbuseConfig>,
    static_dir: &FsPath,
) -> Router {
    let public_routes = Router::new()
        .route("/api/status", get(voting_status))
        .route("/api/ranking", get(ranking))
        .route("/api/event", get(event_info))
        .route("/api/karaoke", get(karaoke_queue))
        .route("/api/recommendations", get(recommendations))
        .route("/api/search", get(search))
        .route("/api/voter", post(new_voter))
        .route("/api/votes/{voter_id}", get(voter_votes))
        .route("/api/votes/{voter_id}/toggle", post(toggle_vote))
        .layer(middleware::from_fn_with_state(
            abuse_config.clone(),
            abuse::api_abuse_middleware,
        ));

    let admin_routes = Router::new()
        .route("/api/admin/voting/open", post(open_voting))
        .route("/api/admin/voting/close", post(close_voting))
        .route("/api/admin/votes.csv", get(export_votes_csv))
        .route("/api/admin/votes", delete(clear_votes))
        .route("/api/admin/votes/seed", post(seed_votes))
        .route("/api/admin/played/{track_id}", post(mark_played))
        .route("/api/admin/state/export", get(export_state))
        .route("/api/admin/state/import", post(import_state))
        .layer(middleware::from_fn_with_state(
            auth_config.clone(),
            auth::admin_auth_middleware,
        ));

    // Abuse checks run first, then admin auth for `role=admin`
    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            auth_config,
            auth::admin_ws_auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            abuse_config,
            abuse::ws_abuse_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .merge(ws_routes)
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
