pub mod admin;
pub mod audience;
pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::SplitSink, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;

use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::session::Session;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
    pub voter: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let session = Session::from_params(params.role.as_deref(), params.voter.as_deref());
    tracing::info!(
        "WebSocket connection request: role={:?}, voter={:?}",
        session.role,
        session.voter_id
    );

    ws.on_upgrade(move |socket| handle_socket(socket, session, state))
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

/// Messages a client gets right after connecting
async fn initial_messages(session: &Session, state: &Arc<AppState>) -> Vec<ServerMessage> {
    // Re-evaluate on connect so a fresh view never starts from a stale decision
    let voting = state.refresh_voting_status().await;

    let mut messages = vec![
        ServerMessage::Welcome {
            protocol: PROTOCOL_VERSION.to_string(),
            role: session.role.clone(),
            voting,
            event: state.event.info.clone(),
        },
        ServerMessage::Ranking {
            tracks: state.tally.ranking().await,
            seq: state
                .ranking_seq
                .load(std::sync::atomic::Ordering::SeqCst),
        },
        ServerMessage::KaraokeQueue {
            entries: state.upcoming_karaoke().await,
        },
        ServerMessage::Recommendations {
            items: state.list_recommendations(session.is_admin()).await,
        },
    ];

    // Reconnect: reload this voter's records so other tabs' changes show up
    if let Some(voter_id) = &session.voter_id {
        match state.voter_votes(voter_id).await {
            Ok(votes) => messages.push(ServerMessage::MyVotes { votes }),
            Err(e) => {
                tracing::warn!(voter = %voter_id, "Failed to load votes on connect: {}", e);
                messages.push(ServerMessage::error(e.code(), e.to_string()));
            }
        }
    }

    messages
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, session: Session, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    tracing::info!("WebSocket connected with role: {:?}", session.role);

    for msg in initial_messages(&session, &state).await {
        if !send_json(&mut sender, &msg).await {
            tracing::error!("Failed to send initial state");
            return;
        }
    }

    // Subscribe to general broadcast (all clients)
    let mut broadcast_rx = state.broadcast.subscribe();

    // Subscribe to admin-specific broadcast if admin
    let mut admin_broadcast_rx = if session.is_admin() {
        Some(state.admin_broadcast.subscribe())
    } else {
        None
    };

    loop {
        tokio::select! {
            broadcast_msg = broadcast_rx.recv() => {
                match broadcast_msg {
                    Ok(msg) => {
                        // Admins get the full recommendation list on their own channel
                        if session.is_admin() && matches!(msg, ServerMessage::Recommendations { .. }) {
                            continue;
                        }
                        if !send_json(&mut sender, &msg).await {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Client lagging behind broadcasts");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            admin_msg = async {
                match &mut admin_broadcast_rx {
                    Some(rx) => rx.recv().await.ok(),
                    None => {
                        // Non-admin: wait forever
                        std::future::pending::<Option<ServerMessage>>().await
                    }
                }
            } => {
                if let Some(msg) = admin_msg {
                    if !send_json(&mut sender, &msg).await {
                        break;
                    }
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &session, &state).await
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                Some(ServerMessage::error(
                                    "PARSE_ERROR",
                                    format!("Invalid message format: {}", e),
                                ))
                            }
                        };

                        if let Some(response) = response {
                            if !send_json(&mut sender, &response).await {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(voter_id) = &session.voter_id {
        if state.release_ledger(voter_id).await {
            tracing::debug!(voter = %voter_id, "Released vote ledger");
        }
    }

    tracing::info!("WebSocket connection closed for role: {:?}", session.role);
}
