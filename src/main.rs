use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use partyvote::{
    abuse, api, auth, broadcast,
    catalogue::{SpotifyCatalogue, SpotifyConfig},
    config::AppConfig,
    state::AppState,
    store::{MemoryStore, RestStore, RestStoreConfig},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "partyvote=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Partyvote...");

    let config = AppConfig::from_env();
    let auth_config = Arc::new(auth::AuthConfig::from_env());
    let abuse_config = Arc::new(abuse::AbuseConfig::from_env());
    let event = config.load_event_config();

    let state = match config.hosted_store() {
        Some((base_url, api_key)) => {
            let store = Arc::new(RestStore::new(RestStoreConfig {
                base_url,
                api_key,
                timeout: config.store_timeout,
            })?);
            tracing::info!("Using hosted vote store");
            AppState::new(store.clone(), store, event)
        }
        None => {
            tracing::warn!(
                "No hosted store configured - votes are kept in memory and lost on restart"
            );
            let store = Arc::new(MemoryStore::new());
            AppState::new(store.clone(), store, event)
        }
    };

    let state = match SpotifyConfig::from_env() {
        Some(spotify) => match SpotifyCatalogue::new(spotify) {
            Ok(catalogue) => {
                tracing::info!("Spotify catalogue search enabled");
                state.with_catalogue(Arc::new(catalogue))
            }
            Err(e) => {
                tracing::warn!("Failed to initialize Spotify search: {}", e);
                state
            }
        },
        None => {
            tracing::warn!("SPOTIFY_CLIENT_ID/SPOTIFY_CLIENT_SECRET not set, search disabled");
            state
        }
    };
    let state = Arc::new(state);

    // First evaluation before accepting connections; voting stays closed until then
    let status = state.refresh_voting_status().await;
    tracing::info!(allowed = status.allowed, reason = ?status.reason, "Initial voting status");
    if let Err(e) = state.refresh_ranking().await {
        tracing::warn!("Initial ranking load failed: {}", e);
    }

    // Handles are held until shutdown; dropping them stops the tasks
    let mut pollers = vec![
        broadcast::spawn_window_watcher(state.clone(), config.window_check_interval),
        broadcast::spawn_ranking_poller(state.clone(), config.ranking_poll_interval),
        broadcast::spawn_ledger_sweeper(state.clone(), config.ledger_sweep_interval),
    ];
    if let Some(limiter) = abuse_config.rate_limiter.clone() {
        pollers.push(broadcast::spawn_rate_limit_cleanup(limiter));
    }
    for poller in &pollers {
        tracing::debug!(poller = poller.name(), "Poller started");
    }

    let app = api::router(state, auth_config, abuse_config, &config.static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    drop(pollers);
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
