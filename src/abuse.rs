//! Anti-abuse middleware
//!
//! Keeps a party night usable when someone points a script at the server:
//! - Blocks curl/wget user agents (basic bot filtering)
//! - Requires the X-Partyvote-Client header on API calls (the web app sets it)
//! - Rate limiting per voter id (stops vote flooding)

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

/// Header the web client sends on HTTP API calls
pub const REQUIRED_HEADER: &str = "X-Partyvote-Client";
pub const REQUIRED_HEADER_VALUE: &str = "1";

/// Sec-WebSocket-Key header (browsers always send this for WS upgrades)
const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";

/// Fixed-window request counter keyed by voter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Map of key to (request count, window start)
    requests: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(60, Duration::from_secs(10))
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Returns true if allowed, false if rate limited
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        match requests.get_mut(key) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) >= self.window {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_requests {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                requests.insert(key.to_string(), (1, now));
                true
            }
        }
    }

    /// Drop entries whose window is long over (call periodically)
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }

    pub async fn tracked_keys(&self) -> usize {
        self.requests.read().await.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[derive(Debug, Clone)]
pub struct AbuseConfig {
    pub block_user_agents: bool,
    /// Require browser-like headers (Origin + WS key on sockets, client header on API calls)
    pub require_browser_headers: bool,
    /// Rate limiter (None = disabled)
    pub rate_limiter: Option<RateLimiter>,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            block_user_agents: true,
            require_browser_headers: true,
            rate_limiter: Some(RateLimiter::default()),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(true)
}

impl AbuseConfig {
    pub fn from_env() -> Self {
        let block_user_agents = env_flag("ABUSE_BLOCK_USER_AGENTS");
        let require_browser_headers = env_flag("ABUSE_REQUIRE_BROWSER");
        let rate_limit_enabled = env_flag("ABUSE_RATE_LIMIT");

        let rate_limiter = if rate_limit_enabled {
            let max_requests = std::env::var("ABUSE_RATE_LIMIT_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);

            let window_secs = std::env::var("ABUSE_RATE_LIMIT_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10);

            Some(RateLimiter::new(
                max_requests,
                Duration::from_secs(window_secs),
            ))
        } else {
            None
        };

        tracing::info!(
            block_user_agents,
            require_browser_headers,
            rate_limit_enabled,
            "Anti-abuse config loaded"
        );

        Self {
            block_user_agents,
            require_browser_headers,
            rate_limiter,
        }
    }

    /// Everything off; for tests and local tooling
    pub fn permissive() -> Self {
        Self {
            block_user_agents: false,
            require_browser_headers: false,
            rate_limiter: None,
        }
    }
}

/// Check if a user agent looks like a bot/curl
fn is_blocked_user_agent(user_agent: &str) -> bool {
    let ua_lower = user_agent.to_lowercase();
    if ua_lower.contains("curl")
        || ua_lower.contains("wget")
        || ua_lower.contains("httpie")
        || ua_lower.contains("python-requests")
        || ua_lower.contains("python-urllib")
        || ua_lower.contains("libwww-perl")
        || ua_lower.contains("go-http-client")
        || ua_lower.contains("java/")
    {
        return true;
    }

    // "bot" as a word, not a substring
    ua_lower.ends_with("bot")
        || ua_lower.contains("bot/")
        || ua_lower.contains("bot ")
        || ua_lower.contains("spider")
        || ua_lower.contains("crawler")
}

/// Voter id a request acts for, from `?voter=` or an `/api/votes/{voter_id}` path.
/// Anonymous requests are not rate limited; guests at a venue share one IP.
fn get_rate_limit_key(request: &Request<Body>) -> Option<String> {
    if let Some(query) = request.uri().query() {
        for pair in query.split('&') {
            if let Some(voter) = pair.strip_prefix("voter=") {
                return Some(format!("voter:{}", voter));
            }
        }
    }

    request
        .uri()
        .path()
        .strip_prefix("/api/votes/")
        .and_then(|rest| rest.split('/').next())
        .filter(|voter| !voter.is_empty())
        .map(|voter| format!("voter:{}", voter))
}

fn forbidden(message: &'static str) -> Response {
    (
        StatusCode::FORBIDDEN,
        [(header::CONTENT_TYPE, "text/plain")],
        message,
    )
        .into_response()
}

fn rate_limited(retry_after: Duration) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            (header::CONTENT_TYPE, "text/plain".to_string()),
            (header::RETRY_AFTER, retry_after.as_secs().max(1).to_string()),
        ],
        "Rate limit exceeded. Please slow down.",
    )
        .into_response()
}

/// User agent check shared by both middlewares
fn user_agent_rejection(config: &AbuseConfig, request: &Request<Body>) -> Option<Response> {
    if !config.block_user_agents {
        return None;
    }
    match request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
    {
        Some(ua) if is_blocked_user_agent(ua) => {
            tracing::warn!(user_agent = ua, "Blocked suspicious user agent");
            Some(forbidden("Access denied"))
        }
        Some(_) => None,
        None => {
            tracing::warn!("Blocked request with no User-Agent");
            Some(forbidden("Access denied"))
        }
    }
}

/// Takes the key rather than the request: the request is not `Sync`, so a
/// borrow of it must not live across the limiter's await.
async fn rate_limit_rejection(config: &AbuseConfig, key: Option<String>) -> Option<Response> {
    let rate_limiter = config.rate_limiter.as_ref()?;
    let key = key?;
    if rate_limiter.check(&key).await {
        None
    } else {
        tracing::warn!(key, "Rate limited");
        Some(rate_limited(rate_limiter.window()))
    }
}

fn is_browser_websocket(request: &Request<Body>) -> bool {
    request.headers().contains_key(SEC_WEBSOCKET_KEY)
        && request.headers().contains_key(header::ORIGIN)
}

fn has_client_header(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(REQUIRED_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == REQUIRED_HEADER_VALUE)
}

/// Anti-abuse protection on the WebSocket endpoint
pub async fn ws_abuse_middleware(
    State(config): State<Arc<AbuseConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(response) = user_agent_rejection(&config, &request) {
        return response;
    }

    if config.require_browser_headers && !is_browser_websocket(&request) {
        tracing::warn!(
            uri = %request.uri(),
            has_origin = request.headers().contains_key(header::ORIGIN),
            has_ws_key = request.headers().contains_key(SEC_WEBSOCKET_KEY),
            "Blocked non-browser WebSocket request"
        );
        return forbidden("Access denied");
    }

    let key = get_rate_limit_key(&request);
    if let Some(response) = rate_limit_rejection(&config, key).await {
        return response;
    }

    next.run(request).await
}

/// Anti-abuse protection on the public HTTP API
pub async fn api_abuse_middleware(
    State(config): State<Arc<AbuseConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(response) = user_agent_rejection(&config, &request) {
        return response;
    }

    if config.require_browser_headers && !has_client_header(&request) {
        tracing::warn!(uri = %request.uri(), "Blocked API request without client header");
        return forbidden("Access denied");
    }

    let key = get_rate_limit_key(&request);
    if let Some(response) = rate_limit_rejection(&config, key).await {
        return response;
    }

    next.run(request).await
}
