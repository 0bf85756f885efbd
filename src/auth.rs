//! HTTP Basic Authentication for admin routes and the admin WebSocket

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::sync::Arc;

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Admin username (None = auth disabled)
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AuthConfig {
    /// Load auth config from environment variables.
    /// ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable auth.
    pub fn from_env() -> Self {
        let username = std::env::var("ADMIN_USERNAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if username.is_some() && password.is_some() {
            tracing::info!("Admin authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable authentication"
                );
            }
            tracing::warn!("Admin authentication DISABLED - anyone can use admin controls!");
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                constant_time_eq(u.as_bytes(), username.as_bytes())
                    && constant_time_eq(p.as_bytes(), password.as_bytes())
            }
            _ => true, // Auth disabled, allow all
        }
    }

    /// Check the request's `Authorization: Basic ...` header
    fn authorizes(&self, request: &Request<Body>) -> bool {
        basic_credentials(request)
            .map(|(username, password)| self.validate(&username, &password))
            .unwrap_or(false)
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn basic_credentials(request: &Request<Body>) -> Option<(String, String)> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn unauthorized(realm: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", realm))],
        "Unauthorized",
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct RoleQuery {
    role: Option<String>,
}

/// Decoded the same way the WebSocket handler reads it, so an encoded
/// `role` value cannot slip past this check
fn requests_admin_role(request: &Request<Body>) -> bool {
    Query::<RoleQuery>::try_from_uri(request.uri())
        .map(|Query(q)| q.role.as_deref() == Some("admin"))
        .unwrap_or(false)
}

/// Middleware for HTTP Basic Authentication on admin routes
pub async fn admin_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth_config.is_enabled() || auth_config.authorizes(&request) {
        return next.run(request).await;
    }

    tracing::warn!(uri = %request.uri(), "Rejected unauthenticated admin request");
    unauthorized("Partyvote Admin")
}

/// Middleware to require HTTP Basic Auth for admin WebSocket connections.
///
/// Audience sockets pass through untouched; `/ws?role=admin` needs credentials.
pub async fn admin_ws_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let is_admin_ws = request.uri().path() == "/ws" && requests_admin_role(&request);

    if !is_admin_ws {
        return next.run(request).await;
    }

    if !auth_config.is_enabled() {
        tracing::warn!(
            "Admin WebSocket requested but admin authentication is DISABLED; set ADMIN_USERNAME and ADMIN_PASSWORD"
        );
        return next.run(request).await;
    }

    if auth_config.authorizes(&request) {
        return next.run(request).await;
    }

    unauthorized("Partyvote Admin (WebSocket)")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_auth(uri: &str, credentials: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(credentials) = credentials {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Basic {}", STANDARD.encode(credentials)),
            );
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_requests_admin_role() {
        assert!(requests_admin_role(&request_with_auth(
            "/ws?role=admin&voter=abc",
            None
        )));
        assert!(requests_admin_role(&request_with_auth("/ws?role=%61dmin", None)));
        assert!(!requests_admin_role(&request_with_auth("/ws?role=audience", None)));
        assert!(!requests_admin_role(&request_with_auth("/ws", None)));
    }

    #[test]
    fn test_auth_config_disabled_when_incomplete() {
        let config = AuthConfig::disabled();
        assert!(!config.is_enabled());
        assert!(config.validate("any", "thing"));

        let config = AuthConfig {
            username: Some("user".to_string()),
            password: None,
        };
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_auth_config_enabled() {
        let config = AuthConfig::new("admin", "secret");
        assert!(config.is_enabled());
        assert!(config.validate("admin", "secret"));
        assert!(!config.validate("admin", "wrong"));
        assert!(!config.validate("wrong", "secret"));
        assert!(!config.validate("", ""));
    }

    #[test]
    fn test_basic_credentials() {
        let req = request_with_auth("/api/admin/votes.csv", Some("admin:se:cret"));
        assert_eq!(
            basic_credentials(&req),
            Some(("admin".to_string(), "se:cret".to_string()))
        );

        let req = request_with_auth("/api/admin/votes.csv", None);
        assert!(basic_credentials(&req).is_none());

        let req = Request::builder()
            .header(header::AUTHORIZATION, "Basic not-base64!")
            .body(Body::empty())
            .unwrap();
        assert!(basic_credentials(&req).is_none());
    }

    #[test]
    fn test_authorizes() {
        let config = AuthConfig::new("admin", "secret");
        assert!(config.authorizes(&request_with_auth("/", Some("admin:secret"))));
        assert!(!config.authorizes(&request_with_auth("/", Some("admin:nope"))));
        assert!(!config.authorizes(&request_with_auth("/", None)));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(constant_time_eq(b"", b""));
    }
}
