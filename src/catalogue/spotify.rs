use super::*;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::Instant;
use tokio::sync::Mutex;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

/// Refresh the access token this long before it actually expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
    /// Market used to filter playable tracks
    pub market: Option<String>,
}

impl SpotifyConfig {
    /// Load from `SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET`; `None` if either is missing
    pub fn from_env() -> Option<Self> {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let client_id = read("SPOTIFY_CLIENT_ID")?;
        let client_secret = read("SPOTIFY_CLIENT_SECRET")?;

        Some(Self {
            client_id,
            client_secret,
            timeout: Duration::from_secs(5),
            market: read("SPOTIFY_MARKET"),
        })
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Spotify Web API search using the client-credentials flow
pub struct SpotifyCatalogue {
    config: SpotifyConfig,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
    token_url: String,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistItem>,
    album: Option<AlbumItem>,
    #[serde(default)]
    popularity: u32,
}

#[derive(Debug, Deserialize)]
struct ArtistItem {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumItem {
    #[serde(default)]
    images: Vec<ImageItem>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    url: String,
}

impl TrackItem {
    /// Local files and region-blocked items come back without an id
    fn into_candidate(self) -> Option<TrackCandidate> {
        let id = self.id?;
        let artist = self
            .artists
            .into_iter()
            .next()
            .map(|a| a.name)
            .unwrap_or_default();
        let artwork_url = self
            .album
            .and_then(|album| album.images.into_iter().next())
            .map(|image| image.url);

        Some(TrackCandidate {
            id,
            title: self.name,
            artist,
            artwork_url,
            popularity: self.popularity,
        })
    }
}

impl SpotifyCatalogue {
    pub fn new(config: SpotifyConfig) -> CatalogueResult<Self> {
        Self::with_endpoints(config, TOKEN_URL, API_URL)
    }

    /// Point at alternative endpoints (used against local fakes)
    pub fn with_endpoints(
        config: SpotifyConfig,
        token_url: &str,
        api_url: &str,
    ) -> CatalogueResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CatalogueError::ApiError(format!("failed to build client: {}", e)))?;

        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
            token_url: token_url.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn basic_credentials(&self) -> String {
        STANDARD.encode(format!(
            "{}:{}",
            self.config.client_id, self.config.client_secret
        ))
    }

    /// Return a cached access token, exchanging credentials when needed
    async fn access_token(&self) -> CatalogueResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(&self.token_url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Basic {}", self.basic_credentials()),
            )
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(CatalogueError::AuthError(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CatalogueError::ParseError(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        tracing::debug!(lifetime_secs = lifetime.as_secs(), "Obtained catalogue token");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    /// One search request; `None` when the token was rejected
    async fn search_with_token(
        &self,
        token: &str,
        params: &[(&str, String)],
    ) -> CatalogueResult<Option<SearchResponse>> {
        let response = self
            .client
            .get(format!("{}/search", self.api_url))
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CatalogueError::ApiError(format!(
                "search returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| CatalogueError::ParseError(e.to_string()))
    }

    fn transport_error(&self, e: reqwest::Error) -> CatalogueError {
        if e.is_timeout() {
            CatalogueError::Timeout(self.config.timeout)
        } else {
            CatalogueError::ApiError(e.to_string())
        }
    }
}

#[async_trait]
impl CatalogueSearch for SpotifyCatalogue {
    async fn search(&self, query: &str, limit: u32) -> CatalogueResult<Vec<TrackCandidate>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();

        let mut params = vec![
            ("q", query.to_string()),
            ("type", "track".to_string()),
            ("limit", limit.clamp(1, 50).to_string()),
        ];
        if let Some(market) = &self.config.market {
            params.push(("market", market.clone()));
        }

        let token = self.access_token().await?;
        let body = match self.search_with_token(&token, &params).await? {
            Some(body) => body,
            None => {
                // Token revoked before its expiry; exchange once more and retry
                tracing::debug!("Catalogue token rejected, refreshing");
                *self.token.lock().await = None;
                let token = self.access_token().await?;
                self.search_with_token(&token, &params)
                    .await?
                    .ok_or_else(|| {
                        CatalogueError::AuthError("access token rejected".to_string())
                    })?
            }
        };

        let candidates: Vec<TrackCandidate> = body
            .tracks
            .items
            .into_iter()
            .filter_map(TrackItem::into_candidate)
            .collect();

        tracing::debug!(
            query,
            hits = candidates.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Catalogue search"
        );

        Ok(dedupe_candidates(candidates))
    }

    fn name(&self) -> &str {
        "spotify"
    }
}
