//! Song catalogue search.
//!
//! Attendees search an external music catalogue to find tracks to vote for or
//! recommend. Credentials for the catalogue stay on the server.

mod spotify;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

pub use spotify::{SpotifyCatalogue, SpotifyConfig};

pub type CatalogueResult<T> = Result<T, CatalogueError>;

#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("catalogue request failed: {0}")]
    ApiError(String),

    #[error("token exchange failed: {0}")]
    AuthError(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("response parsing failed: {0}")]
    ParseError(String),
}

/// A search hit, before deduplication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackCandidate {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub popularity: u32,
}

impl TrackCandidate {
    pub fn to_summary(&self) -> crate::types::TrackSummary {
        crate::types::TrackSummary {
            track_id: self.id.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            artwork_url: self.artwork_url.clone(),
        }
    }
}

#[async_trait]
pub trait CatalogueSearch: Send + Sync {
    async fn search(&self, query: &str, limit: u32) -> CatalogueResult<Vec<TrackCandidate>>;

    fn name(&self) -> &str;
}

/// Normalize a title or artist for duplicate detection.
///
/// Drops bracketed parts ("(Remastered 2011)", "[Live]") and anything after
/// a " - " separator, lower-cases, strips punctuation and collapses spaces.
pub fn normalize_key(raw: &str) -> String {
    let head = raw.split(" - ").next().unwrap_or(raw);

    let mut depth = 0usize;
    let mut kept = String::with_capacity(head.len());
    for c in head.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => kept.push(c),
            _ => {}
        }
    }

    kept.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse re-releases and remasters of the same song.
///
/// The most popular candidate per normalized (title, artist) wins; the
/// output is ordered by popularity, ties in input order.
pub fn dedupe_candidates(mut candidates: Vec<TrackCandidate>) -> Vec<TrackCandidate> {
    candidates.sort_by(|a, b| b.popularity.cmp(&a.popularity));

    let mut seen: HashSet<(String, String)> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((normalize_key(&c.title), normalize_key(&c.artist))))
        .collect()
}
