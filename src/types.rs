use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type TrackId = String;
pub type VoterId = String;
pub type EntryId = String;
pub type RecommendationId = String;

/// Maximum number of live votes a single voter may hold
pub const MAX_ACTIVE_VOTES: usize = 3;

/// Fixed key of the override row in `override_settings`
pub const VOTING_OVERRIDE_KEY: &str = "voting_override";

/// A scheduled interval during which voting opens automatically.
///
/// Bounds are kept as the raw configured strings and parsed on every
/// evaluation so a single malformed entry can never take down the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventWindow {
    pub start: String,
    pub end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl EventWindow {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
            location: None,
        }
    }

    /// Parsed `[start, end)` bounds, or `None` if either bound is unparsable
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = parse_instant(&self.start)?;
        let end = parse_instant(&self.end)?;
        Some((start, end))
    }

    /// Start inclusive, end exclusive. `start >= end` never matches.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        match self.bounds() {
            Some((start, end)) => start <= now && now < end,
            None => false,
        }
    }
}

/// Parse an ISO-8601 instant with offset. Accepts full RFC 3339 and the
/// minute-precision form `2025-08-13T20:00+02:00` used in event schedules.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::<FixedOffset>::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            // Bare UTC timestamps as some store RPCs return them
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Display metadata of a track, as carried by votes and recommendations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackSummary {
    pub track_id: TrackId,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub artwork_url: Option<String>,
}

/// Persisted fact that a voter currently endorses a track
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteRecord {
    pub track_id: TrackId,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub artwork_url: Option<String>,
    pub voter_id: VoterId,
    pub created_at: DateTime<Utc>,
}

impl VoteRecord {
    pub fn new(track: &TrackSummary, voter_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            track_id: track.track_id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            artwork_url: track.artwork_url.clone(),
            voter_id: voter_id.to_string(),
            created_at,
        }
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            track_id: self.track_id.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            artwork_url: self.artwork_url.clone(),
        }
    }
}

/// Derived vote count and display metadata for one track
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackAggregate {
    pub track_id: TrackId,
    pub title: String,
    pub artist: String,
    pub artwork_url: Option<String>,
    pub votes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayedTrack {
    pub track_id: TrackId,
    pub played_at: DateTime<Utc>,
}

/// Check a client-supplied voter token. Tokens are generated on the device
/// and never tied to an account, so only their shape is validated.
pub fn is_valid_voter_id(voter_id: &str) -> bool {
    !voter_id.is_empty()
        && voter_id.len() <= 64
        && voter_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Audience,
}

// ========== Karaoke queue ==========

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Waiting,
    OnStage,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KaraokeEntry {
    pub id: EntryId,
    pub singer_name: String,
    pub song_title: String,
    #[serde(default)]
    pub artist: Option<String>,
    pub status: EntryStatus,
    pub created_at: String,
}

/// Sign-up form as submitted by an attendee
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KaraokeSignup {
    pub singer_name: String,
    pub song_title: String,
    #[serde(default)]
    pub artist: Option<String>,
}

// ========== Recommendations ==========

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: RecommendationId,
    pub track: TrackSummary,
    pub status: RecommendationStatus,
    /// Voters who recommended this track (deduplicated)
    #[serde(default)]
    pub recommended_by: Vec<VoterId>,
    pub created_at: String,
}

// ========== Event info ==========

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialLink {
    pub label: String,
    pub url: String,
}

/// Public information about the event, shown on the info screen
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub links: Vec<SocialLink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instant_formats() {
        let full = parse_instant("2025-08-13T23:00:00+02:00").unwrap();
        let short = parse_instant("2025-08-13T23:00+02:00").unwrap();
        assert_eq!(full, short);
        assert_eq!(full.to_rfc3339(), "2025-08-13T21:00:00+00:00");

        assert!(parse_instant("2025-08-13T21:00:00.123456").is_some());
        assert!(parse_instant("not a date").is_none());
        assert!(parse_instant("").is_none());
    }

    #[test]
    fn test_window_bounds_are_half_open() {
        let window = EventWindow::new("2025-08-13T20:00+02:00", "2025-08-14T02:00+02:00");
        let start = parse_instant("2025-08-13T20:00:00+02:00").unwrap();
        let end = parse_instant("2025-08-14T02:00:00+02:00").unwrap();

        assert!(window.contains(start));
        assert!(!window.contains(end));
        assert!(window.contains(end - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_empty_and_malformed_windows_never_match() {
        let now = parse_instant("2025-08-13T20:00:00+02:00").unwrap();
        let empty = EventWindow::new("2025-08-13T20:00+02:00", "2025-08-13T20:00+02:00");
        assert!(!empty.contains(now));

        let malformed = EventWindow::new("tomorrow-ish", "2025-08-14T02:00+02:00");
        assert!(malformed.bounds().is_none());
        assert!(!malformed.contains(now));
    }

    #[test]
    fn test_voter_id_shape() {
        assert!(is_valid_voter_id("01J9Z3Q5ZC4T7XKQ2M6V8P0N1R"));
        assert!(is_valid_voter_id("b7e1c4a2-93f0-4a51-8d2e-1f6c0a9b3d77"));
        assert!(!is_valid_voter_id(""));
        assert!(!is_valid_voter_id("has space"));
        assert!(!is_valid_voter_id(&"x".repeat(65)));
    }
}
