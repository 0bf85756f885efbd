//! Persistent store seam.
//!
//! The hosted relational backend is reached through two traits: [`VoteStore`]
//! for table access and [`TimeSource`] for the trusted server clock.
//! [`RestStore`] talks to the real service, [`MemoryStore`] backs local
//! development and tests.

mod memory;
mod rest;

use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::{Clock, MemoryStore};
pub use rest::{RestStore, RestStoreConfig};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur when talking to the persistent store
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Network(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Short machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Network(_) => "NETWORK",
            StoreError::Permission(_) => "PERMISSION",
            StoreError::Decode(_) => "BAD_RESPONSE",
            StoreError::Rejected(_) => "REJECTED",
        }
    }
}

/// Table access for votes, the override flag and played tracks
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// All vote records of a single voter
    async fn votes_for_voter(&self, voter_id: &str) -> StoreResult<Vec<VoteRecord>>;

    /// All vote records across all voters, in insertion order
    async fn all_votes(&self) -> StoreResult<Vec<VoteRecord>>;

    async fn insert_vote(&self, record: VoteRecord) -> StoreResult<()>;

    /// Delete the record for `(track_id, voter_id)`; deleting nothing is not an error
    async fn delete_vote(&self, track_id: &str, voter_id: &str) -> StoreResult<()>;

    async fn delete_all_votes(&self) -> StoreResult<()>;

    /// Current override flag; a missing row reads as disabled
    async fn override_enabled(&self) -> StoreResult<bool>;

    /// Upsert the override row
    async fn set_override(&self, enabled: bool) -> StoreResult<()>;

    async fn played_tracks(&self) -> StoreResult<Vec<PlayedTrack>>;

    async fn mark_played(&self, track_id: &str) -> StoreResult<()>;
}

/// Trusted clock. The device clock is never consulted for voting decisions.
#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn server_now(&self) -> StoreResult<DateTime<Utc>>;
}
