pub mod export;
mod karaoke;
mod recommend;
mod voting;

use crate::catalogue::CatalogueSearch;
use crate::config::EventConfig;
use crate::ledger::{Tally, VoteLedger};
use crate::protocol::ServerMessage;
use crate::store::{MemoryStore, TimeSource, VoteStore};
use crate::types::*;
use crate::window::VotingGate;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

pub use karaoke::ValidationError;
pub use voting::{VoteError, SEED_VOTES};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn VoteStore>,
    pub gate: Arc<VotingGate>,
    pub tally: Arc<Tally>,
    /// Ledger per connected voter, created on first use
    pub ledgers: Arc<RwLock<HashMap<VoterId, Arc<VoteLedger>>>>,
    pub karaoke: Arc<RwLock<Vec<KaraokeEntry>>>,
    pub recommendations: Arc<RwLock<Vec<Recommendation>>>,
    pub event: Arc<EventConfig>,
    pub catalogue: Option<Arc<dyn CatalogueSearch>>,
    /// Sequence number of the last ranking broadcast
    pub ranking_seq: Arc<AtomicU64>,
    /// Broadcast channel for all clients
    pub broadcast: broadcast::Sender<ServerMessage>,
    /// Broadcast channel for admin clients only
    pub admin_broadcast: broadcast::Sender<ServerMessage>,
}

impl AppState {
    pub fn new(store: Arc<dyn VoteStore>, clock: Arc<dyn TimeSource>, event: EventConfig) -> Self {
        let (tx, _rx) = broadcast::channel(100);
        let (admin_tx, _admin_rx) = broadcast::channel(100);
        let gate = VotingGate::new(store.clone(), clock, event.windows.clone());

        Self {
            store,
            gate: Arc::new(gate),
            tally: Arc::new(Tally::new()),
            ledgers: Arc::new(RwLock::new(HashMap::new())),
            karaoke: Arc::new(RwLock::new(Vec::new())),
            recommendations: Arc::new(RwLock::new(Vec::new())),
            event: Arc::new(event),
            catalogue: None,
            ranking_seq: Arc::new(AtomicU64::new(0)),
            broadcast: tx,
            admin_broadcast: admin_tx,
        }
    }

    /// State backed by a fresh in-memory store
    pub fn in_memory(event: EventConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(store.clone(), store, event)
    }

    pub fn with_catalogue(mut self, catalogue: Arc<dyn CatalogueSearch>) -> Self {
        self.catalogue = Some(catalogue);
        self
    }
}
