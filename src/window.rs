//! Voting window evaluation.
//!
//! Decides whether voting is currently permitted from three inputs: the
//! trusted server clock, the admin override flag and the configured event
//! windows. The decision is cached; consumers read the cache and never ask
//! the time source themselves.

use crate::store::{StoreError, StoreResult, TimeSource, VoteStore};
use crate::types::EventWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// True iff some window satisfies `start <= now < end`.
/// Malformed windows are skipped.
pub fn is_open_at(windows: &[EventWindow], now: DateTime<Utc>) -> bool {
    matching_window(windows, now).is_some()
}

/// First window containing `now`
pub fn matching_window(windows: &[EventWindow], now: DateTime<Utc>) -> Option<&EventWindow> {
    windows.iter().find(|w| w.contains(now))
}

/// Why the gate is in its current state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    /// No evaluation has completed yet
    Pending,
    Override,
    InWindow,
    OutsideWindows,
    TimeUnavailable,
    OverrideUnavailable,
}

/// Cached outcome of the last evaluation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateStatus {
    pub allowed: bool,
    pub override_enabled: bool,
    pub reason: GateReason,
    /// Location of the window that opened voting, if any
    pub location: Option<String>,
    /// Server instant of the last successful clock read
    pub checked_at: Option<DateTime<Utc>>,
}

impl GateStatus {
    fn closed(reason: GateReason) -> Self {
        Self {
            allowed: false,
            override_enabled: false,
            reason,
            location: None,
            checked_at: None,
        }
    }
}

/// Voting window evaluator with a cached result
pub struct VotingGate {
    store: Arc<dyn VoteStore>,
    clock: Arc<dyn TimeSource>,
    windows: Vec<EventWindow>,
    status: RwLock<GateStatus>,
}

impl VotingGate {
    pub fn new(
        store: Arc<dyn VoteStore>,
        clock: Arc<dyn TimeSource>,
        windows: Vec<EventWindow>,
    ) -> Self {
        let malformed = windows.iter().filter(|w| w.bounds().is_none()).count();
        if malformed > 0 {
            tracing::warn!(malformed, "Some event windows have unparsable bounds and will be ignored");
        }

        Self {
            store,
            clock,
            windows,
            status: RwLock::new(GateStatus::closed(GateReason::Pending)),
        }
    }

    pub fn windows(&self) -> &[EventWindow] {
        &self.windows
    }

    /// Cached decision. Closed until the first refresh completes.
    pub async fn is_voting_allowed(&self) -> bool {
        self.status.read().await.allowed
    }

    pub async fn status(&self) -> GateStatus {
        self.status.read().await.clone()
    }

    /// Re-evaluate and replace the cached status.
    ///
    /// Any failure closes the gate; a previously cached "allowed" never
    /// survives an outage.
    pub async fn refresh(&self) -> GateStatus {
        let status = self.evaluate().await;
        let mut cached = self.status.write().await;
        if cached.allowed != status.allowed {
            tracing::info!(
                allowed = status.allowed,
                reason = ?status.reason,
                "Voting gate changed"
            );
        }
        *cached = status.clone();
        status
    }

    async fn evaluate(&self) -> GateStatus {
        let now = match self.clock.server_now().await {
            Ok(now) => now,
            Err(e) => {
                tracing::warn!("Server time unavailable, closing voting: {}", e);
                return GateStatus::closed(GateReason::TimeUnavailable);
            }
        };

        let override_enabled = match self.store.override_enabled().await {
            Ok(enabled) => enabled,
            Err(e) => {
                tracing::warn!("Override flag unavailable, closing voting: {}", e);
                return GateStatus {
                    checked_at: Some(now),
                    ..GateStatus::closed(GateReason::OverrideUnavailable)
                };
            }
        };

        if override_enabled {
            return GateStatus {
                allowed: true,
                override_enabled,
                reason: GateReason::Override,
                location: None,
                checked_at: Some(now),
            };
        }

        match matching_window(&self.windows, now) {
            Some(window) => GateStatus {
                allowed: true,
                override_enabled,
                reason: GateReason::InWindow,
                location: window.location.clone(),
                checked_at: Some(now),
            },
            None => GateStatus {
                allowed: false,
                override_enabled,
                reason: GateReason::OutsideWindows,
                location: None,
                checked_at: Some(now),
            },
        }
    }

    /// Force voting open. The cache only changes once the write is confirmed.
    pub async fn open_voting_now(&self) -> StoreResult<GateStatus> {
        self.set_override(true).await
    }

    /// Clear the override; windows still apply afterwards
    pub async fn close_voting_now(&self) -> StoreResult<GateStatus> {
        self.set_override(false).await
    }

    async fn set_override(&self, enabled: bool) -> StoreResult<GateStatus> {
        if let Err(e) = self.store.set_override(enabled).await {
            match &e {
                StoreError::Permission(_) => {
                    tracing::warn!(enabled, "Override write refused: {}", e)
                }
                _ => tracing::error!(enabled, "Override write failed: {}", e),
            }
            return Err(e);
        }

        tracing::info!(enabled, "Voting override updated");
        Ok(self.refresh().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Clock, MemoryStore};
    use crate::types::parse_instant;

    fn party_windows() -> Vec<EventWindow> {
        vec![
            EventWindow {
                start: "2025-08-13T20:00+02:00".to_string(),
                end: "2025-08-14T02:00+02:00".to_string(),
                location: Some("Main stage".to_string()),
            },
            EventWindow::new("garbage", "2025-08-20T02:00+02:00"),
        ]
    }

    fn gate_at(now: &str) -> (Arc<MemoryStore>, VotingGate) {
        let store = Arc::new(MemoryStore::with_clock(Clock::Fixed(
            parse_instant(now).unwrap(),
        )));
        let gate = VotingGate::new(store.clone(), store.clone(), party_windows());
        (store, gate)
    }

    #[test]
    fn test_is_open_at_predicate() {
        let windows = party_windows();
        assert!(is_open_at(
            &windows,
            parse_instant("2025-08-13T23:00+02:00").unwrap()
        ));
        assert!(!is_open_at(
            &windows,
            parse_instant("2025-08-14T02:00:00+02:00").unwrap()
        ));
        assert!(!is_open_at(
            &windows,
            parse_instant("2025-08-13T19:59:59+02:00").unwrap()
        ));
        assert!(!is_open_at(&[], Utc::now()));
    }

    #[tokio::test]
    async fn test_gate_closed_before_first_refresh() {
        let (_store, gate) = gate_at("2025-08-13T23:00+02:00");
        assert!(!gate.is_voting_allowed().await);
        assert_eq!(gate.status().await.reason, GateReason::Pending);
    }

    #[tokio::test]
    async fn test_inside_window_opens_voting() {
        let (_store, gate) = gate_at("2025-08-13T23:00+02:00");
        let status = gate.refresh().await;

        assert!(status.allowed);
        assert_eq!(status.reason, GateReason::InWindow);
        assert_eq!(status.location.as_deref(), Some("Main stage"));
        assert!(gate.is_voting_allowed().await);
    }

    #[tokio::test]
    async fn test_window_end_is_exclusive() {
        let (_store, gate) = gate_at("2025-08-14T02:00:00+02:00");
        assert!(!gate.refresh().await.allowed);
        assert_eq!(gate.status().await.reason, GateReason::OutsideWindows);
    }

    #[tokio::test]
    async fn test_override_opens_outside_windows() {
        let (store, gate) = gate_at("2025-09-01T12:00+02:00");
        assert!(!gate.refresh().await.allowed);

        let status = gate.open_voting_now().await.unwrap();
        assert!(status.allowed);
        assert_eq!(status.reason, GateReason::Override);
        assert!(store.override_enabled().await.unwrap());

        let status = gate.close_voting_now().await.unwrap();
        assert!(!status.allowed);
    }

    #[tokio::test]
    async fn test_unreachable_clock_fails_closed_despite_override() {
        let (store, gate) = gate_at("2025-08-13T23:00+02:00");
        gate.open_voting_now().await.unwrap();
        assert!(gate.is_voting_allowed().await);

        store.set_clock(Clock::Unreachable).await;
        let status = gate.refresh().await;

        assert!(!status.allowed);
        assert_eq!(status.reason, GateReason::TimeUnavailable);
        assert!(!gate.is_voting_allowed().await);
    }

    #[tokio::test]
    async fn test_failed_override_write_keeps_cache() {
        let (store, gate) = gate_at("2025-09-01T12:00+02:00");
        gate.refresh().await;

        store.set_read_only(true);
        let err = gate.open_voting_now().await.unwrap_err();
        assert!(matches!(err, StoreError::Permission(_)));
        assert!(!gate.is_voting_allowed().await);

        store.set_read_only(false);
        store.set_offline(true);
        let err = gate.open_voting_now().await.unwrap_err();
        assert!(matches!(err, StoreError::Network(_)));
        assert!(!gate.is_voting_allowed().await);
    }
}
