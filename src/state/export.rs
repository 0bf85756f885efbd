//! Snapshot export/import of the in-process party state.
//!
//! Vote records live in the hosted store and are exported separately as CSV;
//! this covers what only the server holds: the karaoke queue and the
//! recommendation list.

use super::AppState;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Schema version for export format compatibility
/// Version 1: karaoke queue and recommendations
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// A serializable snapshot of the server-held party state.
///
/// Excludes runtime-only components:
/// - Broadcast channels (recreated at startup)
/// - Per-voter ledgers (rebuilt from the store on demand)
/// - Store credentials (security)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyStateExport {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    /// Karaoke queue in running order
    #[serde(default)]
    pub karaoke: Vec<KaraokeEntry>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

impl PartyStateExport {
    pub fn new(karaoke: Vec<KaraokeEntry>, recommendations: Vec<Recommendation>) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            karaoke,
            recommendations,
        }
    }

    /// Validate the export before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        let mut entry_ids = HashSet::new();
        for entry in &self.karaoke {
            if !entry_ids.insert(&entry.id) {
                return Err(format!("Duplicate karaoke entry '{}'", entry.id));
            }
        }

        let mut tracks = HashSet::new();
        for recommendation in &self.recommendations {
            if !tracks.insert(&recommendation.track.track_id) {
                return Err(format!(
                    "Track '{}' is recommended twice",
                    recommendation.track.track_id
                ));
            }
        }

        if self
            .karaoke
            .iter()
            .filter(|e| e.status == EntryStatus::OnStage)
            .count()
            > 1
        {
            return Err("More than one karaoke entry is on stage".to_string());
        }

        Ok(())
    }
}

impl AppState {
    pub async fn export_state(&self) -> PartyStateExport {
        PartyStateExport::new(
            self.karaoke_queue().await,
            self.list_recommendations(true).await,
        )
    }

    /// Replace the server-held state with a snapshot and notify clients
    pub async fn import_state(&self, export: PartyStateExport) -> Result<(), String> {
        export.validate()?;

        tracing::info!(
            karaoke = export.karaoke.len(),
            recommendations = export.recommendations.len(),
            exported_at = %export.exported_at,
            "Importing party state"
        );

        *self.karaoke.write().await = export.karaoke;
        *self.recommendations.write().await = export.recommendations;

        self.broadcast_karaoke_queue().await;
        self.broadcast_recommendations_to_admin().await;
        Ok(())
    }
}
