use super::AppState;
use crate::protocol::ServerMessage;
use crate::types::*;
use std::collections::HashSet;

const MAX_SINGER_CHARS: usize = 60;
const MAX_SONG_CHARS: usize = 120;

/// A sign-up field failed validation; nothing was stored
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {msg}")]
pub struct ValidationError {
    pub field: &'static str,
    pub msg: String,
}

fn required(field: &'static str, value: &str, max_chars: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError {
            field,
            msg: "is required".to_string(),
        });
    }
    if trimmed.chars().count() > max_chars {
        return Err(ValidationError {
            field,
            msg: format!("must be at most {} characters", max_chars),
        });
    }
    Ok(trimmed.to_string())
}

/// Check a sign-up form in field order and return the cleaned-up copy.
/// Only the first invalid field is reported.
pub fn validate_signup(signup: &KaraokeSignup) -> Result<KaraokeSignup, ValidationError> {
    let singer_name = required("singer_name", &signup.singer_name, MAX_SINGER_CHARS)?;
    let song_title = required("song_title", &signup.song_title, MAX_SONG_CHARS)?;
    let artist = match signup.artist.as_deref().map(str::trim) {
        Some(a) if !a.is_empty() => Some(required("artist", a, MAX_SONG_CHARS)?),
        _ => None,
    };

    Ok(KaraokeSignup {
        singer_name,
        song_title,
        artist,
    })
}

impl AppState {
    /// Add an attendee to the end of the karaoke queue
    pub async fn sign_up(&self, signup: KaraokeSignup) -> Result<KaraokeEntry, ValidationError> {
        let signup = validate_signup(&signup)?;

        let entry = KaraokeEntry {
            id: ulid::Ulid::new().to_string(),
            singer_name: signup.singer_name,
            song_title: signup.song_title,
            artist: signup.artist,
            status: EntryStatus::Waiting,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        self.karaoke.write().await.push(entry.clone());
        tracing::info!(entry = %entry.id, "Karaoke sign-up");
        self.broadcast_karaoke_queue().await;
        Ok(entry)
    }

    /// Full queue in running order, including finished entries
    pub async fn karaoke_queue(&self) -> Vec<KaraokeEntry> {
        self.karaoke.read().await.clone()
    }

    /// Entries still to sing (on stage first, then waiting)
    pub async fn upcoming_karaoke(&self) -> Vec<KaraokeEntry> {
        let queue = self.karaoke.read().await;
        let on_stage = queue.iter().filter(|e| e.status == EntryStatus::OnStage);
        let waiting = queue.iter().filter(|e| e.status == EntryStatus::Waiting);
        on_stage.chain(waiting).cloned().collect()
    }

    /// Replace the running order. `order` must name every entry exactly once.
    pub async fn set_queue_order(&self, order: Vec<EntryId>) -> Result<(), String> {
        {
            let mut queue = self.karaoke.write().await;

            if order.len() != queue.len() {
                return Err(format!(
                    "Order lists {} entries, queue has {}",
                    order.len(),
                    queue.len()
                ));
            }

            let unique: HashSet<&EntryId> = order.iter().collect();
            if unique.len() != order.len() {
                return Err("Order contains duplicate entries".to_string());
            }

            let mut reordered = Vec::with_capacity(queue.len());
            for id in &order {
                let entry = queue
                    .iter()
                    .find(|e| &e.id == id)
                    .ok_or_else(|| format!("Entry {} not found", id))?;
                reordered.push(entry.clone());
            }
            *queue = reordered;
        }

        self.broadcast_karaoke_queue().await;
        Ok(())
    }

    /// Move one entry to `to_index` (clamped to the end of the queue)
    pub async fn move_entry(&self, entry_id: &str, to_index: usize) -> Result<(), String> {
        {
            let mut queue = self.karaoke.write().await;
            let from = queue
                .iter()
                .position(|e| e.id == entry_id)
                .ok_or("Entry not found")?;
            let entry = queue.remove(from);
            let to = to_index.min(queue.len());
            queue.insert(to, entry);
        }

        self.broadcast_karaoke_queue().await;
        Ok(())
    }

    /// Update an entry's status. Only one singer is on stage at a time; the
    /// previous one is marked done.
    pub async fn set_entry_status(
        &self,
        entry_id: &str,
        status: EntryStatus,
    ) -> Result<KaraokeEntry, String> {
        let updated = {
            let mut queue = self.karaoke.write().await;
            if !queue.iter().any(|e| e.id == entry_id) {
                return Err("Entry not found".to_string());
            }

            if status == EntryStatus::OnStage {
                for other in queue
                    .iter_mut()
                    .filter(|e| e.status == EntryStatus::OnStage && e.id != entry_id)
                {
                    other.status = EntryStatus::Done;
                }
            }

            let entry = queue
                .iter_mut()
                .find(|e| e.id == entry_id)
                .ok_or("Entry not found")?;
            entry.status = status;
            entry.clone()
        };

        self.broadcast_karaoke_queue().await;
        Ok(updated)
    }

    pub async fn remove_entry(&self, entry_id: &str) -> Result<(), String> {
        {
            let mut queue = self.karaoke.write().await;
            let before = queue.len();
            queue.retain(|e| e.id != entry_id);
            if queue.len() == before {
                return Err("Entry not found".to_string());
            }
        }

        self.broadcast_karaoke_queue().await;
        Ok(())
    }

    pub async fn broadcast_karaoke_queue(&self) {
        let entries = self.upcoming_karaoke().await;
        let _ = self.broadcast.send(ServerMessage::KaraokeQueue { entries });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventConfig;

    fn signup(name: &str, song: &str) -> KaraokeSignup {
        KaraokeSignup {
            singer_name: name.to_string(),
            song_title: song.to_string(),
            artist: None,
        }
    }

    async fn state_with_queue(names: &[&str]) -> (AppState, Vec<EntryId>) {
        let state = AppState::in_memory(EventConfig::default());
        let mut ids = Vec::new();
        for name in names {
            ids.push(state.sign_up(signup(name, "Song")).await.unwrap().id);
        }
        (state, ids)
    }

    #[test]
    fn test_validation_reports_first_invalid_field() {
        let err = validate_signup(&signup("  ", "")).unwrap_err();
        assert_eq!(err.field, "singer_name");

        let err = validate_signup(&signup("Kim", " ")).unwrap_err();
        assert_eq!(err.field, "song_title");

        let err = validate_signup(&signup(&"x".repeat(61), "Song")).unwrap_err();
        assert_eq!(err.field, "singer_name");
        assert!(err.msg.contains("60"));
    }

    #[test]
    fn test_validation_trims_and_drops_blank_artist() {
        let cleaned = validate_signup(&KaraokeSignup {
            singer_name: " Kim ".to_string(),
            song_title: " Hero ".to_string(),
            artist: Some("   ".to_string()),
        })
        .unwrap();

        assert_eq!(cleaned.singer_name, "Kim");
        assert_eq!(cleaned.song_title, "Hero");
        assert!(cleaned.artist.is_none());
    }

    #[tokio::test]
    async fn test_invalid_signup_is_not_queued() {
        let state = AppState::in_memory(EventConfig::default());
        assert!(state.sign_up(signup("", "Song")).await.is_err());
        assert!(state.karaoke_queue().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_queue_order() {
        let (state, ids) = state_with_queue(&["A", "B", "C"]).await;

        let order = vec![ids[2].clone(), ids[0].clone(), ids[1].clone()];
        state.set_queue_order(order.clone()).await.unwrap();
        let names: Vec<_> = state
            .karaoke_queue()
            .await
            .into_iter()
            .map(|e| e.singer_name)
            .collect();
        assert_eq!(names, vec!["C", "A", "B"]);

        let result = state.set_queue_order(vec![ids[0].clone()]).await;
        assert!(result.unwrap_err().contains("queue has 3"));

        let result = state
            .set_queue_order(vec![ids[0].clone(), ids[1].clone(), "nope".to_string()])
            .await;
        assert!(result.unwrap_err().contains("not found"));
        // Failed reorder leaves the queue untouched
        assert_eq!(state.karaoke_queue().await[0].id, order[0]);
    }

    #[tokio::test]
    async fn test_move_entry() {
        let (state, ids) = state_with_queue(&["A", "B", "C"]).await;

        state.move_entry(&ids[0], 99).await.unwrap();
        let queue = state.karaoke_queue().await;
        assert_eq!(queue[2].singer_name, "A");

        state.move_entry(&ids[2], 0).await.unwrap();
        assert_eq!(state.karaoke_queue().await[0].singer_name, "C");

        assert!(state.move_entry("missing", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_single_singer_on_stage() {
        let (state, ids) = state_with_queue(&["A", "B", "C"]).await;

        state
            .set_entry_status(&ids[0], EntryStatus::OnStage)
            .await
            .unwrap();
        state
            .set_entry_status(&ids[1], EntryStatus::OnStage)
            .await
            .unwrap();

        let queue = state.karaoke_queue().await;
        assert_eq!(queue[0].status, EntryStatus::Done);
        assert_eq!(queue[1].status, EntryStatus::OnStage);

        let upcoming: Vec<_> = state
            .upcoming_karaoke()
            .await
            .into_iter()
            .map(|e| e.singer_name)
            .collect();
        assert_eq!(upcoming, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_remove_entry() {
        let (state, ids) = state_with_queue(&["A", "B"]).await;
        state.remove_entry(&ids[0]).await.unwrap();
        assert_eq!(state.karaoke_queue().await.len(), 1);
        assert!(state.remove_entry(&ids[0]).await.is_err());
    }
}
