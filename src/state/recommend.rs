use super::AppState;
use crate::protocol::ServerMessage;
use crate::types::*;

impl AppState {
    /// Recommend a track. Repeat recommendations of the same track are merged.
    pub async fn recommend_track(
        &self,
        voter_id: &str,
        track: TrackSummary,
    ) -> Result<Recommendation, String> {
        if !is_valid_voter_id(voter_id) {
            return Err("Invalid voter id".to_string());
        }
        if track.track_id.trim().is_empty() || track.title.trim().is_empty() {
            return Err("Track id and title are required".to_string());
        }

        let recommendation = {
            let mut recommendations = self.recommendations.write().await;

            if let Some(existing) = recommendations
                .iter_mut()
                .find(|r| r.track.track_id == track.track_id)
            {
                if !existing.recommended_by.iter().any(|v| v == voter_id) {
                    existing.recommended_by.push(voter_id.to_string());
                }
                existing.clone()
            } else {
                let recommendation = Recommendation {
                    id: ulid::Ulid::new().to_string(),
                    track,
                    status: RecommendationStatus::Pending,
                    recommended_by: vec![voter_id.to_string()],
                    created_at: chrono::Utc::now().to_rfc3339(),
                };
                recommendations.push(recommendation.clone());
                recommendation
            }
        };

        tracing::info!(
            track = %recommendation.track.track_id,
            recommenders = recommendation.recommended_by.len(),
            "Track recommended"
        );
        self.broadcast_recommendations_to_admin().await;
        Ok(recommendation)
    }

    /// Approved recommendations for the public list, or all of them for admins
    pub async fn list_recommendations(&self, include_unreviewed: bool) -> Vec<Recommendation> {
        self.recommendations
            .read()
            .await
            .iter()
            .filter(|r| include_unreviewed || r.status == RecommendationStatus::Approved)
            .cloned()
            .collect()
    }

    pub async fn review_recommendation(
        &self,
        recommendation_id: &str,
        approve: bool,
    ) -> Result<Recommendation, String> {
        let updated = {
            let mut recommendations = self.recommendations.write().await;
            let recommendation = recommendations
                .iter_mut()
                .find(|r| r.id == recommendation_id)
                .ok_or("Recommendation not found")?;
            recommendation.status = if approve {
                RecommendationStatus::Approved
            } else {
                RecommendationStatus::Rejected
            };
            recommendation.clone()
        };

        tracing::info!(recommendation = recommendation_id, approve, "Recommendation reviewed");
        let _ = self.broadcast.send(ServerMessage::Recommendations {
            items: self.list_recommendations(false).await,
        });
        self.broadcast_recommendations_to_admin().await;
        Ok(updated)
    }

    pub async fn delete_recommendation(&self, recommendation_id: &str) -> Result<(), String> {
        {
            let mut recommendations = self.recommendations.write().await;
            let before = recommendations.len();
            recommendations.retain(|r| r.id != recommendation_id);
            if recommendations.len() == before {
                return Err("Recommendation not found".to_string());
            }
        }

        let _ = self.broadcast.send(ServerMessage::Recommendations {
            items: self.list_recommendations(false).await,
        });
        self.broadcast_recommendations_to_admin().await;
        Ok(())
    }

    pub async fn broadcast_recommendations_to_admin(&self) {
        let items = self.list_recommendations(true).await;
        let _ = self
            .admin_broadcast
            .send(ServerMessage::Recommendations { items });
    }
}
