use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::ai::RecommendationRationale;
use crate::services::spotify::Track;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mood_entry_id: Option<Uuid>,
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_image: Option<String>,
    pub reason: String,
    pub match_score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRecommendation {
    pub user_id: Uuid,
    pub mood_entry_id: Option<Uuid>,
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_image: Option<String>,
    pub reason: String,
    pub match_score: f64,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub mood: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationHistoryQuery {
    pub limit: Option<i64>,
}

/// A stored recommendation together with the track it points at and the
/// model's rationale.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    #[serde(flatten)]
    pub recommendation: Recommendation,
    pub track: Track,
    pub rationale: RecommendationRationale,
}
