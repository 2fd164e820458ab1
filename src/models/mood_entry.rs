use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mood_score: i32,
    pub emotions: Json<Vec<String>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MoodEntry {
    pub fn primary_emotion(&self) -> Option<&str> {
        self.emotions.0.first().map(String::as_str)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMoodEntryRequest {
    pub user_id: Uuid,

    #[validate(range(min = 1, max = 10, message = "Mood score must be between 1 and 10"))]
    pub mood_score: i32,

    #[validate(
        length(max = 10, message = "Too many emotions selected"),
        custom = "validate_emotion_tags"
    )]
    pub emotions: Option<Vec<String>>,

    #[validate(length(max = 1000, message = "Notes must be less than 1000 characters"))]
    pub notes: Option<String>,
}

fn validate_emotion_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.iter().all(|t| t.chars().count() <= 50) {
        Ok(())
    } else {
        let mut err = ValidationError::new("emotion_length");
        err.message = Some("Emotion tags must be at most 50 characters".into());
        Err(err)
    }
}

/// Sanitized, validated mood entry ready for insertion.
#[derive(Debug, Clone)]
pub struct NewMoodEntry {
    pub user_id: Uuid,
    pub mood_score: i32,
    pub emotions: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoodEntryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MoodTrendsQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub current_mood: String,
    pub streak: String,
    pub songs_analyzed: i64,
    pub mood_score: String,
    pub average_mood: String,
    pub best_day: String,
    pub improvement: String,
}
