use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityInsight {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "musicDNA")]
    pub music_dna: String,
    pub energy_level: f64,
    pub positivity_level: f64,
    pub ai_suggestion: String,
    pub traits: Json<Vec<String>>,
    pub generated_at: DateTime<Utc>,
}

impl PersonalityInsight {
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.generated_at > now - max_age
    }
}

#[derive(Debug, Clone)]
pub struct NewPersonalityInsight {
    pub user_id: Uuid,
    pub music_dna: String,
    pub energy_level: f64,
    pub positivity_level: f64,
    pub ai_suggestion: String,
    pub traits: Vec<String>,
}

/// Returned before a user has any mood or music history. Not persisted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightPlaceholder {
    #[serde(rename = "musicDNA")]
    pub music_dna: String,
    pub energy_level: f64,
    pub positivity_level: f64,
    pub ai_suggestion: String,
    pub traits: Vec<String>,
}

impl Default for InsightPlaceholder {
    fn default() -> Self {
        Self {
            music_dna: "Start tracking your music and mood to get personalized insights!".into(),
            energy_level: 0.5,
            positivity_level: 0.5,
            ai_suggestion: "Log your mood and analyze some songs to get started.".into(),
            traits: vec![],
        }
    }
}
