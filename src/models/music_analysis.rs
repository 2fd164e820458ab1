use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Column widths of `music_analysis` / `recommendations`.
pub const MAX_NAME_CHARS: usize = 500;
pub const MAX_MOOD_LABEL_CHARS: usize = 100;

/// Spotify's audio-feature vector. Everything except tempo is normalized to [0,1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub energy: f64,
    pub valence: f64,
    pub danceability: f64,
    pub acousticness: f64,
    pub tempo: f64,
    pub speechiness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
}

impl AudioFeatures {
    /// Clamp the normalized features into [0,1] and tempo to non-negative.
    pub fn normalized(self) -> Self {
        Self {
            energy: clamp_unit(self.energy),
            valence: clamp_unit(self.valence),
            danceability: clamp_unit(self.danceability),
            acousticness: clamp_unit(self.acousticness),
            tempo: if self.tempo.is_finite() { self.tempo.max(0.0) } else { 0.0 },
            speechiness: clamp_unit(self.speechiness),
            instrumentalness: clamp_unit(self.instrumentalness),
            liveness: clamp_unit(self.liveness),
        }
    }
}

/// Clamp to [0,1]; NaN collapses to the midpoint.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MusicAnalysis {
    pub id: Uuid,
    pub user_id: Uuid,
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_image: Option<String>,
    pub audio_features: Json<AudioFeatures>,
    pub predicted_mood: String,
    pub mood_confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMusicAnalysis {
    pub user_id: Uuid,
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_image: Option<String>,
    pub audio_features: AudioFeatures,
    pub predicted_mood: String,
    pub mood_confidence: f64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeTrackRequest {
    #[validate(
        length(min = 1, max = 64, message = "Track ID is required"),
        custom = "validate_track_id"
    )]
    pub track_id: String,
    pub user_id: Uuid,
}

/// Spotify ids are base62; anything else would change the upstream URL.
fn validate_track_id(track_id: &str) -> Result<(), ValidationError> {
    if track_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("track_id_charset");
        err.message = Some("Track ID can only contain letters and numbers".into());
        Err(err)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<u32>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisHistoryQuery {
    pub limit: Option<i64>,
}
