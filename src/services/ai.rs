//! Language-model backed mood classification, personality profiling and
//! recommendation rationales. Every call degrades to a fixed neutral answer
//! on any failure so the surrounding request still succeeds.

use serde::{Deserialize, Serialize};

use crate::models::mood_entry::MoodEntry;
use crate::models::music_analysis::{
    clamp_unit, AudioFeatures, MusicAnalysis, MAX_MOOD_LABEL_CHARS,
};
use crate::services::llm::LanguageModel;
use crate::services::spotify::Track;
use crate::validation::truncate_chars;

const MOOD_SYSTEM_PROMPT: &str = "You are an expert music psychologist who analyzes the emotional impact of music. Provide detailed mood analysis based on audio features.";
const PROFILE_SYSTEM_PROMPT: &str = "You are a music psychology expert who creates personality profiles based on music preferences and mood patterns.";
const RECOMMENDATION_SYSTEM_PROMPT: &str = "You are a music therapist who provides personalized music recommendations based on current mood and preferences.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodAnalysis {
    pub predicted_mood: String,
    pub confidence: f64,
    pub emotions: Vec<String>,
    pub energy_level: f64,
    pub positivity_level: f64,
    pub recommendation: String,
}

impl MoodAnalysis {
    pub fn neutral() -> Self {
        Self {
            predicted_mood: "neutral".into(),
            confidence: 0.5,
            emotions: vec!["neutral".into()],
            energy_level: 0.5,
            positivity_level: 0.5,
            recommendation: "Perfect for any time".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMoodAnalysis {
    predicted_mood: Option<String>,
    confidence: Option<f64>,
    emotions: Option<Vec<String>>,
    energy_level: Option<f64>,
    positivity_level: Option<f64>,
    recommendation: Option<String>,
}

pub fn parse_mood_analysis(text: &str) -> Result<MoodAnalysis, serde_json::Error> {
    let raw: RawMoodAnalysis = serde_json::from_str(text)?;
    Ok(MoodAnalysis {
        predicted_mood: non_blank(raw.predicted_mood)
            .map(|m| mood_label(&m))
            .unwrap_or_else(|| "neutral".into()),
        confidence: clamp_unit(raw.confidence.unwrap_or(0.5)),
        emotions: raw.emotions.unwrap_or_default(),
        energy_level: clamp_unit(raw.energy_level.unwrap_or(0.5)),
        positivity_level: clamp_unit(raw.positivity_level.unwrap_or(0.5)),
        recommendation: non_blank(raw.recommendation)
            .unwrap_or_else(|| "Great for general listening".into()),
    })
}

pub async fn analyze_mood_from_music(
    llm: &dyn LanguageModel,
    features: &AudioFeatures,
    track_name: &str,
    artist_name: &str,
) -> MoodAnalysis {
    let prompt = format!(
        r#"Analyze the mood and emotional characteristics of this music track based on its audio features:

Track: "{track_name}" by {artist_name}
Audio Features:
- Energy: {}
- Valence (positivity): {}
- Danceability: {}
- Acousticness: {}
- Tempo: {}
- Speechiness: {}
- Instrumentalness: {}
- Liveness: {}

Respond with a JSON object with:
- predictedMood: primary mood (happy, sad, energetic, calm, peaceful, angry, etc.)
- confidence: confidence score (0-1)
- emotions: array of 2-3 specific emotions this track evokes
- energyLevel: normalized energy level (0-1)
- positivityLevel: normalized positivity level (0-1)
- recommendation: brief recommendation on when to listen to this track"#,
        features.energy,
        features.valence,
        features.danceability,
        features.acousticness,
        features.tempo,
        features.speechiness,
        features.instrumentalness,
        features.liveness,
    );

    let result = match llm.complete_json(MOOD_SYSTEM_PROMPT, &prompt).await {
        Ok(text) => parse_mood_analysis(&text).map_err(anyhow::Error::from),
        Err(e) => Err(e.into()),
    };

    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, track = track_name, "Mood analysis failed, using neutral fallback");
        MoodAnalysis::neutral()
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityProfile {
    #[serde(rename = "musicDNA")]
    pub music_dna: String,
    pub energy_level: f64,
    pub positivity_level: f64,
    pub ai_suggestion: String,
    pub traits: Vec<String>,
}

impl PersonalityProfile {
    pub fn fallback() -> Self {
        Self {
            music_dna: "You have a unique relationship with music that reflects your individual personality.".into(),
            energy_level: 0.5,
            positivity_level: 0.5,
            ai_suggestion: "Continue exploring music that resonates with your emotions.".into(),
            traits: vec!["music-loving".into(), "emotionally aware".into()],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPersonalityProfile {
    #[serde(rename = "musicDNA")]
    music_dna: Option<String>,
    energy_level: Option<f64>,
    positivity_level: Option<f64>,
    ai_suggestion: Option<String>,
    traits: Option<Vec<String>>,
}

pub fn parse_personality_profile(text: &str) -> Result<PersonalityProfile, serde_json::Error> {
    let raw: RawPersonalityProfile = serde_json::from_str(text)?;
    Ok(PersonalityProfile {
        music_dna: non_blank(raw.music_dna).unwrap_or_else(|| {
            "You have an eclectic taste in music that reflects a curious and open-minded personality.".into()
        }),
        energy_level: clamp_unit(raw.energy_level.unwrap_or(0.5)),
        positivity_level: clamp_unit(raw.positivity_level.unwrap_or(0.5)),
        ai_suggestion: non_blank(raw.ai_suggestion).unwrap_or_else(|| {
            "Try exploring new genres during different times of day to match your energy levels.".into()
        }),
        traits: raw.traits.unwrap_or_else(|| {
            vec!["curious".into(), "open-minded".into(), "emotionally aware".into()]
        }),
    })
}

pub async fn generate_personality_profile(
    llm: &dyn LanguageModel,
    music: &[MusicAnalysis],
    moods: &[MoodEntry],
) -> PersonalityProfile {
    let listening: Vec<String> = music
        .iter()
        .map(|t| {
            format!(
                "- {} by {} (Energy: {}, Valence: {})",
                t.track_name, t.artist_name, t.audio_features.energy, t.audio_features.valence
            )
        })
        .collect();

    let history: Vec<String> = moods
        .iter()
        .map(|m| {
            let emotions = if m.emotions.0.is_empty() {
                "None".to_string()
            } else {
                m.emotions.0.join(", ")
            };
            format!(
                "- {}: Mood score {}/10, Emotions: {}",
                m.created_at.to_rfc3339(),
                m.mood_score,
                emotions
            )
        })
        .collect();

    let prompt = format!(
        r#"Based on the user's music listening history and mood patterns, generate a personality profile:

Music Listening Patterns:
{}

Recent Mood History:
{}

Respond with a JSON object with:
- musicDNA: 2-3 sentence description of their music personality
- energyLevel: overall energy preference (0-1)
- positivityLevel: overall positivity level (0-1)
- aiSuggestion: personalized suggestion for improving mood through music
- traits: array of 3-5 personality traits based on music taste"#,
        listening.join("\n"),
        history.join("\n"),
    );

    let result = match llm.complete_json(PROFILE_SYSTEM_PROMPT, &prompt).await {
        Ok(text) => parse_personality_profile(&text).map_err(anyhow::Error::from),
        Err(e) => Err(e.into()),
    };

    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Personality profile failed, using fallback");
        PersonalityProfile::fallback()
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRationale {
    pub reason: String,
    pub match_score: f64,
    pub mood: String,
    pub explanation: String,
}

impl RecommendationRationale {
    pub fn fallback(current_mood: &str) -> Self {
        Self {
            reason: "Perfect for your current mood".into(),
            match_score: 0.8,
            mood: current_mood.to_string(),
            explanation: "This music should complement your current emotional state".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRationale {
    reason: Option<String>,
    match_score: Option<f64>,
    mood: Option<String>,
    explanation: Option<String>,
}

pub fn parse_rationale(
    text: &str,
    current_mood: &str,
) -> Result<RecommendationRationale, serde_json::Error> {
    let raw: RawRationale = serde_json::from_str(text)?;
    Ok(RecommendationRationale {
        reason: non_blank(raw.reason)
            .unwrap_or_else(|| "This music matches your current emotional state".into()),
        match_score: clamp_unit(raw.match_score.unwrap_or(0.8)),
        mood: non_blank(raw.mood).unwrap_or_else(|| current_mood.to_string()),
        explanation: non_blank(raw.explanation).unwrap_or_else(|| {
            "This recommendation is tailored to your current mood and preferences".into()
        }),
    })
}

pub async fn generate_recommendation_reason(
    llm: &dyn LanguageModel,
    current_mood: &str,
    mood_score: i32,
    recent_tracks: &[MusicAnalysis],
    track: &Track,
) -> RecommendationRationale {
    let preferences: Vec<String> = recent_tracks
        .iter()
        .map(|t| format!("{} by {} ({})", t.track_name, t.artist_name, t.predicted_mood))
        .collect();

    let prompt = format!(
        r#"Generate a music recommendation explanation for a user with:
- Current mood: {current_mood}
- Mood score: {mood_score}/10
- Recently analyzed tracks: {}
- Recommended track: "{}" by {}

Respond with a JSON object with:
- reason: why this track would be good for their current state
- matchScore: how well this matches their mood (0-1)
- mood: the target mood this music should help achieve
- explanation: detailed explanation of the recommendation"#,
        if preferences.is_empty() {
            "none yet".to_string()
        } else {
            preferences.join("; ")
        },
        track.name,
        track.primary_artist(),
    );

    let result = match llm.complete_json(RECOMMENDATION_SYSTEM_PROMPT, &prompt).await {
        Ok(text) => parse_rationale(&text, current_mood).map_err(anyhow::Error::from),
        Err(e) => Err(e.into()),
    };

    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, track_id = %track.id, "Recommendation rationale failed, using fallback");
        RecommendationRationale::fallback(current_mood)
    })
}

/// Lowercased, trimmed and cut to fit the `predicted_mood` column.
fn mood_label(raw: &str) -> String {
    truncate_chars(&raw.trim().to_lowercase(), MAX_MOOD_LABEL_CHARS)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
