use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::insight::{InsightPlaceholder, NewPersonalityInsight};
use crate::services::ai::generate_personality_profile;
use crate::validation::ValidPath;
use crate::AppState;

const INSIGHT_MAX_AGE_DAYS: i64 = 7;

pub async fn personality_insights(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
) -> AppResult<Response> {
    if let Some(existing) = state.repo.latest_personality_insight(user_id).await? {
        if existing.is_fresh(Utc::now(), Duration::days(INSIGHT_MAX_AGE_DAYS)) {
            return Ok(Json(existing).into_response());
        }
    }

    let (music, moods) = tokio::try_join!(
        state.repo.list_music_analyses(user_id, 50),
        state.repo.list_mood_entries(user_id, 30)
    )?;

    if music.is_empty() || moods.is_empty() {
        return Ok(Json(InsightPlaceholder::default()).into_response());
    }

    let profile = generate_personality_profile(state.llm.as_ref(), &music, &moods).await;

    let insight = state
        .repo
        .create_personality_insight(&NewPersonalityInsight {
            user_id,
            music_dna: profile.music_dna,
            energy_level: profile.energy_level,
            positivity_level: profile.positivity_level,
            ai_suggestion: profile.ai_suggestion,
            traits: profile.traits,
        })
        .await?;

    tracing::info!(user_id = %user_id, "Personality insight generated");

    Ok(Json(insight).into_response())
}
