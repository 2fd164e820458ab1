use axum::{
    extract::State,
    Json,
};
use futures_util::future::join_all;
use uuid::Uuid;

use crate::db::repository::{page_size, MAX_RECOMMENDATIONS};
use crate::error::AppResult;
use crate::models::mood_entry::MoodEntry;
use crate::models::music_analysis::MAX_NAME_CHARS;
use crate::models::recommendation::{
    NewRecommendation, Recommendation, RecommendationHistoryQuery, RecommendationQuery,
    RecommendationResponse,
};
use crate::services::ai::generate_recommendation_reason;
use crate::services::mood_target::MoodTarget;
use crate::validation::{sanitize_string, truncate_chars, ValidPath, ValidQuery};
use crate::AppState;

const DEFAULT_LIMIT: u32 = 10;
const DEFAULT_MOOD: &str = "happy";
const DEFAULT_MOOD_SCORE: i32 = 7;
const SEED_TRACKS: usize = 3;
const CONTEXT_TRACKS: usize = 5;

pub async fn get_recommendations(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
    ValidQuery(query): ValidQuery<RecommendationQuery>,
) -> AppResult<Json<Vec<RecommendationResponse>>> {
    state.repo.require_user(user_id).await?;

    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_LIMIT)
        .min(MAX_RECOMMENDATIONS as u32);

    let recent_entries = state.repo.list_mood_entries(user_id, 5).await?;
    let latest = recent_entries.first();

    let current_mood = query
        .mood
        .as_deref()
        .map(sanitize_string)
        .filter(|m| !m.is_empty())
        .or_else(|| latest.and_then(MoodEntry::primary_emotion).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_MOOD.to_string());
    let mood_score = latest.map(|e| e.mood_score).unwrap_or(DEFAULT_MOOD_SCORE);

    let history = state.repo.list_music_analyses(user_id, 20).await?;
    let seeds: Vec<String> = history
        .iter()
        .take(SEED_TRACKS)
        .map(|a| a.track_id.clone())
        .collect();
    let context = &history[..history.len().min(CONTEXT_TRACKS)];

    let tracks = state
        .music
        .recommendations(&seeds, MoodTarget::for_mood(&current_mood), limit)
        .await?;

    let rationales = join_all(tracks.iter().map(|track| {
        generate_recommendation_reason(
            state.llm.as_ref(),
            &current_mood,
            mood_score,
            context,
            track,
        )
    }))
    .await;

    let mood_entry_id = latest.map(|e| e.id);
    let mut response = Vec::with_capacity(tracks.len());
    for (track, rationale) in tracks.into_iter().zip(rationales) {
        let recommendation = state
            .repo
            .create_recommendation(&NewRecommendation {
                user_id,
                mood_entry_id,
                track_id: track.id.clone(),
                track_name: truncate_chars(&sanitize_string(&track.name), MAX_NAME_CHARS),
                artist_name: truncate_chars(
                    &sanitize_string(track.primary_artist()),
                    MAX_NAME_CHARS,
                ),
                album_image: track.album_image().map(str::to_string),
                reason: rationale.reason.clone(),
                match_score: rationale.match_score,
            })
            .await?;

        response.push(RecommendationResponse {
            recommendation,
            track,
            rationale,
        });
    }

    tracing::info!(
        user_id = %user_id,
        mood = %current_mood,
        count = response.len(),
        "Recommendations generated"
    );

    Ok(Json(response))
}

pub async fn recommendation_history(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
    ValidQuery(query): ValidQuery<RecommendationHistoryQuery>,
) -> AppResult<Json<Vec<Recommendation>>> {
    let limit = page_size(query.limit, 20, MAX_RECOMMENDATIONS);
    let recs = state.repo.list_recommendations(user_id, limit).await?;
    Ok(Json(recs))
}
