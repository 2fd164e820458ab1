use axum::{
    extract::State,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::db::repository::{page_size, MAX_MUSIC_ANALYSES};
use crate::error::{AppError, AppResult};
use crate::handlers::spotify::user_access_token;
use crate::models::music_analysis::{
    AnalysisHistoryQuery, AnalyzeTrackRequest, MusicAnalysis, NewMusicAnalysis, SearchQuery,
    MAX_NAME_CHARS,
};
use crate::rate_limit::MUSIC_ANALYSIS_LIMIT;
use crate::services::ai::{analyze_mood_from_music, MoodAnalysis};
use crate::services::spotify::Track;
use crate::validation::{
    sanitize_string, truncate_chars, ValidPath, ValidQuery, ValidatedJson,
};
use crate::AppState;

const DEFAULT_SEARCH_LIMIT: u32 = 20;
const MAX_SEARCH_LIMIT: u32 = 50;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeTrackResponse {
    pub analysis: MusicAnalysis,
    pub mood_analysis: MoodAnalysis,
}

pub async fn search_tracks(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<SearchQuery>,
) -> AppResult<Json<Vec<Track>>> {
    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::Validation("Query parameter is required".into()))?;
    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .min(MAX_SEARCH_LIMIT);

    let user_token = match query.user_id {
        Some(user_id) => match state.repo.get_user(user_id).await? {
            Some(user) => user_access_token(&state, &user).await?,
            None => None,
        },
        None => None,
    };

    let tracks = match user_token {
        Some(token) => state.music.search_tracks_as_user(q, &token, limit).await?,
        None => state.music.search_tracks(q, limit).await?,
    };

    Ok(Json(tracks))
}

pub async fn analyze_track(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<AnalyzeTrackRequest>,
) -> AppResult<Json<AnalyzeTrackResponse>> {
    state
        .rate_limiter
        .enforce("music_analysis", &body.user_id.to_string(), MUSIC_ANALYSIS_LIMIT)
        .await?;

    if !state.repo.user_exists(body.user_id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }

    let track_id = body.track_id.as_str();
    let (track, features) = tokio::join!(
        state.music.track(track_id),
        state.music.audio_features(track_id)
    );

    let (track, features) = match (track?, features) {
        (Some(track), Some(features)) => (track, features),
        _ => {
            return Err(AppError::NotFound(
                "Track not found or audio features unavailable".into(),
            ))
        }
    };

    let track_name = truncate_chars(&sanitize_string(&track.name), MAX_NAME_CHARS);
    let artist_name = truncate_chars(&sanitize_string(track.primary_artist()), MAX_NAME_CHARS);

    let mood_analysis =
        analyze_mood_from_music(state.llm.as_ref(), &features, &track_name, &artist_name).await;

    let analysis = state
        .repo
        .create_music_analysis(&NewMusicAnalysis {
            user_id: body.user_id,
            track_id: track.id.clone(),
            track_name,
            artist_name,
            album_image: track.album_image().map(str::to_string),
            audio_features: features,
            predicted_mood: mood_analysis.predicted_mood.clone(),
            mood_confidence: mood_analysis.confidence,
        })
        .await?;

    tracing::info!(
        user_id = %analysis.user_id,
        track_id = %analysis.track_id,
        predicted_mood = %analysis.predicted_mood,
        "Track analyzed"
    );

    Ok(Json(AnalyzeTrackResponse {
        analysis,
        mood_analysis,
    }))
}

pub async fn list_analyses(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
    ValidQuery(query): ValidQuery<AnalysisHistoryQuery>,
) -> AppResult<Json<Vec<MusicAnalysis>>> {
    let limit = page_size(query.limit, 20, MAX_MUSIC_ANALYSES);
    let analyses = state.repo.list_music_analyses(user_id, limit).await?;
    Ok(Json(analyses))
}
